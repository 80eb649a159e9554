pub mod adapters;
pub mod feed;
pub mod indicators;
pub mod types;
