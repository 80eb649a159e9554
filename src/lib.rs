//! Round lifecycle and crash-determination engine for the BlockFlight
//! crash game, with its market-data feed and settlement reporting.

pub mod config;
pub mod entropy;
pub mod error;
pub mod game;
pub mod market_data;
pub mod metrics;
pub mod settlement;
pub mod state;

pub use error::{EngineError, FeedError};
