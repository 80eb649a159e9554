pub mod driver;
pub mod engine;
pub mod growth;
pub mod hazard;
pub mod payout;
pub mod round;
pub mod trend;
pub mod wager;
