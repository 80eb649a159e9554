//! Error types for the round engine and its market feed

use thiserror::Error;

/// A single price source failing to produce a usable quote.
///
/// These never escape [`MarketFeed::poll`](crate::market_data::feed::MarketFeed::poll);
/// they are logged, counted and folded into the feed health flag.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("rate limited by price source")]
    RateLimited,

    #[error("price source returned HTTP {status}")]
    Http { status: u16 },

    #[error("malformed price payload: {0}")]
    MalformedPayload(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("price fetch timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        // The client does not report its deadline; the feed's own per-source
        // timeout produces `Timeout` with the real budget.
        if err.is_timeout() {
            return FeedError::Transport(format!("request timed out: {err}"));
        }
        if err.is_decode() {
            return FeedError::MalformedPayload(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 429 => FeedError::RateLimited,
            Some(status) => FeedError::Http { status: status.as_u16() },
            None => FeedError::Transport(err.to_string()),
        }
    }
}

/// Engine-level error taxonomy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Every configured price source failed during one poll.
    #[error("market feed unavailable: {0}")]
    FeedUnavailable(String),

    /// Stake or auto cash-out target could not be used.
    #[error("invalid wager: {0}")]
    InvalidWager(String),

    /// A command arrived in a phase that cannot accept it. State is unchanged.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
