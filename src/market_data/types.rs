use serde::Serialize;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    Primary,
    Secondary,
    Simulated,
}

impl FeedSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedHealth {
    pub source: FeedSource,
    pub healthy: bool,
    pub last_updated: Option<SystemTime>,
    pub consecutive_failures: u32,
    pub error: Option<String>,
}

/// Immutable view of the market at one poll. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub price_usd: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    /// Rolling standard deviation of per-step returns. Always >= 0.
    pub volatility: f64,
    /// Decaying measure of recent price/volatility shocks.
    pub market_impact: f64,
    pub health: FeedHealth,
    pub observed_at: SystemTime,
}

impl MarketSnapshot {
    /// Snapshot published before the first poll completes.
    pub fn initial(price_usd: f64, volatility: f64) -> Self {
        Self {
            price_usd,
            ema_short: price_usd,
            ema_long: price_usd,
            volatility,
            market_impact: 0.0,
            health: FeedHealth {
                source: FeedSource::Simulated,
                healthy: true,
                last_updated: None,
                consecutive_failures: 0,
                error: None,
            },
            observed_at: SystemTime::now(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.health.healthy
    }
}
