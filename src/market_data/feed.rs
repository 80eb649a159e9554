//! Polled reference price with a fallback chain.
//!
//! Each poll walks the configured sources in order (primary, then
//! secondary). The first usable quote wins. If every source fails the feed
//! synthesises the next price with a small bounded random walk around the
//! last one, flags itself unhealthy and backs off exponentially. Failures are
//! never returned to callers; they only show up in [`FeedHealth`].

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::entropy::Entropy;
use crate::error::{EngineError, FeedError};
use crate::market_data::adapters::PriceSource;
use crate::market_data::indicators::{ema_alpha, ema_step, impact_step, PriceHistory};
use crate::market_data::types::{FeedHealth, FeedSource, MarketSnapshot};
use crate::metrics::prometheus as m;
use crate::state::snapshot_cell::SnapshotCell;

/// `min(max, base * 2^min(max_doublings, failures - 1))`; `base` when healthy.
pub fn backoff_delay(base: Duration, failures: u32, max_doublings: u32, max: Duration) -> Duration {
    if failures == 0 {
        return base;
    }
    let doublings = (failures - 1).min(max_doublings);
    base.saturating_mul(1u32 << doublings.min(31)).min(max)
}

/// One simulated step: `last * (1 + (u - 0.5) * 2 * walk_fraction)`.
///
/// Never drops below `floor` unless the last price was already under it.
pub fn simulate_step(last: f64, u: f64, walk_fraction: f64, floor: f64) -> f64 {
    let next = last * (1.0 + (u - 0.5) * 2.0 * walk_fraction);
    if last >= floor { next.max(floor) } else { next }
}

struct FeedState {
    history: PriceHistory,
    ema_short: Option<f64>,
    ema_long: Option<f64>,
    volatility: f64,
    impact: f64,
    failures: u32,
    base_interval: Duration,
    next_delay: Duration,
    entropy: Box<dyn Entropy>,
}

pub struct MarketFeed {
    sources: Vec<Box<dyn PriceSource>>,
    config: FeedConfig,
    cell: SnapshotCell,
    state: Mutex<FeedState>,
}

impl MarketFeed {
    /// `sources` are tried in order on every poll.
    pub fn new(config: FeedConfig, sources: Vec<Box<dyn PriceSource>>, entropy: Box<dyn Entropy>) -> Self {
        let cell = SnapshotCell::new(MarketSnapshot::initial(
            config.initial_price,
            config.default_volatility,
        ));
        let state = FeedState {
            history: PriceHistory::new(config.history_capacity),
            ema_short: None,
            ema_long: None,
            volatility: config.default_volatility,
            impact: 0.0,
            failures: 0,
            base_interval: config.poll_interval,
            next_delay: config.poll_interval,
            entropy,
        };

        Self {
            sources,
            config,
            cell,
            state: Mutex::new(state),
        }
    }

    /// Last published snapshot. Never blocks on I/O.
    pub fn current_snapshot(&self) -> Arc<MarketSnapshot> {
        self.cell.load()
    }

    /// Handle the round engine reads from.
    pub fn snapshot_cell(&self) -> SnapshotCell {
        self.cell.clone()
    }

    /// Delay the subscription loop will wait before the next poll.
    pub async fn next_delay(&self) -> Duration {
        self.state.lock().await.next_delay
    }

    /// Fetch (or simulate) one price, update indicators and publish a snapshot.
    pub async fn poll(&self) -> MarketSnapshot {
        let fetched = self.fetch_chain().await;
        let now = SystemTime::now();

        let mut state = self.state.lock().await;
        let last_price = state.history.last().unwrap_or_else(|| self.cell.load().price_usd);

        let (price, health) = match fetched {
            Ok((price, source)) => {
                if state.failures > 0 {
                    info!(
                        source = source.as_str(),
                        after_failures = state.failures,
                        "market feed recovered"
                    );
                }
                state.failures = 0;
                state.next_delay = state.base_interval;
                let health = FeedHealth {
                    source,
                    healthy: true,
                    last_updated: Some(now),
                    consecutive_failures: 0,
                    error: None,
                };
                (price, health)
            }
            Err(err) => {
                state.failures += 1;
                state.next_delay = backoff_delay(
                    state.base_interval,
                    state.failures,
                    self.config.max_backoff_doublings,
                    self.config.max_backoff,
                );
                let u = state.entropy.uniform();
                let price = simulate_step(last_price, u, self.config.walk_fraction, self.config.price_floor);

                warn!(
                    error = %err,
                    consecutive_failures = state.failures,
                    next_delay_ms = state.next_delay.as_millis() as u64,
                    simulated_price = price,
                    "all price sources failed, simulating"
                );
                m::record_feed_fallback();
                m::record_feed_backoff_ms(state.next_delay.as_millis() as f64);

                let health = FeedHealth {
                    source: FeedSource::Simulated,
                    healthy: false,
                    last_updated: Some(now),
                    consecutive_failures: state.failures,
                    error: Some(err.to_string()),
                };
                (price, health)
            }
        };

        state.history.push(price);
        let ema_short = ema_step(state.ema_short, price, ema_alpha(self.config.ema_short_window));
        let ema_long = ema_step(state.ema_long, price, ema_alpha(self.config.ema_long_window));
        state.ema_short = Some(ema_short);
        state.ema_long = Some(ema_long);

        let volatility = state
            .history
            .volatility(self.config.min_volatility_samples, self.config.default_volatility)
            .max(0.0);
        let volatility_change = volatility - state.volatility;
        state.volatility = volatility;
        state.impact = impact_step(
            state.impact,
            state.history.last_return().unwrap_or(0.0),
            volatility_change,
            self.config.impact_decay,
            self.config.impact_cap,
        );

        let snapshot = MarketSnapshot {
            price_usd: price,
            ema_short,
            ema_long,
            volatility,
            market_impact: state.impact,
            health,
            observed_at: now,
        };
        drop(state);

        debug!(
            price = snapshot.price_usd,
            ema_short = snapshot.ema_short,
            ema_long = snapshot.ema_long,
            volatility = snapshot.volatility,
            source = snapshot.health.source.as_str(),
            "market snapshot"
        );
        m::record_feed_price(snapshot.price_usd);

        self.cell.store(snapshot.clone());
        snapshot
    }

    async fn fetch_chain(&self) -> Result<(f64, FeedSource), EngineError> {
        let mut failures = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let attempt = tokio::time::timeout(self.config.fetch_timeout, source.fetch_price()).await;
            match attempt {
                Ok(Ok(price)) => {
                    m::record_feed_poll(source.kind().as_str());
                    return Ok((price, source.kind()));
                }
                Ok(Err(err)) => {
                    warn!(source = source.name(), error = %err, "price source failed");
                    failures.push(format!("{}: {err}", source.name()));
                }
                Err(_) => {
                    let err = FeedError::Timeout {
                        after_ms: self.config.fetch_timeout.as_millis() as u64,
                    };
                    warn!(source = source.name(), error = %err, "price source timed out");
                    failures.push(format!("{}: {err}", source.name()));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no price sources configured".to_string());
        }
        Err(EngineError::FeedUnavailable(failures.join("; ")))
    }

    /// Poll now and then keep polling, honouring backoff, until cancelled.
    ///
    /// `interval` becomes the base delay that backoff doubles from.
    pub fn subscribe(self: &Arc<Self>, interval: Duration) -> FeedSubscription {
        let feed = Arc::clone(self);
        let handle = tokio::spawn(async move {
            feed.state.lock().await.base_interval = interval;
            info!(interval_ms = interval.as_millis() as u64, "market feed polling started");

            loop {
                feed.poll().await;
                let delay = feed.next_delay().await;
                tokio::time::sleep(delay).await;
            }
        });

        FeedSubscription { handle: Some(handle) }
    }
}

/// Running poll loop. Cancelled explicitly or when dropped.
pub struct FeedSubscription {
    handle: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    pub fn cancel(mut self) {
        self.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("market feed subscription cancelled");
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_millis(15_000);
        let max = Duration::from_millis(60_000);

        assert_eq!(backoff_delay(base, 0, 3, max), base);
        assert_eq!(backoff_delay(base, 1, 3, max), base);
        assert_eq!(backoff_delay(base, 2, 3, max), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(base, 3, 3, max), Duration::from_millis(60_000));
        assert_eq!(backoff_delay(base, 10, 3, max), max);
    }

    #[test]
    fn backoff_limits_doublings() {
        let base = Duration::from_millis(1_000);
        let max = Duration::from_secs(3_600);
        assert_eq!(backoff_delay(base, 20, 3, max), Duration::from_millis(8_000));
    }

    #[test]
    fn simulated_step_is_bounded() {
        for u in [0.0, 0.25, 0.5, 0.75, 0.999_999] {
            let next = simulate_step(2400.0, u, 0.001, 1000.0);
            assert!((next - 2400.0).abs() <= 2400.0 * 0.001 + 1e-9);
        }
    }

    #[test]
    fn simulated_step_respects_floor() {
        assert_eq!(simulate_step(1000.0, 0.0, 0.001, 1000.0), 1000.0);
    }
}
