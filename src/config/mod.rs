//! Configuration for the feed, hazard model, multiplier integrator and round
//! engine.
//!
//! Every tuning constant lives here. Values are loaded from `BLOCKFLIGHT_*`
//! environment variables (a `.env` file is honoured); anything missing or
//! unparseable falls back to its default.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::bail;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub metrics_addr: SocketAddr,
    pub rng_seed: Option<u64>,
    pub demo_stake: Option<String>,
    pub demo_auto_cashout: Option<String>,
    pub feed: FeedConfig,
    pub hazard: HazardParams,
    pub growth: GrowthParams,
    pub engine: EngineConfig,
    pub fees: FeeSchedule,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub primary_url: String,
    pub secondary_url: String,
    pub asset_id: String,
    pub poll_interval: Duration,
    pub max_backoff: Duration,
    pub max_backoff_doublings: u32,
    pub fetch_timeout: Duration,
    pub history_capacity: usize,
    pub ema_short_window: u32,
    pub ema_long_window: u32,
    pub min_volatility_samples: usize,
    pub default_volatility: f64,
    /// Bound on a simulated step, as a fraction of the last price.
    pub walk_fraction: f64,
    pub price_floor: f64,
    pub initial_price: f64,
    pub impact_decay: f64,
    pub impact_cap: f64,
}

/// Trend band boundaries on `|trend|`.
#[derive(Debug, Clone, Copy)]
pub struct TrendThresholds {
    pub strong: f64,
    pub moderate: f64,
    pub flat: f64,
}

/// One factor per trend band.
#[derive(Debug, Clone, Copy)]
pub struct BandFactors {
    pub strong_bull: f64,
    pub mild_bull: f64,
    pub neutral: f64,
    pub flat: f64,
    pub mild_bear: f64,
    pub strong_bear: f64,
}

#[derive(Debug, Clone)]
pub struct HazardParams {
    pub base: f64,
    pub thresholds: TrendThresholds,
    pub trend_factors: BandFactors,
    pub volatility_scale: f64,
    pub volatility_cap: f64,
    pub multiplier_exponent: f64,
    pub multiplier_damping: f64,
    pub time_horizon_secs: f64,
    pub time_cap: f64,
    pub impact_weight: f64,
    pub min_probability: f64,
    pub max_probability: f64,
}

#[derive(Debug, Clone)]
pub struct GrowthParams {
    pub base_increment: f64,
    /// Per-unit-of-multiplier decay applied to the increment.
    pub decay: f64,
    pub thresholds: TrendThresholds,
    pub knowledge_bonus: BandFactors,
    pub volatility_weight: f64,
    pub time_boost_per_sec: f64,
    pub time_boost_cap: f64,
    pub jitter_amplitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitScheme {
    /// Base64 prefix of the seed; seed shown at launch.
    Preview,
    /// SHA-256 of the seed at launch; seed withheld until the round ends.
    Sha256,
}

impl FromStr for CommitScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "preview" => Ok(Self::Preview),
            "sha256" => Ok(Self::Sha256),
            other => bail!("unknown commit scheme `{other}`"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tick_period: Duration,
    pub countdown: Duration,
    pub cooldown: Duration,
    /// Crash draws only happen once the multiplier is strictly above this.
    pub crash_guard: f64,
    pub trajectory_cap: usize,
    pub commit_scheme: CommitScheme,
}

#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
    /// Cash-outs strictly below this multiplier pay `fee`.
    pub min_free_multiplier: f64,
    pub fee: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

const DEFAULT_THRESHOLDS: TrendThresholds = TrendThresholds {
    strong: 0.015,
    moderate: 0.01,
    flat: 0.005,
};

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            primary_url: "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=usd"
                .to_string(),
            secondary_url: "https://min-api.cryptocompare.com/data/price?fsym=ETH&tsyms=USD"
                .to_string(),
            asset_id: "ethereum".to_string(),
            poll_interval: Duration::from_millis(15_000),
            max_backoff: Duration::from_millis(60_000),
            max_backoff_doublings: 3,
            fetch_timeout: Duration::from_millis(5_000),
            history_capacity: 200,
            ema_short_window: 12,
            ema_long_window: 26,
            min_volatility_samples: 10,
            default_volatility: 0.02,
            walk_fraction: 0.001,
            price_floor: 1_000.0,
            initial_price: 2_400.0,
            impact_decay: 0.9,
            impact_cap: 2.0,
        }
    }
}

impl Default for HazardParams {
    fn default() -> Self {
        Self {
            base: 0.005,
            thresholds: DEFAULT_THRESHOLDS,
            trend_factors: BandFactors {
                strong_bull: 0.5,
                mild_bull: 0.6,
                neutral: 1.0,
                flat: 1.2,
                mild_bear: 1.8,
                strong_bear: 2.2,
            },
            volatility_scale: 30.0,
            volatility_cap: 2.0,
            multiplier_exponent: 1.8,
            multiplier_damping: 40.0,
            time_horizon_secs: 120.0,
            time_cap: 3.0,
            impact_weight: 0.2,
            min_probability: 0.001,
            max_probability: 0.25,
        }
    }
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            base_increment: 0.0025,
            decay: 0.98,
            thresholds: DEFAULT_THRESHOLDS,
            knowledge_bonus: BandFactors {
                strong_bull: 1.5,
                mild_bull: 1.4,
                neutral: 1.0,
                flat: 1.1,
                mild_bear: 0.7,
                strong_bear: 0.6,
            },
            volatility_weight: 0.3,
            time_boost_per_sec: 1.0 / 600.0,
            time_boost_cap: 0.25,
            jitter_amplitude: 0.001,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(120),
            countdown: Duration::from_secs(10),
            cooldown: Duration::from_secs(3),
            crash_guard: 1.05,
            trajectory_cap: 180,
            commit_scheme: CommitScheme::Preview,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            min_free_multiplier: 1.2,
            fee: 0.01,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            rng_seed: None,
            demo_stake: None,
            demo_auto_cashout: None,
            feed: FeedConfig::default(),
            hazard: HazardParams::default(),
            growth: GrowthParams::default(),
            engine: EngineConfig::default(),
            fees: FeeSchedule::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment loading
// ─────────────────────────────────────────────────────────────────────────────

/// `None` for a malformed value, which leaves the default in place.
fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = raw, "ignoring malformed setting, keeping default");
            None
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| parse_or_warn(key, &v))
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        config.log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        if let Some(addr) = env_parse("BLOCKFLIGHT_METRICS_ADDR") {
            config.metrics_addr = addr;
        }
        config.rng_seed = env_parse("BLOCKFLIGHT_RNG_SEED");
        config.demo_stake = std::env::var("BLOCKFLIGHT_DEMO_STAKE").ok();
        config.demo_auto_cashout = std::env::var("BLOCKFLIGHT_DEMO_AUTO_CASHOUT").ok();

        // Feed
        let feed = &mut config.feed;
        if let Ok(v) = std::env::var("BLOCKFLIGHT_PRIMARY_URL") {
            feed.primary_url = v;
        }
        if let Ok(v) = std::env::var("BLOCKFLIGHT_SECONDARY_URL") {
            feed.secondary_url = v;
        }
        if let Ok(v) = std::env::var("BLOCKFLIGHT_ASSET_ID") {
            feed.asset_id = v;
        }
        if let Some(v) = env_millis("BLOCKFLIGHT_POLL_INTERVAL_MS") {
            feed.poll_interval = v;
        }
        if let Some(v) = env_millis("BLOCKFLIGHT_MAX_BACKOFF_MS") {
            feed.max_backoff = v;
        }
        if let Some(v) = env_millis("BLOCKFLIGHT_FETCH_TIMEOUT_MS") {
            feed.fetch_timeout = v;
        }
        if let Some(v) = env_parse("BLOCKFLIGHT_INITIAL_PRICE") {
            feed.initial_price = v;
        }

        // Hazard
        if let Some(v) = env_parse("BLOCKFLIGHT_HAZARD_BASE") {
            config.hazard.base = v;
        }
        if let Some(v) = env_parse("BLOCKFLIGHT_HAZARD_MIN") {
            config.hazard.min_probability = v;
        }
        if let Some(v) = env_parse("BLOCKFLIGHT_HAZARD_MAX") {
            config.hazard.max_probability = v;
        }

        // Growth
        if let Some(v) = env_parse("BLOCKFLIGHT_BASE_INCREMENT") {
            config.growth.base_increment = v;
        }
        if let Some(v) = env_parse("BLOCKFLIGHT_JITTER") {
            config.growth.jitter_amplitude = v;
        }

        // Engine
        let engine = &mut config.engine;
        if let Some(v) = env_millis("BLOCKFLIGHT_TICK_MS") {
            engine.tick_period = v;
        }
        if let Some(v) = env_parse::<u64>("BLOCKFLIGHT_COUNTDOWN_SECS") {
            engine.countdown = Duration::from_secs(v);
        }
        if let Some(v) = env_millis("BLOCKFLIGHT_COOLDOWN_MS") {
            engine.cooldown = v;
        }
        if let Some(v) = env_parse("BLOCKFLIGHT_CRASH_GUARD") {
            engine.crash_guard = v;
        }
        if let Some(v) = env_parse("BLOCKFLIGHT_COMMIT_SCHEME") {
            engine.commit_scheme = v;
        }

        // Fees
        if let Some(v) = env_parse("BLOCKFLIGHT_FEE") {
            config.fees.fee = v;
        }
        if let Some(v) = env_parse("BLOCKFLIGHT_FEE_BELOW") {
            config.fees.min_free_multiplier = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.engine.tick_period.is_zero() {
            bail!("tick period must be non-zero");
        }
        let guard = self.engine.crash_guard;
        if !guard.is_finite() || guard < 1.0 {
            bail!("crash guard must be a finite multiplier of at least 1.0, got {guard}");
        }
        if self.feed.ema_short_window == 0 || self.feed.ema_long_window == 0 {
            bail!("EMA windows must be non-zero");
        }
        if self.feed.history_capacity < 2 {
            bail!("price history needs room for at least two samples");
        }
        if self.feed.poll_interval.is_zero() {
            bail!("poll interval must be non-zero");
        }
        let h = &self.hazard;
        if !(0.0..=1.0).contains(&h.min_probability)
            || !(0.0..=1.0).contains(&h.max_probability)
            || h.min_probability > h.max_probability
        {
            bail!(
                "hazard bounds [{}, {}] must be an ordered range inside [0, 1]",
                h.min_probability,
                h.max_probability
            );
        }
        for t in [&self.hazard.thresholds, &self.growth.thresholds] {
            if !(t.flat <= t.moderate && t.moderate <= t.strong) {
                bail!("trend thresholds must satisfy flat <= moderate <= strong");
            }
        }
        if !(0.0..1.0).contains(&self.fees.fee) {
            bail!("fee must be in [0, 1)");
        }
        Ok(())
    }
}
