use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use blockflight_engine::config::Config;
use blockflight_engine::entropy::{ChaChaEntropy, Entropy};
use blockflight_engine::game::driver::spawn_round_loop;
use blockflight_engine::game::engine::RoundEngine;
use blockflight_engine::game::wager::{Wager, WagerRef};
use blockflight_engine::market_data::adapters::coingecko::CoinGeckoSource;
use blockflight_engine::market_data::adapters::cryptocompare::CryptoCompareSource;
use blockflight_engine::market_data::adapters::PriceSource;
use blockflight_engine::market_data::feed::MarketFeed;
use blockflight_engine::metrics;
use blockflight_engine::settlement::paper::PaperLedger;
use blockflight_engine::settlement::run_settlement_bridge;

/// Engine→ledger channel buffer. One event per round at most.
const SETTLEMENT_CHANNEL_BUFFER: usize = 256;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn entropy(seed: Option<u64>, stream: u64) -> Box<dyn Entropy> {
    match seed {
        Some(seed) => Box::new(ChaChaEntropy::seeded(seed.wrapping_add(stream))),
        None => Box::new(ChaChaEntropy::from_os()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    metrics::init_metrics_server(config.metrics_addr)?;

    info!(log_level = %config.log_level, metrics = %config.metrics_addr, "blockflight engine starting");

    let http = reqwest::Client::builder()
        .timeout(config.feed.fetch_timeout)
        .build()?;
    let sources: Vec<Box<dyn PriceSource>> = vec![
        Box::new(CoinGeckoSource::new(
            http.clone(),
            config.feed.primary_url.clone(),
            config.feed.asset_id.clone(),
        )),
        Box::new(CryptoCompareSource::new(http, config.feed.secondary_url.clone())),
    ];

    let feed = Arc::new(MarketFeed::new(
        config.feed.clone(),
        sources,
        entropy(config.rng_seed, 1),
    ));
    let subscription = feed.subscribe(config.feed.poll_interval);

    let (settle_tx, settle_rx) = mpsc::channel(SETTLEMENT_CHANNEL_BUFFER);
    let ledger = PaperLedger::new(config.fees);
    let bridge_handle = tokio::spawn(run_settlement_bridge(settle_rx, Box::new(ledger)));

    let engine = RoundEngine::new(
        config.engine.clone(),
        config.hazard.clone(),
        config.growth.clone(),
    );
    let (round, mut round_handle) = spawn_round_loop(
        engine,
        entropy(config.rng_seed, 2),
        feed.snapshot_cell(),
        settle_tx,
    );

    // Optional demo seat; otherwise rounds run in spectator mode.
    if let Some(stake) = &config.demo_stake {
        let target = config.demo_auto_cashout.as_deref().unwrap_or("");
        match Wager::parse(WagerRef("demo".to_string()), stake, target) {
            Ok(wager) => {
                info!(stake = wager.amount_staked, auto_cashout = ?wager.auto_cashout_multiplier, "demo seat active");
                round.set_wager(Some(wager));
            }
            Err(err) => warn!(error = %err, "ignoring demo wager"),
        }
    }

    let round_finished = tokio::select! {
        res = &mut round_handle => {
            match res {
                Ok(()) => warn!("round loop exited"),
                Err(err) => warn!(error = %err, "round loop panicked"),
            }
            true
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
            false
        }
    };

    // Teardown: no orphaned polls or ticks once we leave.
    subscription.cancel();
    drop(round);
    if !round_finished {
        round_handle.abort();
        let _ = round_handle.await;
    }
    if let Err(err) = bridge_handle.await {
        warn!(error = %err, "settlement bridge panicked");
    }

    let last = feed.current_snapshot();
    info!(last_price = last.price_usd, degraded = last.is_degraded(), "engine stopped");

    Ok(())
}
