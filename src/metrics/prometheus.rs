use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Start the Prometheus HTTP exporter.
/// After this call, any metrics recorded via the `metrics` crate
/// macros (counter!, histogram!) are automatically exported at /metrics.
pub fn init_metrics_server(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    Ok(())
}

// ── Feed metrics ─────────────────────────────────────────────────

pub fn record_feed_poll(source: &str) {
    counter!("feed_polls_total", "source" => source.to_string()).increment(1);
}

pub fn record_feed_fallback() {
    counter!("feed_fallbacks_total").increment(1);
}

pub fn record_feed_backoff_ms(delay_ms: f64) {
    histogram!("feed_backoff_ms").record(delay_ms);
}

pub fn record_feed_price(price_usd: f64) {
    gauge!("feed_price_usd").set(price_usd);
}

// ── Engine metrics ───────────────────────────────────────────────

pub fn record_round_outcome(outcome: &str, multiplier: f64) {
    counter!("rounds_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("round_final_multiplier", "outcome" => outcome.to_string()).record(multiplier);
}

/// Wall time spent inside one engine tick.
pub fn record_tick_duration_us(duration_us: u128) {
    histogram!("engine_tick_duration_us").record(duration_us as f64);
}

pub fn record_command_rejected(command: &str) {
    counter!("engine_commands_rejected_total", "command" => command.to_string()).increment(1);
}

// ── Settlement metrics ───────────────────────────────────────────

pub fn record_settlement(outcome: &str) {
    counter!("settlements_reported_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_settlement_failure() {
    counter!("settlement_failures_total").increment(1);
}
