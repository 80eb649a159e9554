//! Per-tick multiplier integration.
//!
//! ```text
//! inc  = base · decay^(m - 1) · knowledge_bonus · (1 + vol · w) · (1 + min(t · r, cap))
//! next = max(m, 1, m + inc + jitter)
//! ```
//! The step shrinks as the multiplier grows. Jitter is symmetric but can never
//! take the multiplier below its previous value.

use crate::config::GrowthParams;
use crate::game::trend::{trend, TrendBand};

#[derive(Debug, Clone, Copy)]
pub struct GrowthInput {
    pub previous: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    pub volatility: f64,
    pub elapsed_secs: f64,
}

/// Deterministic part of the step, before jitter.
pub fn increment(input: &GrowthInput, params: &GrowthParams) -> f64 {
    let previous = input.previous.max(1.0);
    let volatility = if input.volatility.is_finite() { input.volatility.max(0.0) } else { 0.0 };
    let elapsed = if input.elapsed_secs.is_finite() { input.elapsed_secs.max(0.0) } else { 0.0 };

    let band = TrendBand::classify(trend(input.ema_short, input.ema_long), &params.thresholds);
    let decayed = params.base_increment * params.decay.powf(previous - 1.0);
    let knowledge = band.factor(&params.knowledge_bonus);
    let vol_bonus = 1.0 + volatility * params.volatility_weight;
    let time_boost = 1.0 + (elapsed * params.time_boost_per_sec).min(params.time_boost_cap);

    let inc = decayed * knowledge * vol_bonus * time_boost;
    if inc.is_finite() { inc.max(0.0) } else { 0.0 }
}

/// `u` is a uniform draw in `[0, 1)` used for jitter.
pub fn next_multiplier(input: &GrowthInput, params: &GrowthParams, u: f64) -> f64 {
    let previous = input.previous.max(1.0);
    let jitter = (u - 0.5) * params.jitter_amplitude;
    let next = previous + increment(input, params) + jitter;
    if next.is_finite() { next.max(previous) } else { previous }
}
