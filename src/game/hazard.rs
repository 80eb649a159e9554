//! Per-tick crash probability.
//!
//! ```text
//! p = base · trend_factor · vol_factor · time_factor · impact_factor
//!   + max(0, m - 1)^exponent / damping
//! ```
//! clamped to `[min_probability, max_probability]`. Bullish trends shrink the
//! hazard and bearish trends grow it; the multiplier term makes risk
//! accelerate the higher a round flies.

use crate::config::HazardParams;
use crate::game::trend::{trend, TrendBand};

#[derive(Debug, Clone, Copy)]
pub struct HazardInput {
    pub elapsed_secs: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    pub volatility: f64,
    pub multiplier: f64,
    pub market_impact: f64,
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() { v } else { fallback }
}

pub fn crash_probability(input: &HazardInput, params: &HazardParams) -> f64 {
    let elapsed = finite_or(input.elapsed_secs, 0.0).max(0.0);
    let volatility = finite_or(input.volatility, 0.0).max(0.0);
    let impact = finite_or(input.market_impact, 0.0).max(0.0);
    let multiplier = finite_or(input.multiplier, 1.0);

    let band = TrendBand::classify(trend(input.ema_short, input.ema_long), &params.thresholds);
    let trend_factor = band.factor(&params.trend_factors);
    let vol_factor = 1.0 + (volatility * params.volatility_scale).min(params.volatility_cap);
    let time_factor = 1.0 + (elapsed / params.time_horizon_secs).min(params.time_cap);
    let impact_factor = 1.0 + impact * params.impact_weight;
    let multiplier_risk =
        (multiplier - 1.0).max(0.0).powf(params.multiplier_exponent) / params.multiplier_damping;

    let p = params.base * trend_factor * vol_factor * time_factor * impact_factor + multiplier_risk;
    if !p.is_finite() {
        return params.max_probability;
    }
    p.clamp(params.min_probability, params.max_probability)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(ema_short: f64, multiplier: f64, elapsed_secs: f64) -> HazardInput {
        HazardInput {
            elapsed_secs,
            ema_short,
            ema_long: 2400.0,
            volatility: 0.01,
            multiplier,
            market_impact: 0.2,
        }
    }

    #[test]
    fn bounded_for_grid_of_inputs() {
        let params = HazardParams::default();
        for ema_short in [2000.0, 2350.0, 2390.0, 2400.0, 2420.0, 2450.0, 3000.0] {
            for multiplier in [1.0, 1.01, 1.5, 2.0, 5.0, 20.0, 1_000.0] {
                for elapsed in [0.0, 1.0, 30.0, 300.0, 10_000.0] {
                    for volatility in [0.0, 0.01, 0.5, 10.0] {
                        let mut i = input(ema_short, multiplier, elapsed);
                        i.volatility = volatility;
                        let p = crash_probability(&i, &params);
                        assert!(p >= 0.001 && p <= 0.30, "p={p} for {i:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn non_finite_inputs_stay_bounded() {
        let params = HazardParams::default();
        let mut i = input(2400.0, f64::INFINITY, f64::NAN);
        i.volatility = f64::NAN;
        let p = crash_probability(&i, &params);
        assert!(p >= params.min_probability && p <= params.max_probability);
    }

    #[test]
    fn starts_near_zero() {
        let params = HazardParams::default();
        let p = crash_probability(&input(2400.0, 1.0, 0.0), &params);
        assert!(p < 0.01);
    }

    #[test]
    fn bullish_is_safer_than_bearish() {
        let params = HazardParams::default();
        // |trend| = 0.02 either way: strong band
        for multiplier in [1.06, 1.3, 1.8] {
            let bull = crash_probability(&input(2448.0, multiplier, 10.0), &params);
            let bear = crash_probability(&input(2352.0, multiplier, 10.0), &params);
            assert!(bull < bear, "bull={bull} bear={bear} at {multiplier}");
        }

        // moderate band
        let bull = crash_probability(&input(2428.8, 1.2, 10.0), &params);
        let bear = crash_probability(&input(2371.2, 1.2, 10.0), &params);
        assert!(bull < bear);
    }

    #[test]
    fn grows_with_multiplier_and_time() {
        let params = HazardParams::default();
        let mut last = 0.0;
        for multiplier in [1.0, 1.2, 1.5, 2.0, 2.5] {
            let p = crash_probability(&input(2400.0, multiplier, 5.0), &params);
            assert!(p >= last);
            last = p;
        }

        let early = crash_probability(&input(2400.0, 1.1, 1.0), &params);
        let late = crash_probability(&input(2400.0, 1.1, 100.0), &params);
        assert!(late > early);
    }

    #[test]
    fn volatility_and_impact_raise_hazard() {
        let params = HazardParams::default();
        let calm = crash_probability(&input(2400.0, 1.1, 5.0), &params);

        let mut volatile = input(2400.0, 1.1, 5.0);
        volatile.volatility = 0.05;
        assert!(crash_probability(&volatile, &params) > calm);

        let mut impacted = input(2400.0, 1.1, 5.0);
        impacted.market_impact = 2.0;
        assert!(crash_probability(&impacted, &params) > calm);
    }

    #[test]
    fn eventually_hits_the_ceiling() {
        let params = HazardParams::default();
        let p = crash_probability(&input(2400.0, 10.0, 60.0), &params);
        assert_eq!(p, params.max_probability);
    }
}
