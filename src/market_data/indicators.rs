//! Price history and the indicators derived from it.

use std::collections::VecDeque;

/// Smoothing factor for an N-sample EMA.
pub fn ema_alpha(window: u32) -> f64 {
    2.0 / (window as f64 + 1.0)
}

/// One EMA step. The first sample seeds the average to itself.
pub fn ema_step(prev: Option<f64>, price: f64, alpha: f64) -> f64 {
    match prev {
        Some(prev) => prev + alpha * (price - prev),
        None => price,
    }
}

/// Bounded FIFO of observed prices.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, price: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(price);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Most recent per-step return, if there are two samples.
    pub fn last_return(&self) -> Option<f64> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        let prev = self.samples[n - 2];
        let last = self.samples[n - 1];
        (prev != 0.0).then(|| (last - prev) / prev)
    }

    /// Sample standard deviation of per-step returns over the whole history.
    ///
    /// Returns `fallback` until `min_samples` prices have been seen.
    pub fn volatility(&self, min_samples: usize, fallback: f64) -> f64 {
        if self.samples.len() < min_samples.max(2) {
            return fallback;
        }

        let returns: Vec<f64> = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .filter(|(prev, _)| **prev != 0.0)
            .map(|(prev, next)| (next - prev) / prev)
            .collect();

        if returns.len() < 2 {
            return fallback;
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / (n - 1.0);
        let sd = variance.sqrt();
        if sd.is_finite() { sd } else { fallback }
    }
}

/// Market impact decays geometrically and is bumped by fresh shocks.
pub fn impact_step(prev: f64, last_return: f64, volatility_change: f64, decay: f64, cap: f64) -> f64 {
    let shock = last_return.abs() * 100.0 + volatility_change.abs() * 50.0;
    (prev * decay + shock).clamp(0.0, cap)
}
