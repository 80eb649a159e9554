//! Trend banding shared by the hazard model and the multiplier integrator.

use crate::config::{BandFactors, TrendThresholds};

/// `(ema_short - ema_long) / max(1, ema_long)`.
pub fn trend(ema_short: f64, ema_long: f64) -> f64 {
    let t = (ema_short - ema_long) / ema_long.max(1.0);
    if t.is_finite() { t } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendBand {
    StrongBull,
    MildBull,
    /// Between the flat and moderate thresholds, either direction.
    Neutral,
    Flat,
    MildBear,
    StrongBear,
}

impl TrendBand {
    pub fn classify(trend: f64, t: &TrendThresholds) -> Self {
        let strength = trend.abs();
        if strength > t.strong {
            if trend > 0.0 { Self::StrongBull } else { Self::StrongBear }
        } else if strength > t.moderate {
            if trend > 0.0 { Self::MildBull } else { Self::MildBear }
        } else if strength < t.flat {
            Self::Flat
        } else {
            Self::Neutral
        }
    }

    pub fn factor(self, factors: &BandFactors) -> f64 {
        match self {
            Self::StrongBull => factors.strong_bull,
            Self::MildBull => factors.mild_bull,
            Self::Neutral => factors.neutral,
            Self::Flat => factors.flat,
            Self::MildBear => factors.mild_bear,
            Self::StrongBear => factors.strong_bear,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBull => "strong_bull",
            Self::MildBull => "mild_bull",
            Self::Neutral => "neutral",
            Self::Flat => "flat",
            Self::MildBear => "mild_bear",
            Self::StrongBear => "strong_bear",
        }
    }
}
