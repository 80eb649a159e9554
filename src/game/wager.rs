//! Participant wagers as seen by the engine.
//!
//! The engine never holds funds. It only reads the stake and the optional
//! auto cash-out target each tick, and tags settlement events with the
//! wager's reference so the ledger can find it.

use serde::Serialize;
use std::sync::{Arc, RwLock};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WagerRef(pub String);

impl std::fmt::Display for WagerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wager {
    pub reference: WagerRef,
    pub amount_staked: f64,
    /// Only targets above 1.0 are kept.
    pub auto_cashout_multiplier: Option<f64>,
}

impl Wager {
    /// Validates a stake. An unusable auto cash-out target is dropped rather
    /// than failing the whole wager.
    pub fn new(reference: WagerRef, amount_staked: f64, auto_cashout: Option<f64>) -> Result<Self> {
        if !amount_staked.is_finite() || amount_staked <= 0.0 {
            return Err(EngineError::InvalidWager(format!(
                "stake must be a positive number, got {amount_staked}"
            )));
        }

        Ok(Self {
            reference,
            amount_staked,
            auto_cashout_multiplier: auto_cashout.filter(|t| t.is_finite() && *t > 1.0),
        })
    }

    /// Parses raw form input. Blank or non-numeric targets mean "no auto
    /// cash-out"; a non-numeric stake is an invalid wager.
    pub fn parse(reference: WagerRef, stake: &str, auto_cashout: &str) -> Result<Self> {
        let amount: f64 = stake
            .trim()
            .parse()
            .map_err(|_| EngineError::InvalidWager(format!("stake `{stake}` is not a number")))?;
        let target = auto_cashout.trim().parse::<f64>().ok();
        Self::new(reference, amount, target)
    }

    /// True when the auto cash-out target has been reached.
    pub fn auto_cashout_hit(&self, multiplier: f64) -> bool {
        self.auto_cashout_multiplier.is_some_and(|t| multiplier >= t)
    }
}

/// Where the engine reads the active participant's wager each tick.
pub trait WagerSource: Send + Sync {
    fn current_wager(&self) -> Option<Wager>;
}

/// Shared single-seat wager holder. Cheap to clone (just an Arc bump).
#[derive(Debug, Clone, Default)]
pub struct WagerSlot {
    inner: Arc<RwLock<Option<Wager>>>,
}

impl WagerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, wager: Option<Wager>) {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        *guard = wager;
    }
}

impl WagerSource for WagerSlot {
    fn current_wager(&self) -> Option<Wager> {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
