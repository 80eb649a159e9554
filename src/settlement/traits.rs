use async_trait::async_trait;
use serde::Serialize;
use std::time::SystemTime;

use crate::game::wager::{Wager, WagerRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    Crashed,
    CashedOut,
    Stopped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crashed => "crashed",
            Self::CashedOut => "cashed_out",
            Self::Stopped => "stopped",
        }
    }
}

/// Emitted once per round, on the transition into a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementEvent {
    pub round_id: u64,
    pub outcome: Outcome,
    /// Crash multiplier, cash-out multiplier, or the multiplier at stop.
    pub multiplier: f64,
    /// True when the cash-out came from the wager's auto target.
    pub auto_cashout: bool,
    pub wager: Option<Wager>,
    pub seed_commitment: String,
    pub seed_reveal: Option<String>,
    pub settled_at: SystemTime,
}

impl SettlementEvent {
    pub fn wager_ref(&self) -> Option<&WagerRef> {
        self.wager.as_ref().map(|w| &w.reference)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReceipt {
    pub entry_id: u64,
    pub round_id: u64,
    pub outcome: Outcome,
    pub wager_ref: Option<WagerRef>,
    pub payout: f64,
    /// Payout minus stake. Zero for rounds without a wager.
    pub net: f64,
}

/// Consumer-side bookkeeping for round outcomes.
///
/// The engine has no idea how payouts are persisted or submitted; it only
/// hands over the event.
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    async fn report_outcome(&self, event: &SettlementEvent) -> anyhow::Result<SettlementReceipt>;
}
