use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::traits::{Outcome, SettlementEvent, SettlementLedger, SettlementReceipt};
use crate::config::FeeSchedule;
use crate::game::payout::{net_profit, payout};

/// In-memory ledger: records one receipt per round and computes payouts with
/// the fee schedule. Nothing leaves the process.
pub struct PaperLedger {
    fees: FeeSchedule,
    next_entry_id: AtomicU64,
    receipts: DashMap<u64, SettlementReceipt>,
}

impl PaperLedger {
    pub fn new(fees: FeeSchedule) -> Self {
        Self {
            fees,
            next_entry_id: AtomicU64::new(1),
            receipts: DashMap::new(),
        }
    }

    pub fn receipt(&self, round_id: u64) -> Option<SettlementReceipt> {
        self.receipts.get(&round_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    /// Sum of `net` over every recorded round.
    pub fn total_net(&self) -> f64 {
        self.receipts.iter().map(|r| r.value().net).sum()
    }
}

#[async_trait]
impl SettlementLedger for PaperLedger {
    async fn report_outcome(&self, event: &SettlementEvent) -> anyhow::Result<SettlementReceipt> {
        if self.receipts.contains_key(&event.round_id) {
            anyhow::bail!("round {} already settled", event.round_id);
        }

        let (paid, net) = match (&event.wager, event.outcome) {
            (None, _) => (0.0, 0.0),
            (Some(w), Outcome::CashedOut) => (
                payout(w.amount_staked, event.multiplier, &self.fees),
                net_profit(w.amount_staked, event.multiplier, &self.fees),
            ),
            (Some(w), Outcome::Crashed) => (0.0, -w.amount_staked),
            // Operator abort: the wager is voided, not lost.
            (Some(_), Outcome::Stopped) => (0.0, 0.0),
        };

        let receipt = SettlementReceipt {
            entry_id: self.next_entry_id.fetch_add(1, Ordering::Relaxed),
            round_id: event.round_id,
            outcome: event.outcome,
            wager_ref: event.wager_ref().cloned(),
            payout: paid,
            net,
        };

        info!(
            entry_id = receipt.entry_id,
            round_id = receipt.round_id,
            outcome = receipt.outcome.as_str(),
            multiplier = event.multiplier,
            payout = receipt.payout,
            net = receipt.net,
            "PAPER SETTLEMENT"
        );

        self.receipts.insert(event.round_id, receipt.clone());
        Ok(receipt)
    }
}
