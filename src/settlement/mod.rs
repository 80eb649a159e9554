pub mod paper;
pub mod traits;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::metrics::prometheus as m;
use traits::{SettlementEvent, SettlementLedger};

/// Bridges the round engine to the consumer's ledger.
/// Forwards each terminal-round event, in round order.
pub async fn run_settlement_bridge(
    mut event_rx: mpsc::Receiver<SettlementEvent>,
    ledger: Box<dyn SettlementLedger>,
) {
    info!("settlement bridge started");

    while let Some(event) = event_rx.recv().await {
        match ledger.report_outcome(&event).await {
            Ok(receipt) => {
                m::record_settlement(event.outcome.as_str());
                info!(
                    round_id = event.round_id,
                    outcome = event.outcome.as_str(),
                    multiplier = event.multiplier,
                    wager = ?event.wager_ref(),
                    entry_id = receipt.entry_id,
                    "outcome reported"
                );
            }
            Err(err) => {
                m::record_settlement_failure();
                warn!(
                    round_id = event.round_id,
                    outcome = event.outcome.as_str(),
                    error = %err,
                    "ledger rejected outcome"
                );
            }
        }
    }

    info!("settlement channel closed, settlement bridge shutting down");
}
