//! The single scheduler loop that owns a [`RoundEngine`].
//!
//! Commands and ticks are serialised through one `select!`. Commands are
//! polled first, so a cash-out that arrives alongside a tick is applied
//! before that tick can draw a crash. The loop exits once every
//! [`RoundHandle`] is dropped or the settlement channel closes.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::entropy::Entropy;
use crate::error::{EngineError, Result};
use crate::game::engine::{RoundEngine, RoundView};
use crate::game::wager::{Wager, WagerSlot, WagerSource};
use crate::market_data::types::MarketSnapshot;
use crate::settlement::traits::SettlementEvent;
use crate::state::snapshot_cell::SnapshotCell;

/// Command channel buffer. Commands are human-rate.
const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    CashOut,
    Stop,
}

#[derive(Debug)]
pub struct EngineCommand {
    pub kind: CommandKind,
    pub reply: Option<oneshot::Sender<Result<()>>>,
}

/// Cloneable front door to a running round loop.
#[derive(Clone)]
pub struct RoundHandle {
    commands: mpsc::Sender<EngineCommand>,
    wagers: WagerSlot,
    view: SnapshotCell<RoundView>,
}

impl RoundHandle {
    pub async fn start(&self) -> Result<()> {
        self.send(CommandKind::Start).await
    }

    pub async fn cash_out(&self) -> Result<()> {
        self.send(CommandKind::CashOut).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(CommandKind::Stop).await
    }

    /// Seats (or clears) the participant whose wager the engine reads.
    pub fn set_wager(&self, wager: Option<Wager>) {
        self.wagers.set(wager);
    }

    /// Latest published engine view.
    pub fn view(&self) -> Arc<RoundView> {
        self.view.load()
    }

    async fn send(&self, kind: CommandKind) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let closed = || EngineError::InvariantViolation("round loop is not running".to_string());

        self.commands
            .send(EngineCommand { kind, reply: Some(tx) })
            .await
            .map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }
}

/// Spawn the round loop on the current runtime.
pub fn spawn_round_loop(
    engine: RoundEngine,
    entropy: Box<dyn Entropy>,
    market: SnapshotCell<MarketSnapshot>,
    settlements: mpsc::Sender<SettlementEvent>,
) -> (RoundHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let wagers = WagerSlot::new();
    let view = SnapshotCell::new(engine.view());

    let handle = RoundHandle {
        commands: command_tx,
        wagers: wagers.clone(),
        view: view.clone(),
    };

    let task = tokio::spawn(run_round_loop(
        engine,
        entropy,
        market,
        Box::new(wagers),
        command_rx,
        settlements,
        view,
    ));

    (handle, task)
}

pub async fn run_round_loop(
    mut engine: RoundEngine,
    mut entropy: Box<dyn Entropy>,
    market: SnapshotCell<MarketSnapshot>,
    wagers: Box<dyn WagerSource>,
    mut commands: mpsc::Receiver<EngineCommand>,
    settlements: mpsc::Sender<SettlementEvent>,
    view: SnapshotCell<RoundView>,
) {
    let mut ticker = tokio::time::interval(engine.config().tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        tick_ms = engine.config().tick_period.as_millis() as u64,
        "round loop started"
    );

    loop {
        tokio::select! {
            biased;

            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    info!("all round handles dropped, round loop shutting down");
                    break;
                };

                engine.set_wager(wagers.current_wager());
                let (settled, outcome) = match apply_command(&mut engine, entropy.as_mut(), cmd.kind) {
                    Ok(settled) => (settled, Ok(())),
                    Err(err) => {
                        warn!(command = ?cmd.kind, error = %err, "command rejected");
                        (None, Err(err))
                    }
                };

                // View and ledger see the command before the caller does.
                view.store(engine.view());
                let ledger_open = match settled {
                    Some(event) => settlements.send(event).await.is_ok(),
                    None => true,
                };
                if let Some(reply) = cmd.reply {
                    let _ = reply.send(outcome);
                }
                if !ledger_open {
                    warn!("settlement channel closed, round loop shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let snapshot = market.load();
                let wager = wagers.current_wager();
                let report = engine.tick(&snapshot, wager, entropy.as_mut());

                for event in report.settlements() {
                    if settlements.send(event.clone()).await.is_err() {
                        warn!("settlement channel closed, round loop shutting down");
                        return;
                    }
                }
                if !report.events.is_empty() {
                    debug!(events = report.events.len(), phase = engine.phase().name(), "tick");
                }
                view.store(engine.view());
            }
        }
    }
}

fn apply_command(
    engine: &mut RoundEngine,
    entropy: &mut dyn Entropy,
    kind: CommandKind,
) -> Result<Option<SettlementEvent>> {
    match kind {
        CommandKind::Start => engine.start(entropy).map(|_| None),
        CommandKind::CashOut => engine.cash_out().map(Some),
        CommandKind::Stop => engine.stop().map(Some),
    }
}
