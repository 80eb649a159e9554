use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use blockflight_engine::config::{EngineConfig, FeeSchedule, GrowthParams, HazardParams};
use blockflight_engine::entropy::{Entropy, ScriptedEntropy};
use blockflight_engine::game::driver::{run_round_loop, spawn_round_loop, CommandKind, EngineCommand};
use blockflight_engine::game::engine::RoundEngine;
use blockflight_engine::game::payout::payout;
use blockflight_engine::game::wager::{Wager, WagerRef, WagerSlot};
use blockflight_engine::market_data::types::MarketSnapshot;
use blockflight_engine::settlement::paper::PaperLedger;
use blockflight_engine::settlement::traits::{Outcome, SettlementLedger};
use blockflight_engine::state::snapshot_cell::SnapshotCell;
use blockflight_engine::EngineError;

fn fast_engine() -> RoundEngine {
    let mut config = EngineConfig::default();
    config.tick_period = Duration::from_millis(5);
    // Long enough that only an explicit start launches.
    config.countdown = Duration::from_secs(60);
    RoundEngine::new(config, HazardParams::default(), GrowthParams::default())
}

#[tokio::test]
async fn cash_out_through_the_handle_settles_once() {
    let market = SnapshotCell::new(MarketSnapshot::initial(2400.0, 0.01));
    let (settle_tx, mut settle_rx) = mpsc::channel(8);
    let (round, task) = spawn_round_loop(
        fast_engine(),
        Box::new(ScriptedEntropy::constant(0.999)),
        market,
        settle_tx,
    );
    round.set_wager(Some(Wager::new(WagerRef("seat-7".into()), 2.0, None).unwrap()));

    assert!(matches!(
        round.cash_out().await,
        Err(EngineError::InvariantViolation(_))
    ));

    round.start().await.unwrap();
    assert_eq!(round.view().phase, "flying");
    assert!(matches!(round.start().await, Err(EngineError::InvariantViolation(_))));

    tokio::time::sleep(Duration::from_millis(60)).await;
    round.cash_out().await.unwrap();
    assert_eq!(round.view().phase, "cashed_out");

    let event = timeout(Duration::from_secs(1), settle_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.round_id, 1);
    assert_eq!(event.outcome, Outcome::CashedOut);
    assert!(event.multiplier > 1.0);
    assert_eq!(event.multiplier, round.view().multiplier);

    let fees = FeeSchedule::default();
    let ledger = PaperLedger::new(fees);
    let receipt = ledger.report_outcome(&event).await.unwrap();
    assert_eq!(receipt.payout, payout(2.0, event.multiplier, &fees));
    assert_eq!(receipt.wager_ref, Some(WagerRef("seat-7".into())));

    // Ticks after a cash-out never settle the round again.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(settle_rx.try_recv().is_err());

    drop(round);
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_voids_the_round() {
    let market = SnapshotCell::new(MarketSnapshot::initial(2400.0, 0.01));
    let (settle_tx, mut settle_rx) = mpsc::channel(8);
    let (round, _task) = spawn_round_loop(
        fast_engine(),
        Box::new(ScriptedEntropy::constant(0.999)),
        market,
        settle_tx,
    );
    round.set_wager(Some(Wager::new(WagerRef("seat-1".into()), 1.0, None).unwrap()));

    round.start().await.unwrap();
    round.stop().await.unwrap();

    let event = timeout(Duration::from_secs(1), settle_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.outcome, Outcome::Stopped);

    let ledger = PaperLedger::new(FeeSchedule::default());
    let receipt = ledger.report_outcome(&event).await.unwrap();
    assert_eq!(receipt.payout, 0.0);
    assert_eq!(receipt.net, 0.0);
}

#[tokio::test]
async fn commands_fail_once_the_loop_is_gone() {
    let market = SnapshotCell::new(MarketSnapshot::initial(2400.0, 0.01));
    let (settle_tx, settle_rx) = mpsc::channel(8);
    let (round, task) = spawn_round_loop(
        fast_engine(),
        Box::new(ScriptedEntropy::constant(0.999)),
        market,
        settle_tx,
    );

    round.start().await.unwrap();
    task.abort();
    let _ = task.await;
    drop(settle_rx);

    assert!(matches!(round.stop().await, Err(EngineError::InvariantViolation(_))));
}

#[tokio::test]
async fn cash_out_reads_the_wager_seated_since_the_last_tick() {
    let mut config = EngineConfig::default();
    config.tick_period = Duration::from_secs(5);
    config.countdown = Duration::from_secs(60);
    let engine = RoundEngine::new(config, HazardParams::default(), GrowthParams::default());

    let market = SnapshotCell::new(MarketSnapshot::initial(2400.0, 0.01));
    let (settle_tx, mut settle_rx) = mpsc::channel(8);
    let (round, _task) = spawn_round_loop(
        engine,
        Box::new(ScriptedEntropy::constant(0.999)),
        market,
        settle_tx,
    );

    // Let the immediate first tick pass with an empty seat.
    tokio::time::sleep(Duration::from_millis(50)).await;
    round.set_wager(Some(Wager::new(WagerRef("seat-9".into()), 1.5, None).unwrap()));
    round.start().await.unwrap();
    round.cash_out().await.unwrap();

    let event = timeout(Duration::from_secs(1), settle_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.outcome, Outcome::CashedOut);
    assert_eq!(event.wager_ref(), Some(&WagerRef("seat-9".into())));
    assert_eq!(event.wager.unwrap().amount_staked, 1.5);
}

#[tokio::test]
async fn queued_cash_out_beats_a_due_crash_tick() {
    let mut config = EngineConfig::default();
    config.crash_guard = 1.0;
    config.tick_period = Duration::from_millis(5);
    let mut engine = RoundEngine::new(config, HazardParams::default(), GrowthParams::default());

    // Every crash draw succeeds, so the first flying tick would crash.
    let mut entropy: Box<dyn Entropy> = Box::new(ScriptedEntropy::constant(0.0));
    engine.start(entropy.as_mut()).unwrap();
    let view = SnapshotCell::new(engine.view());

    // The cash-out is waiting before the loop runs; the first tick is due at once.
    let (command_tx, command_rx) = mpsc::channel(4);
    let (reply_tx, reply_rx) = oneshot::channel();
    command_tx
        .send(EngineCommand { kind: CommandKind::CashOut, reply: Some(reply_tx) })
        .await
        .unwrap();

    let (settle_tx, mut settle_rx) = mpsc::channel(8);
    let task = tokio::spawn(run_round_loop(
        engine,
        entropy,
        SnapshotCell::new(MarketSnapshot::initial(2400.0, 0.01)),
        Box::new(WagerSlot::new()),
        command_rx,
        settle_tx,
        view.clone(),
    ));

    reply_rx.await.unwrap().unwrap();
    let event = timeout(Duration::from_secs(1), settle_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.outcome, Outcome::CashedOut);
    assert_eq!(event.multiplier, 1.0);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(settle_rx.try_recv().is_err());
    assert_eq!(view.load().phase, "cashed_out");

    drop(command_tx);
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
}
