//! Round lifecycle state machine.
//!
//! ```text
//! Countdown ──start / countdown hits 0──▶ Flying ──┬─▶ CashedOut
//!     ▲                                             ├─▶ Crashed
//!     └────────────── cooldown elapsed ─────────────┴─▶ Stopped
//! ```
//!
//! The engine is plain synchronous state. One owner (the round loop) calls
//! [`RoundEngine::tick`] once per tick period and applies commands between
//! ticks, so nothing here needs a lock. Every tick reads the latest market
//! snapshot and the participant's wager; within a tick the auto cash-out
//! check always runs before the crash draw.

use serde::Serialize;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info};

use crate::config::{EngineConfig, GrowthParams, HazardParams};
use crate::entropy::Entropy;
use crate::error::{EngineError, Result};
use crate::game::growth::{next_multiplier, GrowthInput};
use crate::game::hazard::{crash_probability, HazardInput};
use crate::game::round::{Round, RoundState, SeedPair};
use crate::game::wager::Wager;
use crate::market_data::types::MarketSnapshot;
use crate::metrics::prometheus as m;
use crate::settlement::traits::{Outcome, SettlementEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePhase {
    Countdown { remaining: Duration },
    Flying { round_id: u64, multiplier: f64, elapsed: Duration },
    Crashed { round_id: u64, crash_multiplier: f64 },
    CashedOut { round_id: u64, at_multiplier: f64 },
    Stopped { round_id: u64, multiplier: f64 },
}

impl EnginePhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Countdown { .. } => "countdown",
            Self::Flying { .. } => "flying",
            Self::Crashed { .. } => "crashed",
            Self::CashedOut { .. } => "cashed_out",
            Self::Stopped { .. } => "stopped",
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    RoundStarted {
        round_id: u64,
        seed_commitment: String,
        seed_reveal: Option<String>,
        manual: bool,
    },
    MultiplierAdvanced {
        round_id: u64,
        multiplier: f64,
        crash_probability: f64,
    },
    Settled(SettlementEvent),
    CountdownStarted {
        remaining: Duration,
    },
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub events: Vec<EngineEvent>,
}

impl TickReport {
    pub fn settlements(&self) -> impl Iterator<Item = &SettlementEvent> {
        self.events.iter().filter_map(|e| match e {
            EngineEvent::Settled(s) => Some(s),
            _ => None,
        })
    }
}

/// Read model for displays.
#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    pub phase: &'static str,
    pub round_id: Option<u64>,
    pub multiplier: f64,
    pub countdown_secs: Option<u64>,
    pub crash_probability: f64,
    pub trajectory: Vec<f64>,
    pub seed_commitment: Option<String>,
    pub seed_reveal: Option<String>,
    pub feed_degraded: bool,
}

pub struct RoundEngine {
    config: EngineConfig,
    hazard: HazardParams,
    growth: GrowthParams,
    next_round_id: u64,
    current: Option<Round>,
    previous: Option<Round>,
    countdown: Option<Duration>,
    cooldown: Duration,
    wager: Option<Wager>,
    crash_probability: f64,
    feed_degraded: bool,
}

impl RoundEngine {
    /// Starts in Countdown with the full countdown remaining.
    pub fn new(config: EngineConfig, hazard: HazardParams, growth: GrowthParams) -> Self {
        Self {
            countdown: Some(config.countdown),
            crash_probability: hazard.min_probability,
            config,
            hazard,
            growth,
            next_round_id: 1,
            current: None,
            previous: None,
            cooldown: Duration::ZERO,
            wager: None,
            feed_degraded: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> EnginePhase {
        if let Some(remaining) = self.countdown {
            return EnginePhase::Countdown { remaining };
        }
        match &self.current {
            Some(r) => match r.state {
                RoundState::Flying => EnginePhase::Flying {
                    round_id: r.id,
                    multiplier: r.multiplier,
                    elapsed: r.elapsed,
                },
                RoundState::Crashed => EnginePhase::Crashed {
                    round_id: r.id,
                    crash_multiplier: r.crash_multiplier.unwrap_or(r.multiplier),
                },
                RoundState::CashedOut => EnginePhase::CashedOut {
                    round_id: r.id,
                    at_multiplier: r.cashout_multiplier.unwrap_or(r.multiplier),
                },
                RoundState::Stopped => EnginePhase::Stopped {
                    round_id: r.id,
                    multiplier: r.multiplier,
                },
                RoundState::Countdown => EnginePhase::Countdown {
                    remaining: Duration::ZERO,
                },
            },
            None => EnginePhase::Countdown {
                remaining: Duration::ZERO,
            },
        }
    }

    /// Round in flight or cooling down. `None` during countdown.
    pub fn current_round(&self) -> Option<&Round> {
        self.current.as_ref()
    }

    /// Most recently finished round once the next countdown has begun.
    pub fn previous_round(&self) -> Option<&Round> {
        self.previous.as_ref()
    }

    pub fn is_flying(&self) -> bool {
        self.flying_round().is_some()
    }

    pub fn view(&self) -> RoundView {
        let round = self.current.as_ref();
        RoundView {
            phase: self.phase().name(),
            round_id: round.map(|r| r.id),
            multiplier: round.map_or(1.0, |r| r.multiplier),
            countdown_secs: self.countdown.map(|d| d.as_secs_f64().ceil() as u64),
            crash_probability: self.crash_probability,
            trajectory: round.map(|r| r.trajectory.to_vec()).unwrap_or_default(),
            seed_commitment: round.map(|r| r.seed_commitment().to_string()),
            seed_reveal: round.and_then(|r| r.seed_reveal().map(str::to_string)),
            feed_degraded: self.feed_degraded,
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Wager that the next command or tick settles against.
    pub fn set_wager(&mut self, wager: Option<Wager>) {
        self.wager = wager;
    }

    /// Participant-initiated launch. Only valid during countdown.
    pub fn start(&mut self, entropy: &mut dyn Entropy) -> Result<EngineEvent> {
        if self.countdown.is_none() {
            return Err(self.reject("start"));
        }
        Ok(self.launch(entropy, true))
    }

    /// Cash out at the multiplier as of this call.
    pub fn cash_out(&mut self) -> Result<SettlementEvent> {
        let Some(multiplier) = self.flying_round().map(|r| r.multiplier) else {
            return Err(self.reject("cash_out"));
        };
        self.finish(Outcome::CashedOut, multiplier, false)
            .ok_or_else(|| self.reject("cash_out"))
    }

    /// Operator abort. No payout is implied.
    pub fn stop(&mut self) -> Result<SettlementEvent> {
        let Some(multiplier) = self.flying_round().map(|r| r.multiplier) else {
            return Err(self.reject("stop"));
        };
        self.finish(Outcome::Stopped, multiplier, false)
            .ok_or_else(|| self.reject("stop"))
    }

    // ── Tick ────────────────────────────────────────────────────────

    /// Advance exactly one tick period.
    pub fn tick(
        &mut self,
        snapshot: &MarketSnapshot,
        wager: Option<Wager>,
        entropy: &mut dyn Entropy,
    ) -> TickReport {
        let started = Instant::now();
        let period = self.config.tick_period;
        let mut report = TickReport::default();

        self.feed_degraded = snapshot.is_degraded();
        self.set_wager(wager);

        if let Some(remaining) = self.countdown {
            let remaining = remaining.saturating_sub(period);
            if remaining.is_zero() {
                report.events.push(self.launch(entropy, false));
            } else {
                self.countdown = Some(remaining);
            }
        } else if self.is_flying() {
            self.fly(snapshot, entropy, &mut report);
        } else {
            self.cooldown = self.cooldown.saturating_sub(period);
            if self.cooldown.is_zero() {
                report.events.push(self.enter_countdown());
            }
        }

        m::record_tick_duration_us(started.elapsed().as_micros());
        report
    }

    fn fly(&mut self, snapshot: &MarketSnapshot, entropy: &mut dyn Entropy, report: &mut TickReport) {
        let period = self.config.tick_period;
        let guard = self.config.crash_guard;
        let Some(round) = self.current.as_mut().filter(|r| r.state == RoundState::Flying) else {
            return;
        };

        round.elapsed += period;
        let elapsed_secs = round.elapsed.as_secs_f64();

        let next = next_multiplier(
            &GrowthInput {
                previous: round.multiplier,
                ema_short: snapshot.ema_short,
                ema_long: snapshot.ema_long,
                volatility: snapshot.volatility,
                elapsed_secs,
            },
            &self.growth,
            entropy.uniform(),
        );
        round.multiplier = next;
        round.trajectory.push(next);

        let p = crash_probability(
            &HazardInput {
                elapsed_secs,
                ema_short: snapshot.ema_short,
                ema_long: snapshot.ema_long,
                volatility: snapshot.volatility,
                multiplier: next,
                market_impact: snapshot.market_impact,
            },
            &self.hazard,
        );
        self.crash_probability = p;

        report.events.push(EngineEvent::MultiplierAdvanced {
            round_id: round.id,
            multiplier: next,
            crash_probability: p,
        });

        // Cash-out wins any same-tick race with the crash draw.
        let outcome = if self.wager.as_ref().is_some_and(|w| w.auto_cashout_hit(next)) {
            Some((Outcome::CashedOut, true))
        } else if next > guard && entropy.uniform() < p {
            Some((Outcome::Crashed, false))
        } else {
            None
        };

        if let Some((outcome, auto)) = outcome {
            report.events.extend(self.finish(outcome, next, auto).map(EngineEvent::Settled));
        }
    }

    // ── Transitions ─────────────────────────────────────────────────

    fn launch(&mut self, entropy: &mut dyn Entropy, manual: bool) -> EngineEvent {
        let round_id = self.next_round_id;
        self.next_round_id += 1;

        let seed = SeedPair::new(entropy.seed_token(), self.config.commit_scheme);
        let round = Round::launch(round_id, seed, self.config.trajectory_cap);

        let event = EngineEvent::RoundStarted {
            round_id,
            seed_commitment: round.seed_commitment().to_string(),
            seed_reveal: round.seed_reveal().map(str::to_string),
            manual,
        };
        info!(
            round_id,
            commitment = round.seed_commitment(),
            manual,
            "round launched"
        );

        if let Some(old) = self.current.replace(round) {
            self.previous = Some(old);
        }
        self.countdown = None;
        self.crash_probability = self.hazard.min_probability;
        event
    }

    /// Moves the flying round into its terminal state. `None` if nothing is flying.
    fn finish(&mut self, outcome: Outcome, multiplier: f64, auto: bool) -> Option<SettlementEvent> {
        let state = match outcome {
            Outcome::Crashed => RoundState::Crashed,
            Outcome::CashedOut => RoundState::CashedOut,
            Outcome::Stopped => RoundState::Stopped,
        };

        let wager = self.wager.clone();
        let round = self.current.as_mut().filter(|r| r.state == RoundState::Flying)?;
        self.cooldown = self.config.cooldown;

        round.advance_to(state);
        match outcome {
            Outcome::Crashed => round.crash_multiplier = Some(multiplier),
            Outcome::CashedOut => round.cashout_multiplier = Some(multiplier),
            Outcome::Stopped => {}
        }

        info!(
            round_id = round.id,
            outcome = outcome.as_str(),
            multiplier,
            auto,
            elapsed_ms = round.elapsed.as_millis() as u64,
            "round finished"
        );
        m::record_round_outcome(outcome.as_str(), multiplier);

        Some(SettlementEvent {
            round_id: round.id,
            outcome,
            multiplier,
            auto_cashout: auto,
            wager,
            seed_commitment: round.seed_commitment().to_string(),
            seed_reveal: round.seed_reveal().map(str::to_string),
            settled_at: SystemTime::now(),
        })
    }

    fn enter_countdown(&mut self) -> EngineEvent {
        if let Some(done) = self.current.take() {
            self.previous = Some(done);
        }
        self.countdown = Some(self.config.countdown);
        debug!(countdown_ms = self.config.countdown.as_millis() as u64, "countdown started");
        EngineEvent::CountdownStarted {
            remaining: self.config.countdown,
        }
    }

    fn flying_round(&self) -> Option<&Round> {
        self.current.as_ref().filter(|r| r.state == RoundState::Flying)
    }

    fn reject(&self, command: &'static str) -> EngineError {
        m::record_command_rejected(command);
        EngineError::InvariantViolation(format!(
            "`{command}` not allowed while {}",
            self.phase().name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::ScriptedEntropy;
    use crate::game::wager::WagerRef;

    fn engine() -> RoundEngine {
        RoundEngine::new(
            EngineConfig::default(),
            HazardParams::default(),
            GrowthParams::default(),
        )
    }

    fn neutral() -> MarketSnapshot {
        MarketSnapshot::initial(2400.0, 0.01)
    }

    fn wager(auto: Option<f64>) -> Wager {
        Wager::new(WagerRef("seat-1".into()), 1.0, auto).unwrap()
    }

    #[test]
    fn countdown_auto_launches() {
        let mut e = engine();
        let mut rng = ScriptedEntropy::constant(0.999);
        let period = e.config().tick_period.as_millis();
        let ticks = e.config().countdown.as_millis().div_ceil(period) as usize;

        for _ in 0..ticks - 1 {
            e.tick(&neutral(), None, &mut rng);
            assert!(matches!(e.phase(), EnginePhase::Countdown { .. }));
        }
        let report = e.tick(&neutral(), None, &mut rng);
        assert!(matches!(
            report.events.as_slice(),
            [EngineEvent::RoundStarted { round_id: 1, manual: false, .. }]
        ));
        assert!(e.is_flying());
    }

    #[test]
    fn start_while_flying_is_rejected() {
        let mut e = engine();
        let mut rng = ScriptedEntropy::constant(0.999);
        e.start(&mut rng).unwrap();

        let err = e.start(&mut rng).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
        assert_eq!(e.current_round().unwrap().id, 1);
    }

    #[test]
    fn manual_cashout_settles_the_seated_wager() {
        let mut e = engine();
        let mut rng = ScriptedEntropy::constant(0.999);
        e.tick(&neutral(), Some(wager(None)), &mut rng);
        e.start(&mut rng).unwrap();

        let replacement = Wager::new(WagerRef("seat-2".into()), 3.0, None).unwrap();
        e.set_wager(Some(replacement.clone()));
        let event = e.cash_out().unwrap();
        assert_eq!(event.wager, Some(replacement));
    }

    #[test]
    fn cash_out_and_stop_need_a_flying_round() {
        let mut e = engine();
        assert!(matches!(e.cash_out(), Err(EngineError::InvariantViolation(_))));
        assert!(matches!(e.stop(), Err(EngineError::InvariantViolation(_))));
    }

    #[test]
    fn stop_is_terminal_without_payout_semantics() {
        let mut e = engine();
        let mut rng = ScriptedEntropy::constant(0.999);
        e.start(&mut rng).unwrap();
        e.tick(&neutral(), None, &mut rng);

        let event = e.stop().unwrap();
        assert_eq!(event.outcome, Outcome::Stopped);
        assert!(matches!(e.phase(), EnginePhase::Stopped { round_id: 1, .. }));
        assert!(e.cash_out().is_err());
    }

    #[test]
    fn auto_cashout_fires_at_target() {
        let mut e = engine();
        let mut rng = ScriptedEntropy::constant(0.999);
        e.start(&mut rng).unwrap();

        let target = 1.02;
        let mut settled = None;
        for _ in 0..100 {
            let report = e.tick(&neutral(), Some(wager(Some(target))), &mut rng);
            if let Some(s) = report.settlements().next() {
                settled = Some(s.clone());
                break;
            }
        }

        let settled = settled.expect("auto cash-out should fire");
        assert_eq!(settled.outcome, Outcome::CashedOut);
        assert!(settled.auto_cashout);
        assert!(settled.multiplier >= target);
        assert_eq!(settled.wager.unwrap().reference, WagerRef("seat-1".into()));
    }

    #[test]
    fn no_crash_draw_below_guard() {
        let mut e = engine();
        // Every draw is 0.0: jitter pulls down, and any crash draw succeeds.
        let mut rng = ScriptedEntropy::constant(0.0);
        e.start(&mut rng).unwrap();

        let mut crashed_at = None;
        for _ in 0..1_000 {
            let report = e.tick(&neutral(), None, &mut rng);
            if let Some(s) = report.settlements().next() {
                crashed_at = Some(s.multiplier);
                break;
            }
        }

        let crashed_at = crashed_at.expect("round should crash once above the guard");
        assert!(crashed_at > e.config().crash_guard);
        let trajectory = e.current_round().unwrap().trajectory.to_vec();
        let before_crash = &trajectory[..trajectory.len() - 1];
        assert!(before_crash.iter().all(|m| *m <= e.config().crash_guard));
    }

    #[test]
    fn terminal_rounds_return_to_countdown_after_cooldown() {
        let mut e = engine();
        let mut rng = ScriptedEntropy::constant(0.999);
        e.start(&mut rng).unwrap();
        e.cash_out().unwrap();

        let cooldown_ticks =
            (e.config().cooldown.as_millis() / e.config().tick_period.as_millis()) as usize + 1;
        for _ in 0..cooldown_ticks {
            e.tick(&neutral(), None, &mut rng);
        }

        assert!(matches!(e.phase(), EnginePhase::Countdown { .. }));
        assert!(e.current_round().is_none());
        assert_eq!(e.previous_round().unwrap().state, RoundState::CashedOut);
    }

    #[test]
    fn view_reports_degraded_feed() {
        let mut e = engine();
        let mut rng = ScriptedEntropy::constant(0.999);
        let mut snap = neutral();
        snap.health.healthy = false;

        e.tick(&snap, None, &mut rng);
        assert!(e.view().feed_degraded);
        assert_eq!(e.view().phase, "countdown");
    }
}
