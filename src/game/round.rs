use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use crate::config::CommitScheme;

/// Length of the base64 prefix shown by [`CommitScheme::Preview`].
const PREVIEW_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RoundState {
    Countdown,
    Flying,
    Crashed,
    CashedOut,
    Stopped,
}

impl RoundState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Crashed | Self::CashedOut | Self::Stopped)
    }

    /// One-way transitions only: Countdown → Flying → terminal.
    pub fn can_become(self, next: RoundState) -> bool {
        match (self, next) {
            (Self::Countdown, Self::Flying) => true,
            (Self::Flying, next) => next.is_terminal(),
            _ => false,
        }
    }
}

/// Append-only multiplier samples, keeping the newest `cap`.
#[derive(Debug, Clone, Serialize)]
pub struct Trajectory {
    samples: VecDeque<f64>,
    cap: usize,
}

impl Trajectory {
    /// Starts at `[1.0]`.
    pub fn new(cap: usize) -> Self {
        let mut samples = VecDeque::with_capacity(cap.max(1));
        samples.push_back(1.0);
        Self { samples, cap: cap.max(1) }
    }

    pub fn push(&mut self, multiplier: f64) {
        if self.samples.len() == self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(multiplier);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

/// Commit/reveal pair for one round.
#[derive(Debug, Clone)]
pub struct SeedPair {
    scheme: CommitScheme,
    commitment: String,
    seed: String,
}

impl SeedPair {
    pub fn new(seed: String, scheme: CommitScheme) -> Self {
        let commitment = match scheme {
            CommitScheme::Preview => {
                let encoded = STANDARD.encode(seed.as_bytes());
                let prefix: String = encoded.chars().take(PREVIEW_LEN).collect();
                format!("{prefix}…")
            }
            CommitScheme::Sha256 => hex::encode(Sha256::digest(seed.as_bytes())),
        };
        Self { scheme, commitment, seed }
    }

    pub fn commitment(&self) -> &str {
        &self.commitment
    }

    /// Seed as published for a round in `state`. The preview scheme shows it
    /// from launch; sha256 holds it back until the round is over.
    pub fn reveal(&self, state: RoundState) -> Option<&str> {
        match self.scheme {
            CommitScheme::Preview => Some(&self.seed),
            CommitScheme::Sha256 if state.is_terminal() => Some(&self.seed),
            CommitScheme::Sha256 => None,
        }
    }

    /// Checks a revealed seed against a sha256 commitment.
    pub fn verify(commitment: &str, seed: &str) -> bool {
        hex::encode(Sha256::digest(seed.as_bytes())) == commitment
    }
}

#[derive(Debug, Clone)]
pub struct Round {
    pub id: u64,
    pub seed: SeedPair,
    pub started_at: SystemTime,
    pub state: RoundState,
    pub multiplier: f64,
    pub elapsed: Duration,
    pub crash_multiplier: Option<f64>,
    pub cashout_multiplier: Option<f64>,
    pub trajectory: Trajectory,
}

impl Round {
    /// A freshly launched round: multiplier 1.0, trajectory `[1.0]`, Flying.
    pub fn launch(id: u64, seed: SeedPair, trajectory_cap: usize) -> Self {
        Self {
            id,
            seed,
            started_at: SystemTime::now(),
            state: RoundState::Flying,
            multiplier: 1.0,
            elapsed: Duration::ZERO,
            crash_multiplier: None,
            cashout_multiplier: None,
            trajectory: Trajectory::new(trajectory_cap),
        }
    }

    pub fn seed_commitment(&self) -> &str {
        self.seed.commitment()
    }

    pub fn seed_reveal(&self) -> Option<&str> {
        self.seed.reveal(self.state)
    }

    pub(crate) fn advance_to(&mut self, next: RoundState) {
        debug_assert!(self.state.can_become(next), "{:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
