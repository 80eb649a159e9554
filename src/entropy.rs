//! Injectable randomness for crash sampling, multiplier jitter, price
//! simulation and round seeds.

use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

/// Length of a generated round seed.
const SEED_LEN: usize = 24;

pub trait Entropy: Send {
    /// Uniform draw in `[0, 1)`.
    fn uniform(&mut self) -> f64;

    /// Fresh secret seed for a round's commit/reveal pair.
    fn seed_token(&mut self) -> String;
}

/// ChaCha8-backed entropy. Seeded for reproducible runs, OS-seeded otherwise.
pub struct ChaChaEntropy {
    rng: ChaCha8Rng,
}

impl ChaChaEntropy {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_os() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }
}

impl Entropy for ChaChaEntropy {
    fn uniform(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }

    fn seed_token(&mut self) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(SEED_LEN)
            .map(char::from)
            .collect()
    }
}

/// Replays a fixed list of draws, then repeats `fallback` forever.
///
/// Seeds are `seed-1`, `seed-2`, ... so replays are fully deterministic.
#[derive(Debug, Clone)]
pub struct ScriptedEntropy {
    draws: VecDeque<f64>,
    fallback: f64,
    seeds_issued: u64,
}

impl ScriptedEntropy {
    pub fn new(draws: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            draws: draws.into_iter().collect(),
            fallback,
            seeds_issued: 0,
        }
    }

    /// Every draw returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(std::iter::empty(), value)
    }
}

impl Entropy for ScriptedEntropy {
    fn uniform(&mut self) -> f64 {
        self.draws.pop_front().unwrap_or(self.fallback)
    }

    fn seed_token(&mut self) -> String {
        self.seeds_issued += 1;
        format!("seed-{}", self.seeds_issued)
    }
}

impl<E: Entropy + ?Sized> Entropy for Box<E> {
    fn uniform(&mut self) -> f64 {
        (**self).uniform()
    }

    fn seed_token(&mut self) -> String {
        (**self).seed_token()
    }
}
