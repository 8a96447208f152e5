//! Conversation selection for cue/query records.
//!
//! Whether a conversation may be reused across a batch is a configuration
//! choice, see [`PairingPolicy`].

use crate::CuebenchError;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PairingPolicy {
    /// Uniform choice per draw, repetition allowed.
    #[default]
    Independent,
    /// Shuffled pass over the pool; reshuffled once every conversation was used.
    WithoutReplacement,
    /// Cyclic order over the pool, no randomness.
    RoundRobin,
}

/// Hands out pool positions according to a [`PairingPolicy`].
#[derive(Debug)]
pub struct Pairer {
    policy: PairingPolicy,
    pool_len: usize,
    pending: Vec<usize>,
    cursor: usize,
}

impl Pairer {
    pub fn new(policy: PairingPolicy, pool_len: usize) -> Result<Self, CuebenchError> {
        if pool_len == 0 {
            return Err(CuebenchError::Configuration(
                "no conversations available for pairing".into(),
            ));
        }
        Ok(Self {
            policy,
            pool_len,
            pending: Vec::new(),
            cursor: 0,
        })
    }

    /// Next pool position. Every retry of a record calls this again.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        match self.policy {
            PairingPolicy::Independent => rng.gen_range(0..self.pool_len),
            PairingPolicy::WithoutReplacement => {
                if self.pending.is_empty() {
                    self.pending = (0..self.pool_len).collect();
                    self.pending.shuffle(rng);
                }
                // non-empty: refilled above
                self.pending.pop().unwrap_or(0)
            }
            PairingPolicy::RoundRobin => {
                let pos = self.cursor % self.pool_len;
                self.cursor += 1;
                pos
            }
        }
    }
}
