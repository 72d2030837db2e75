use std::collections::HashSet;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::types::{Result, StoreError};

/// Shortest id the store will hand out.
pub const MIN_ID_LEN: usize = 4;
/// Longest id: the full 128 random bits in hex.
pub const MAX_ID_LEN: usize = 32;
/// Redraws attempted before an append gives up on finding a free id.
pub const MAX_ID_ATTEMPTS: usize = 16;

/// Random lowercase-hex id source.
///
/// Ids are the first `len` hex digits of a random 128-bit value. Short ids
/// collide with non-negligible probability at scale, so callers pass the set
/// of ids already taken and a colliding draw is simply redrawn.
pub struct IdGenerator {
    len: usize,
    rng: Mutex<ChaCha8Rng>,
}

impl IdGenerator {
    /// Generator seeded from the thread RNG.
    pub fn new(len: usize) -> Self {
        Self::with_rng(len, ChaCha8Rng::seed_from_u64(rand::random()))
    }

    /// Deterministic generator, for tests and reproducible fixtures.
    pub fn seeded(len: usize, seed: u64) -> Self {
        Self::with_rng(len, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(len: usize, rng: ChaCha8Rng) -> Self {
        Self {
            len: len.clamp(MIN_ID_LEN, MAX_ID_LEN),
            rng: Mutex::new(rng),
        }
    }

    /// Number of hex digits per id.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Draws one id without any uniqueness check.
    pub fn draw(&self) -> String {
        let value: u128 = self.rng.lock().gen();
        let mut id = format!("{value:032x}");
        id.truncate(self.len);
        id
    }

    /// Draws an id absent from `taken`.
    pub fn fresh(&self, taken: &HashSet<&str>) -> Result<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.draw();
            if !taken.contains(id.as_str()) {
                return Ok(id);
            }
            tracing::warn!(id = %id, "ids.collision");
        }
        Err(StoreError::Conflict(format!(
            "no free {}-digit id after {MAX_ID_ATTEMPTS} attempts",
            self.len
        )))
    }
}
