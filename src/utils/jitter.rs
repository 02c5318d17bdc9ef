//! Injectable randomness for pacing and profile selection
//!
//! Production runs seed from OS entropy; tests seed explicitly so pause lengths
//! and scroll distances are reproducible.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;
use std::time::Duration;

/// Shared, thread-safe random source
#[derive(Debug)]
pub struct Jitter {
    rng: Mutex<ChaCha8Rng>,
}

impl Jitter {
    /// Seed from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    /// Deterministic sequence for tests and replays
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Uniform duration in `[min, max]`; returns `min` when the range is empty
    pub fn duration_between(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let lo = min.as_millis() as u64;
        let hi = max.as_millis() as u64;
        Duration::from_millis(self.with_rng(|rng| rng.gen_range(lo..=hi)))
    }

    /// Uniform integer in `[min, max]`
    pub fn int_between(&self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        self.with_rng(|rng| rng.gen_range(min..=max))
    }

    /// Pick one element, `None` for an empty slice
    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        self.with_rng(|rng| items.choose(rng))
    }

    fn with_rng<R>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> R) -> R {
        // A poisoned lock still holds a usable generator.
        let mut guard = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::from_entropy()
    }
}
