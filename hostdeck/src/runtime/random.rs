//! Randomness source for simulated outcomes.
//!
//! Everything that is simulated (provisioning failures, build outcomes,
//! synthetic metrics and addresses) draws from a `RandomSource`, so tests can
//! pin outcomes with a seed or a fixed value.

use std::net::Ipv4Addr;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Injectable random number source.
pub trait RandomSource: Send + Sync {
    /// Uniform value in `[0, 1)`.
    fn next_f64(&self) -> f64;

    /// Uniform 64-bit value.
    fn next_u64(&self) -> u64;

    /// Uniform value in `[low, high)`.
    fn range_f64(&self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Uniform value in `[low, high)`. Returns `low` for an empty range.
    fn range_u64(&self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        low + self.next_u64() % (high - low)
    }

    /// `true` with probability `p`.
    fn chance(&self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::rng().random::<f64>()
    }

    fn next_u64(&self) -> u64 {
        rand::rng().random::<u64>()
    }
}

/// Reproducible RNG seeded from a `u64`.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.rng.lock().random::<f64>()
    }

    fn next_u64(&self) -> u64 {
        self.rng.lock().random::<u64>()
    }
}

/// Always returns the same draw. `FixedRandom(0.0)` makes every `chance` succeed.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0.clamp(0.0, 1.0 - f64::EPSILON)
    }

    fn next_u64(&self) -> u64 {
        (self.next_f64() * u64::MAX as f64) as u64
    }
}

/// Synthetic public-looking IPv4 address.
pub fn synthetic_ipv4(random: &dyn RandomSource) -> Ipv4Addr {
    Ipv4Addr::new(
        random.range_u64(11, 224) as u8,
        random.range_u64(0, 256) as u8,
        random.range_u64(0, 256) as u8,
        random.range_u64(1, 255) as u8,
    )
}
