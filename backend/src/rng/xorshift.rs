//! xorshift64* random stream
//!
//! Fast, deterministic PRNG with 64-bit state. Passes BigCrush, which is
//! plenty for dispatch tie-breaking, exploration and resampling.
//!
//! # Determinism
//!
//! Same seed → same sequence of draws. Replays, tests and bootstrap
//! confidence intervals all depend on this.

use serde::{Deserialize, Serialize};

/// A single deterministic random stream (xorshift64*)
///
/// Streams are normally obtained from [`crate::rng::RngManager`], which
/// derives their seeds from a root seed and a stream name.
///
/// # Example
/// ```
/// use dispatch_simulator_core_rs::rng::RngStream;
///
/// let mut rng = RngStream::new(12345);
/// let value = rng.next();
/// let index = rng.next_index(10); // [0, 10)
/// assert!(index < 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngStream {
    /// Internal state (64-bit, never zero)
    state: u64,
}

impl RngStream {
    /// Create a new stream with given seed
    pub fn new(seed: u64) -> Self {
        // xorshift requires a non-zero state
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate a random index in [0, len)
    ///
    /// # Panics
    /// Panics if len == 0
    pub fn next_index(&mut self, len: usize) -> usize {
        assert!(len > 0, "len must be positive");
        (self.next() % len as u64) as usize
    }

    /// Generate random f64 in range [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // 53 high bits → [0.0, 1.0)
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Sample an exponential variate with the given mean
    pub fn exponential(&mut self, mean: f64) -> f64 {
        // 1 - u keeps the argument of ln strictly positive
        let u = 1.0 - self.next_f64();
        -u.ln() * mean
    }
}
