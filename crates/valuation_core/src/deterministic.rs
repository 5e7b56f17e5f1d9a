//! Deterministic utilities for reproducible training
//!
//! Bootstrap sampling must produce the same trees for the same seed on every
//! platform and under any thread schedule, so the forest does not depend on
//! an external RNG implementation. Each tree draws from its own stream whose
//! seed is derived from the forest seed and the tree index.

use std::num::Wrapping;

/// Linear Congruential Generator for deterministic pseudo-randomness.
/// 64-bit state with Knuth's MMIX constants; output is taken from the high
/// half of the state, where the low-period bits of an LCG do not reach.
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<u64>,
}

impl LcgRng {
    const MULTIPLIER: u64 = 6_364_136_223_846_793_005;
    const INCREMENT: u64 = 1_442_695_040_888_963_407;

    pub fn new(seed: u64) -> Self {
        let mut rng = Self {
            state: Wrapping(seed),
        };
        // Move away from small seeds before the first draw
        rng.step();
        rng
    }

    fn step(&mut self) {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
    }

    /// Next 32 random bits
    pub fn next_u32(&mut self) -> u32 {
        self.step();
        (self.state.0 >> 32) as u32
    }

    /// Next 64 random bits
    pub fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.next_u32());
        let lo = u64::from(self.next_u32());
        (hi << 32) | lo
    }

    /// Uniform index in `[0, bound)`; returns 0 when `bound` is 0
    pub fn next_index(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        ((u64::from(self.next_u32()) * bound as u64) >> 32) as usize
    }

    /// Uniform value in `[0.0, 1.0)`
    pub fn next_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

/// Deterministic xxhash64-style mix of a seed and a stream index
pub fn derive_seed(seed: u64, stream: u64) -> u64 {
    const PRIME1: u64 = 0x9E37_79B1_85EB_CA87;
    const PRIME2: u64 = 0xC2B2_AE3D_27D4_EB4F;
    const PRIME3: u64 = 0x1656_67B1_9E37_79F9;
    const PRIME5: u64 = 0x85EB_CA77_C2B2_AE63;

    let mut h = seed.wrapping_add(PRIME5);
    h = h.wrapping_add(stream.wrapping_mul(PRIME3));
    h = h.rotate_left(17).wrapping_mul(PRIME2);

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;

    h
}

/// Draw `n` indices from `[0, n)` with replacement
pub fn bootstrap_indices(rng: &mut LcgRng, n: usize) -> Vec<usize> {
    (0..n).map(|_| rng.next_index(n)).collect()
}
