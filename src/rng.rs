// =============================================================================
// Dry-run RNG — uniform rolls in [0, 9999], seedable for reproducibility
// =============================================================================
//
// The remote API is the roll authority in live play; this RNG only stands
// in for it when `dry_run=true`. Reproducibility across runs with the same
// seed is required by the parallel/sequential equivalence property, so this
// wraps a named, versioned generator (ChaCha8) rather than `rand::thread_rng`.
// =============================================================================

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Uniform roll generator over `[0, 9999]`.
pub struct DryRunRng {
    inner: ChaCha8Rng,
}

impl DryRunRng {
    /// Seed deterministically. Same seed always produces the same sequence
    /// of `roll()` calls, on any platform.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Seed from OS entropy, for live dry-run sessions that don't need
    /// reproducibility.
    pub fn from_entropy() -> Self {
        Self {
            inner: ChaCha8Rng::from_entropy(),
        }
    }

    /// Draw one roll in `[0, 9999]`.
    pub fn roll(&mut self) -> u32 {
        self.inner.next_u32() % 10_000
    }
}

impl RngCore for DryRunRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
