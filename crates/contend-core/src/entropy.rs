// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared pseudo-random source.
//!
//! One `AtomicU64` cell feeds every runner thread. The atomicity policy is
//! explicit and deliberately minimal:
//!
//! - each load and store is a single atomic operation (no torn reads);
//! - the draw is load → splitmix64 → store, *not* compare-and-swap, so
//!   concurrent draws race and lose updates by design — that race is what
//!   varies interleavings between runs;
//! - `Relaxed` ordering throughout: no cross-thread sequencing is promised
//!   or wanted.
//!
//! Fixing the seed therefore does **not** make a multi-threaded run
//! reproducible; replay determinism requires external schedule control and
//! is out of scope here. Not cryptographically secure; use only for
//! schedule fuzzing.

use std::sync::atomic::{AtomicU64, Ordering};

/// SplitMix64 golden-gamma increment.
const GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

fn splitmix64(state: u64) -> u64 {
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Shared racy entropy cell.
#[derive(Debug)]
pub struct SharedEntropy {
    cell: AtomicU64,
}

impl SharedEntropy {
    /// Creates a source from a 64-bit seed.
    ///
    /// A zero seed is replaced with the gamma constant so the first draws
    /// are not degenerate.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let seed = if seed == 0 { GAMMA } else { seed };
        Self {
            cell: AtomicU64::new(seed),
        }
    }

    /// Draws the next value.
    ///
    /// Single-threaded use walks the splitmix64 sequence; concurrent use
    /// races on the cell (intentionally, see the module docs).
    #[must_use]
    pub fn draw(&self) -> u64 {
        let state = self.cell.load(Ordering::Relaxed).wrapping_add(GAMMA);
        self.cell.store(state, Ordering::Relaxed);
        splitmix64(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_threaded_draws_walk_the_splitmix_sequence() {
        let a = SharedEntropy::new(42);
        let b = SharedEntropy::new(42);
        let xs: Vec<u64> = (0..8).map(|_| a.draw()).collect();
        let ys: Vec<u64> = (0..8).map(|_| b.draw()).collect();
        assert_eq!(xs, ys);
        assert_ne!(xs[0], xs[1]);
    }

    #[test]
    fn zero_seed_is_fixed_up() {
        let z = SharedEntropy::new(0);
        let g = SharedEntropy::new(GAMMA);
        assert_eq!(z.draw(), g.draw());
    }
}
