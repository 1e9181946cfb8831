// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Start rendezvous.
//!
//! A counting barrier sized actors + 1 (the coordinator). Each runner
//! acquires its initial residency locks and then parks here; the
//! coordinator initializes the shared resource and then parks too. The
//! barrier releases everyone atomically, so no actor can observe an
//! uninitialized resource and no side effect runs before every thread
//! holds its initial lock position.

use std::sync::Barrier;

pub(crate) struct StartBarrier {
    inner: Barrier,
}

impl StartBarrier {
    /// Creates a barrier for `actors` runners plus the coordinator.
    pub(crate) fn new(actors: usize) -> Self {
        Self {
            inner: Barrier::new(actors + 1),
        }
    }

    /// Blocks until every participant has registered.
    pub(crate) fn wait(&self) {
        // The leader token is irrelevant here; release is all that matters.
        let _ = self.inner.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn releases_all_participants_together() {
        let barrier = StartBarrier::new(3);
        let before = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    before.fetch_add(1, Ordering::SeqCst);
                    barrier.wait();
                });
            }
            // Coordinator: everyone must have registered once we pass.
            barrier.wait();
            assert_eq!(before.load(Ordering::SeqCst), 3);
        });
    }
}
