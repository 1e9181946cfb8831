// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Lock regions: the compiler's unit of mutual exclusion.
//!
//! A region corresponds to one maximal guard predicate. Two kinds of slot
//! participate:
//!
//! - **watcher slots** `(state, transition)` of the guarding process, which
//!   acquire the region transiently around the guarded transition;
//! - the **watched side**: one process plus the set of its states excluded
//!   by the guard. The watched process *resides* in the region — it holds
//!   the lock for as long as its committed state lies in the excluded set,
//!   so a watcher that acquires the region can trust the guard without ever
//!   reading the full joint state.
//!
//! Regions are computed once by [`crate::compile`] and shared read-only by
//! every runner afterwards.

use std::collections::BTreeSet;
use std::fmt;

use crate::guard::StateSet;
use crate::ident::{ProcessId, RegionId, StateId, TransitionId};

/// A watcher slot: one guarded transition out of one state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct WatcherSlot {
    /// Guarding process.
    pub process: ProcessId,
    /// Source state of the guarded transition.
    pub state: StateId,
    /// The guarded transition itself.
    pub transition: TransitionId,
}

/// One compiled mutual-exclusion region.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RegionSpec {
    id: RegionId,
    watched: ProcessId,
    excluded: StateSet,
    watchers: BTreeSet<WatcherSlot>,
}

impl RegionSpec {
    pub(crate) fn new(
        id: RegionId,
        watched: ProcessId,
        excluded: StateSet,
        watchers: BTreeSet<WatcherSlot>,
    ) -> Self {
        Self {
            id,
            watched,
            excluded,
            watchers,
        }
    }

    /// Region id; doubles as the global acquisition order.
    #[must_use]
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// The watched process.
    #[must_use]
    pub fn watched(&self) -> ProcessId {
        self.watched
    }

    /// States of the watched process that exclude the guarded transitions.
    #[must_use]
    pub fn excluded(&self) -> &StateSet {
        &self.excluded
    }

    /// Watcher slots in canonical order.
    pub fn watchers(&self) -> impl Iterator<Item = WatcherSlot> + '_ {
        self.watchers.iter().copied()
    }

    /// Returns true when `slot` watches through this region.
    #[must_use]
    pub fn has_watcher(&self, slot: WatcherSlot) -> bool {
        self.watchers.contains(&slot)
    }

    /// Returns true when the watched process residing in `state` must hold
    /// this region.
    #[must_use]
    pub fn resident(&self, process: ProcessId, state: StateId) -> bool {
        process == self.watched && self.excluded.contains(state)
    }
}

impl fmt::Display for RegionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: watched {} ∈ {} ⊣ ", self.id, self.watched, self.excluded)?;
        for (i, slot) in self.watchers().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}/{}·{}", slot.process, slot.state, slot.transition)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residency_is_membership_in_the_excluded_set() {
        let excluded: StateSet = [StateId(1), StateId(2)].into_iter().collect();
        let region = RegionSpec::new(
            RegionId(0),
            ProcessId(1),
            excluded,
            BTreeSet::new(),
        );
        assert!(region.resident(ProcessId(1), StateId(2)));
        assert!(!region.resident(ProcessId(1), StateId(0)));
        assert!(!region.resident(ProcessId(0), StateId(2)));
    }
}
