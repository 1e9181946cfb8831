// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Guard predicates over other actors' states.
//!
//! A [`Guard`] is a conjunction of constraints, each mapping another
//! process to the subset of its states in which the guarded transition may
//! fire. Guards are evaluated as set-membership tests against a
//! specification object; the compiler never sees (and the runtime never
//! re-derives) hand-enumerated disjunctions.

use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;

use crate::ident::{ProcessId, StateId};

/// Ordered set of state identifiers within a single process.
///
/// Ordering makes compilation deterministic: iteration, canonical
/// encodings, and region keys all derive from the `BTreeSet` order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateSet(BTreeSet<StateId>);

impl StateSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Inserts a state id.
    pub fn insert(&mut self, state: StateId) {
        self.0.insert(state);
    }

    /// Returns true if `state` is a member.
    #[must_use]
    pub fn contains(&self, state: StateId) -> bool {
        self.0.contains(&state)
    }

    /// Returns an iterator over members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = StateId> + '_ {
        self.0.iter().copied()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Early-exit intersection check via the merge walk on sorted iterators.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        let mut it_a = self.0.iter();
        let mut it_b = other.0.iter();
        let mut va = it_a.next();
        let mut vb = it_b.next();
        while let (Some(x), Some(y)) = (va, vb) {
            match x.cmp(y) {
                core::cmp::Ordering::Less => va = it_a.next(),
                core::cmp::Ordering::Greater => vb = it_b.next(),
                core::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// Returns true if every member of `self` is a member of `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Set difference, `self ∖ other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self(self.0.difference(&other.0).copied().collect())
    }
}

impl FromIterator<StateId> for StateSet {
    fn from_iter<I: IntoIterator<Item = StateId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, state) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{state}")?;
        }
        write!(f, "}}")
    }
}

/// Conjunction of per-process allowed-state constraints.
///
/// A transition carrying a guard may only fire while every constrained
/// process sits in one of its allowed states. Constraints on the same
/// process are intersected at insertion, so the map holds at most one
/// entry per watched process.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Guard {
    constraints: BTreeMap<ProcessId, StateSet>,
}

impl Guard {
    /// Creates an unconstrained guard (always true until `require` is called).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint: `process` must be in one of `allowed`.
    ///
    /// Repeated constraints on the same process intersect.
    #[must_use]
    pub fn require<I: IntoIterator<Item = StateId>>(mut self, process: ProcessId, allowed: I) -> Self {
        let allowed: StateSet = allowed.into_iter().collect();
        match self.constraints.entry(process) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(allowed);
            }
            btree_map::Entry::Occupied(mut slot) => {
                let merged: StateSet = slot
                    .get()
                    .iter()
                    .filter(|state| allowed.contains(*state))
                    .collect();
                slot.insert(merged);
            }
        }
        self
    }

    /// Returns the constraints in ascending watched-process order.
    pub fn constraints(&self) -> impl Iterator<Item = (ProcessId, &StateSet)> + '_ {
        self.constraints.iter().map(|(process, set)| (*process, set))
    }

    /// Returns the allowed set for `process`, if constrained.
    #[must_use]
    pub fn allowed(&self, process: ProcessId) -> Option<&StateSet> {
        self.constraints.get(&process)
    }

    /// Returns true when the guard constrains nothing.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Membership test: does the guard permit `process` in `state`?
    ///
    /// Unconstrained processes are always permitted.
    #[must_use]
    pub fn permits(&self, process: ProcessId, state: StateId) -> bool {
        self.constraints
            .get(&process)
            .is_none_or(|allowed| allowed.contains(state))
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_trivial() {
            return write!(f, "⊤");
        }
        for (i, (process, allowed)) in self.constraints().enumerate() {
            if i > 0 {
                write!(f, " ∧ ")?;
            }
            write!(f, "{process} ∈ {allowed}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersects_uses_merge_walk_with_early_exit() {
        let a: StateSet = [StateId(0), StateId(2), StateId(4)].into_iter().collect();
        let b: StateSet = [StateId(1), StateId(3), StateId(5)].into_iter().collect();
        let c: StateSet = [StateId(4), StateId(9)].into_iter().collect();
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(!StateSet::new().intersects(&a));
    }

    #[test]
    fn repeated_constraints_intersect() {
        let guard = Guard::new()
            .require(ProcessId(1), [StateId(0), StateId(1)])
            .require(ProcessId(1), [StateId(1), StateId(2)]);
        let allowed = guard.allowed(ProcessId(1)).cloned().unwrap_or_default();
        assert_eq!(allowed.len(), 1);
        assert!(allowed.contains(StateId(1)));
    }

    #[test]
    fn permits_unconstrained_processes() {
        let guard = Guard::new().require(ProcessId(0), [StateId(0)]);
        assert!(guard.permits(ProcessId(5), StateId(3)));
        assert!(guard.permits(ProcessId(0), StateId(0)));
        assert!(!guard.permits(ProcessId(0), StateId(1)));
    }
}
