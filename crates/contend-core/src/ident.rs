// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier types for processes, states, transitions, and lock regions.
//!
//! All identifiers are dense indices assigned by the [`crate::protocol`]
//! builder in declaration order. The model is closed at build time, so
//! table lookups by index replace hashing on every hot path; ids are only
//! meaningful relative to the [`crate::Protocol`] that issued them.

use std::fmt;

/// Identifier for an actor (one finite-state machine, one OS thread).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessId(pub u16);

impl ProcessId {
    /// Returns the id as a table index.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Identifier for a state, local to its owning process.
///
/// Two processes may both have a `StateId(0)`; a bare `StateId` is only
/// meaningful next to a [`ProcessId`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateId(pub u16);

impl StateId {
    /// Returns the id as a table index.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Identifier for a transition, global across the whole model.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransitionId(pub u32);

impl TransitionId {
    /// Returns the id as a table index.
    #[must_use]
    pub fn index(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Identifier for a compiled lock region.
///
/// Region ids double as the global acquisition order: every multi-region
/// acquisition proceeds in ascending `RegionId`, which is what rules out
/// deadlock cycles between batches (see [`crate::compile`]).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionId(pub u16);

impl RegionId {
    /// Returns the id as a table index.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Per-actor handle slot passed to every resource adapter call.
///
/// The harness assigns each actor the session matching its process index;
/// adapters key per-actor bookkeeping (open handles, buffers) off it.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Session(pub u16);

impl Session {
    /// Returns the session as a table index.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}
