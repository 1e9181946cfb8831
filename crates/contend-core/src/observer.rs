// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Step observation sinks.
//!
//! The harness emits no logs of its own; observability is a sink trait the
//! caller plugs in, and the default sink is a no-op. Sinks receive the
//! unbounded event stream each runner produces: one [`StepEvent`] per
//! executed transition, reported *while the step's locks are still held*,
//! so a sink sees exactly the regions protecting the side effect.

use crate::ident::{ProcessId, RegionId, StateId, TransitionId};

/// Snapshot of every actor's committed state cell.
///
/// Read with `Acquire` loads at a single point in time; individual cells
/// may move again the moment the snapshot returns, except for cells frozen
/// by regions the snapshotting actor still holds.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct JointSnapshot(pub Vec<StateId>);

impl JointSnapshot {
    /// State of `process` at snapshot time.
    #[must_use]
    pub fn state(&self, process: ProcessId) -> StateId {
        self.0[process.index()]
    }
}

/// One executed transition.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StepEvent {
    /// Acting process.
    pub process: ProcessId,
    /// State the step left.
    pub source: StateId,
    /// State the step committed.
    pub target: StateId,
    /// The transition taken.
    pub transition: TransitionId,
    /// Whether a side effect ran.
    pub effect: bool,
    /// Every region held while the side effect ran: the transition's guard
    /// regions, the source state's residency, and the target state's
    /// residency (entered before the effect so the commit is covered).
    /// Ascending.
    pub held: Vec<RegionId>,
    /// Zero-based step counter of the acting process.
    pub step: u64,
}

/// Observer over the harness event stream.
///
/// Callbacks run on runner threads with locks held; implementations must
/// be cheap and `Sync`, and must never call back into the harness.
pub trait StepObserver: Sync {
    /// Called after each committed step, before its locks are released.
    fn on_step(&self, event: &StepEvent);

    /// Called once when a runner observes a joint state violating a guard
    /// it holds the region for. The run aborts right after.
    fn on_violation(&self, event: &StepEvent, snapshot: &JointSnapshot) {
        let _ = (event, snapshot);
    }
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl StepObserver for NullObserver {
    fn on_step(&self, _event: &StepEvent) {}
}
