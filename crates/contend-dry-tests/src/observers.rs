// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Recording step/violation sinks.

use std::sync::Mutex;

use contend_core::{JointSnapshot, StepEvent, StepObserver};

/// Observer that records every event for post-run inspection.
///
/// Events are appended while the emitting step's locks are held, so for
/// any two steps serialized by a shared region the log order matches the
/// lock order; per-process subsequences are always in program order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StepEvent>>,
    violations: Mutex<Vec<(StepEvent, JointSnapshot)>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded step events, in log order.
    #[must_use]
    pub fn events(&self) -> Vec<StepEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// All recorded violations.
    #[must_use]
    pub fn violations(&self) -> Vec<(StepEvent, JointSnapshot)> {
        self.violations
            .lock()
            .map(|violations| violations.clone())
            .unwrap_or_default()
    }
}

impl StepObserver for RecordingObserver {
    fn on_step(&self, event: &StepEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }

    fn on_violation(&self, event: &StepEvent, snapshot: &JointSnapshot) {
        if let Ok(mut violations) = self.violations.lock() {
            violations.push((event.clone(), snapshot.clone()));
        }
    }
}
