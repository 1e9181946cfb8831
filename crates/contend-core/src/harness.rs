// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Harness facade: one compiled protocol, N runner threads, one resource.
//!
//! [`Harness::run`] builds the run's shared state (region mutexes, atomic
//! state cells, stop latch), initializes the resource on the coordinator
//! thread, releases every runner through the start barrier, and joins. The
//! first fatal error — protocol violation, adapter failure, poisoned lock,
//! runner panic — wins and is returned; there are no retries and nothing
//! is masked.

use std::fmt;

use thiserror::Error;

use crate::adapter::{AdapterError, ResourceAdapter};
use crate::barrier::StartBarrier;
use crate::compile::CompiledProtocol;
use crate::entropy::SharedEntropy;
use crate::ident::{ProcessId, TransitionId};
use crate::observer::{JointSnapshot, NullObserver, StepObserver};
use crate::runner::{run_actor, Runtime};

static NULL_OBSERVER: NullObserver = NullObserver;

/// Fatal runtime failures. Any of these aborts the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// An actor observed a joint state violating a guard it held the
    /// region for: a compiler defect or a bypassed plan, never noise.
    #[error("protocol violation: {process} at {transition} saw {watched} outside its guard")]
    ProtocolViolation {
        /// The asserting actor.
        process: ProcessId,
        /// The guarded transition being executed.
        transition: TransitionId,
        /// The watched process found outside its allowed set.
        watched: ProcessId,
        /// Full joint-state snapshot at detection time.
        snapshot: JointSnapshot,
    },
    /// A side effect reported an error.
    #[error("adapter failure in {process}")]
    AdapterFailure {
        /// The acting process.
        process: ProcessId,
        /// The adapter's error.
        #[source]
        source: AdapterError,
    },
    /// Resource initialization failed before the barrier released.
    #[error("resource init failed")]
    InitFailure(#[source] AdapterError),
    /// A runner thread panicked (typically inside a side effect).
    #[error("runner thread for {0} panicked")]
    RunnerPanic(ProcessId),
    /// Internal invariant violated (harness state corruption).
    #[error("internal invariant violated: {0}")]
    Corrupted(&'static str),
}

/// Run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Seed for the shared entropy cell.
    pub seed: u64,
    /// Step bound per actor; the first actor to reach it stops the run.
    pub steps: u64,
    /// Assert guards against watched cells under held regions. Disable
    /// only to validate downstream race detectors against an injected
    /// fault (see `CompiledProtocol::without_region_on`).
    pub assert_guards: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_c01d,
            steps: 10_000,
            assert_guards: true,
        }
    }
}

/// Outcome of a completed (non-fatal) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Committed steps per actor, indexed by process.
    pub steps: Vec<u64>,
}

impl RunReport {
    /// Total committed steps across all actors.
    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.steps.iter().sum()
    }
}

/// The stress harness: compiled plan + adapter + configuration.
pub struct Harness<'c, A> {
    compiled: &'c CompiledProtocol,
    adapter: A,
    config: HarnessConfig,
    observer: Option<&'c dyn StepObserver>,
}

impl<'c, A: ResourceAdapter> Harness<'c, A> {
    /// Creates a harness over `compiled` driving `adapter`.
    #[must_use]
    pub fn new(compiled: &'c CompiledProtocol, adapter: A) -> Self {
        Self {
            compiled,
            adapter,
            config: HarnessConfig::default(),
            observer: None,
        }
    }

    /// Replaces the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a step observer.
    #[must_use]
    pub fn with_observer(mut self, observer: &'c dyn StepObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Borrow of the driven adapter (for post-run inspection).
    #[must_use]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Executes one full run: fresh cells and locks, resource `init`,
    /// barrier release, N runner threads, join. Restarting means calling
    /// this again — every run re-initializes from scratch.
    pub fn run(&self) -> Result<RunReport, HarnessError> {
        let runtime = Runtime::new(self.compiled);
        let actor_count = self.compiled.protocol().process_count();
        let barrier = StartBarrier::new(actor_count);
        let entropy = SharedEntropy::new(self.config.seed);
        let observer = self.observer.unwrap_or(&NULL_OBSERVER);
        let adapter: &dyn ResourceAdapter = &self.adapter;
        let mut steps = vec![0_u64; actor_count];

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..actor_count)
                .map(|index| {
                    let process = ProcessId(u16::try_from(index).unwrap_or(u16::MAX));
                    let runtime = &runtime;
                    let barrier = &barrier;
                    let entropy = &entropy;
                    let config = &self.config;
                    scope.spawn(move || {
                        run_actor(runtime, process, adapter, entropy, observer, barrier, config)
                    })
                })
                .collect();

            // Coordinator: the resource comes up exactly once, before the
            // barrier releases anyone. On failure the barrier is still
            // joined so no runner is left parked.
            if let Err(source) = adapter.init() {
                runtime.record_fatal(HarnessError::InitFailure(source));
            }
            barrier.wait();

            for (index, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(count)) => steps[index] = count,
                    // The runner already recorded its fatal error.
                    Ok(Err(_)) => {}
                    Err(_) => runtime.record_fatal(HarnessError::RunnerPanic(ProcessId(
                        u16::try_from(index).unwrap_or(u16::MAX),
                    ))),
                }
            }
        });

        match runtime.fatal() {
            Some(error) => Err(error.clone()),
            None => Ok(RunReport { steps }),
        }
    }
}

impl<A> fmt::Debug for Harness<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::adapter::NullAdapter;
    use crate::protocol::Protocol;

    #[test]
    fn unguarded_model_runs_to_the_step_bound() {
        let mut b = Protocol::builder();
        let p = b.process("p").expect("process");
        let a = b.state(p, "a").expect("state");
        let z = b.state(p, "z").expect("state");
        b.transition(p, a, z).expect("t");
        b.transition(p, z, a).expect("t");
        let compiled = CompiledProtocol::compile(b.build().expect("model")).expect("compile");
        let harness = Harness::new(&compiled, NullAdapter).with_config(HarnessConfig {
            seed: 7,
            steps: 100,
            assert_guards: true,
        });
        let report = harness.run().expect("clean run");
        assert_eq!(report.steps, vec![100]);
    }
}
