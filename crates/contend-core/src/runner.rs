// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-actor step loop.
//!
//! Each runner owns one process of the model and executes the compiled
//! plan: draw, select by cumulative weight, acquire the plan's regions in
//! ascending order, assert the guard against the watched state cells,
//! invoke the side effect, commit the cell with a `Release` store, release
//! the plan's regions in descending order. Residency guards live in a
//! region-indexed table and stay held across iterations until a plan
//! releases them.
//!
//! Shutdown ordering matters: whoever stops first — step bound, violation,
//! adapter failure — trips the global stop latch *before* its residency
//! guards drop, and every acquisition site re-checks the latch after
//! blocking. A stopped actor's cell may be stale, but no guard is ever
//! asserted against it.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::adapter::ResourceAdapter;
use crate::barrier::StartBarrier;
use crate::compile::CompiledProtocol;
use crate::entropy::SharedEntropy;
use crate::harness::{HarnessConfig, HarnessError};
use crate::ident::{ProcessId, RegionId, Session, StateId, TransitionId};
use crate::observer::{JointSnapshot, StepEvent, StepObserver};
use crate::protocol::StateSpec;

/// Shared runtime state of one harness execution.
///
/// Built once per run, before any thread starts; the mutable parts are the
/// region mutexes, the per-actor atomic state cells, the stop latch, and
/// the first-fatal-error slot.
pub(crate) struct Runtime<'c> {
    pub(crate) compiled: &'c CompiledProtocol,
    regions: Vec<Mutex<()>>,
    cells: Vec<AtomicU16>,
    stop: AtomicBool,
    fatal: OnceLock<HarnessError>,
}

impl<'c> Runtime<'c> {
    pub(crate) fn new(compiled: &'c CompiledProtocol) -> Self {
        let regions = compiled.regions().iter().map(|_| Mutex::new(())).collect();
        let cells = compiled
            .protocol()
            .processes()
            .map(|(_, spec)| AtomicU16::new(spec.initial().0))
            .collect();
        Self {
            compiled,
            regions,
            cells,
            stop: AtomicBool::new(false),
            fatal: OnceLock::new(),
        }
    }

    pub(crate) fn region_count(&self) -> usize {
        self.regions.len()
    }

    fn lock(&self, region: RegionId) -> Result<MutexGuard<'_, ()>, HarnessError> {
        self.regions[region.index()]
            .lock()
            .map_err(|_| HarnessError::Corrupted("region mutex poisoned"))
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn trigger_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Records the run's fatal error (first writer wins) and stops everyone.
    pub(crate) fn record_fatal(&self, error: HarnessError) {
        let _ = self.fatal.set(error);
        self.trigger_stop();
    }

    pub(crate) fn fatal(&self) -> Option<&HarnessError> {
        self.fatal.get()
    }

    fn cell_state(&self, process: ProcessId) -> StateId {
        StateId(self.cells[process.index()].load(Ordering::Acquire))
    }

    fn commit(&self, process: ProcessId, state: StateId) {
        self.cells[process.index()].store(state.0, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> JointSnapshot {
        JointSnapshot(
            (0..self.cells.len())
                .map(|i| self.cell_state(ProcessId(u16::try_from(i).unwrap_or(u16::MAX))))
                .collect(),
        )
    }
}

/// Region-indexed table of held guards; residency survives across steps.
struct HeldRegions<'rt> {
    guards: Vec<Option<MutexGuard<'rt, ()>>>,
}

impl<'rt> HeldRegions<'rt> {
    fn new(count: usize) -> Self {
        Self {
            guards: (0..count).map(|_| None).collect(),
        }
    }

    fn acquire(&mut self, rt: &'rt Runtime<'_>, region: RegionId) -> Result<(), HarnessError> {
        if self.guards[region.index()].is_none() {
            self.guards[region.index()] = Some(rt.lock(region)?);
        }
        Ok(())
    }

    fn release(&mut self, region: RegionId) {
        self.guards[region.index()] = None;
    }

    /// Ascending list of held region ids.
    fn ids(&self) -> Vec<RegionId> {
        self.guards
            .iter()
            .enumerate()
            .filter_map(|(i, guard)| {
                guard
                    .as_ref()
                    .map(|_| RegionId(u16::try_from(i).unwrap_or(u16::MAX)))
            })
            .collect()
    }
}

/// Cumulative-weight selection over the state's outgoing transitions.
///
/// `draw` is already reduced modulo the state's weight sum; the walk finds
/// the transition whose weight interval contains it.
fn select(
    compiled: &CompiledProtocol,
    spec: &StateSpec,
    draw: u64,
) -> TransitionId {
    let mut remaining = draw;
    let outgoing = spec.outgoing();
    for &transition in outgoing {
        let weight = u64::from(compiled.protocol().transition(transition).weight());
        if remaining < weight {
            return transition;
        }
        remaining -= weight;
    }
    // draw < weight_sum makes this unreachable; the last arm keeps the
    // walk total without panicking.
    outgoing[outgoing.len() - 1]
}

/// Executes one actor until the step bound, the stop latch, or a fatal
/// error. Returns the number of committed steps.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_actor<'rt>(
    rt: &'rt Runtime<'_>,
    process: ProcessId,
    adapter: &dyn ResourceAdapter,
    entropy: &SharedEntropy,
    observer: &dyn StepObserver,
    barrier: &StartBarrier,
    config: &HarnessConfig,
) -> Result<u64, HarnessError> {
    let compiled = rt.compiled;
    let protocol = compiled.protocol();
    let session = Session(process.0);
    let mut held = HeldRegions::new(rt.region_count());

    // Initial lock position, then the rendezvous. The barrier is joined on
    // the error path too — the coordinator must never be left waiting.
    let initial = compiled
        .initial_residency(process)
        .iter()
        .try_for_each(|&region| held.acquire(rt, region));
    barrier.wait();
    if let Err(error) = initial {
        rt.record_fatal(error.clone());
        return Err(error);
    }

    let mut state = protocol.process(process).initial();
    let mut steps: u64 = 0;

    while steps < config.steps && !rt.stopped() {
        let spec = &protocol.process(process).states()[state.index()];
        let draw = entropy.draw() % u64::from(spec.weight_sum());
        let transition = select(compiled, spec, draw);
        let t = protocol.transition(transition);
        let plan = compiled.plan(transition);

        for &region in plan.acquires() {
            if let Err(error) = held.acquire(rt, region) {
                rt.record_fatal(error.clone());
                return Err(error);
            }
        }
        // A blocked acquisition may have outlived the run; never assert
        // against cells a stopped actor left behind.
        if rt.stopped() {
            break;
        }

        if config.assert_guards {
            if let Some(guard) = t.guard() {
                for (watched, allowed) in guard.constraints() {
                    let current = rt.cell_state(watched);
                    if !allowed.contains(current) {
                        let snapshot = rt.snapshot();
                        let event = StepEvent {
                            process,
                            source: state,
                            target: t.target(),
                            transition,
                            effect: false,
                            held: held.ids(),
                            step: steps,
                        };
                        observer.on_violation(&event, &snapshot);
                        let error = HarnessError::ProtocolViolation {
                            process,
                            transition,
                            watched,
                            snapshot,
                        };
                        rt.record_fatal(error.clone());
                        return Err(error);
                    }
                }
            }
        }

        if let Some(effect) = t.effect() {
            if let Err(source) = effect(adapter, session) {
                let error = HarnessError::AdapterFailure { process, source };
                rt.record_fatal(error.clone());
                return Err(error);
            }
        }

        rt.commit(process, t.target());
        let event = StepEvent {
            process,
            source: state,
            target: t.target(),
            transition,
            effect: t.effect().is_some(),
            held: held.ids(),
            step: steps,
        };
        observer.on_step(&event);
        state = t.target();

        for &region in plan.releases() {
            held.release(region);
        }
        steps += 1;
    }

    // Stop the world before residency drops; see the module docs.
    rt.trigger_stop();
    Ok(steps)
}
