// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Guard-to-lock compiler.
//!
//! Converts the union of all guard predicates of a [`Protocol`] into a
//! minimal set of [`RegionSpec`]s plus, for every transition, an ordered
//! [`LockPlan`]. The algorithm is *laminar exclusion partitioning*:
//!
//! 1. Every guard constraint `(watcher P, state s, transition t) → Q ∈ A`
//!    is normalized to its excluded form `Q ∈ states(Q) ∖ A` and aggregated
//!    per `(P, Q, excluded)`. Equal exclusions across a watcher's states
//!    share one region (fewest locks); distinct watcher processes never
//!    share one (maximal interleaving). Nested exclusions stay separate:
//!    merging them would block a weakly-guarded transition on states its
//!    own guard allows.
//! 2. For each `(P, Q)` pair the aggregated excluded sets must be laminar —
//!    pairwise disjoint or nested. Partial overlap cannot be partitioned
//!    into a static disjoint-or-equal region family and aborts compilation
//!    with [`GuardDecompositionError::OverlappingExclusions`]. The protocol
//!    specification must be revised; there is nothing to retry.
//! 3. Surviving candidates are ordered by canonical key and numbered; the
//!    region index is the one global acquisition order.
//!
//! Compilation is deterministic: the same model always yields the same
//! regions, plans, and [`PlanDigest`]. The digest is the canonical
//! length-prefixed little-endian encoding of the whole plan hashed with
//! BLAKE3, so isomorphism checks reduce to digest equality.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::guard::StateSet;
use crate::ident::{ProcessId, RegionId, StateId, TransitionId};
use crate::plan::LockPlan;
use crate::protocol::Protocol;
use crate::region::{RegionSpec, WatcherSlot};

/// Compile-time failures; all fatal, none recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardDecompositionError {
    /// A guard allows no state of the watched process at all, so the
    /// guarded transition could never fire.
    #[error("guard on {transition} allows no state of {watched}")]
    EmptyAllowedSet {
        /// The guarded transition.
        transition: TransitionId,
        /// The watched process with an empty allowed set.
        watched: ProcessId,
    },
    /// Two guards of one watcher exclude partially overlapping state sets
    /// of the same watched process; the overlap pattern has no static
    /// disjoint-or-equal partition.
    #[error("overlapping exclusions between {watcher} and {watched} cannot be partitioned")]
    OverlappingExclusions {
        /// The guarding process.
        watcher: ProcessId,
        /// The watched process whose exclusion sets overlap.
        watched: ProcessId,
    },
}

/// A hold-and-wait pair: a transition that acquires regions while its
/// source state already holds residency regions.
///
/// Not an error — but if the protocol's guards form a cross-watching cycle
/// through such transitions, the harness will block indefinitely, which is
/// the documented detection signal for an ill-specified protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hazard {
    /// The acquiring transition.
    pub transition: TransitionId,
    /// Residency regions held across the acquisition.
    pub held: Vec<RegionId>,
    /// Regions the transition acquires.
    pub acquires: Vec<RegionId>,
}

/// Summary of one compilation, for logs and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    /// Number of lock regions emitted.
    pub region_count: usize,
    /// Number of transitions carrying a non-empty plan.
    pub planned_transitions: usize,
    /// Hold-and-wait pairs (see [`Hazard`]).
    pub hazards: Vec<Hazard>,
}

/// BLAKE3 digest of the canonical plan encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanDigest([u8; 32]);

impl PlanDigest {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PlanDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PlanDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlanDigest({})", hex::encode(&self.0[0..8]))
    }
}

/// A protocol plus its compiled lock regions, plans, and residency tables.
///
/// Immutable after compilation; shared read-only by all runners.
pub struct CompiledProtocol {
    protocol: Protocol,
    regions: Vec<RegionSpec>,
    /// Per transition: the lock plan.
    plans: Vec<LockPlan>,
    /// Per transition: the guard regions alone (exact-hold contract for
    /// observers and tests).
    guard_regions: Vec<Vec<RegionId>>,
    /// Per process, per state: residency regions, ascending.
    residency: Vec<Vec<Vec<RegionId>>>,
    hazards: Vec<Hazard>,
    digest: PlanDigest,
}

impl CompiledProtocol {
    /// Compiles `protocol`'s guards into lock regions and plans.
    pub fn compile(protocol: Protocol) -> Result<Self, GuardDecompositionError> {
        let candidates = collect_candidates(&protocol)?;
        check_laminarity(&candidates)?;
        let regions = number_regions(candidates);
        let residency = build_residency(&protocol, &regions);
        let (plans, guard_regions) = build_plans(&protocol, &regions, &residency);
        let hazards = scan_hazards(&protocol, &residency, &plans);
        let digest = digest_plan(&protocol, &regions, &plans);
        Ok(Self {
            protocol,
            regions,
            plans,
            guard_regions,
            residency,
            hazards,
            digest,
        })
    }

    /// The underlying model.
    #[must_use]
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Compiled regions in acquisition order.
    #[must_use]
    pub fn regions(&self) -> &[RegionSpec] {
        &self.regions
    }

    /// Lock plan for `transition`.
    #[must_use]
    pub fn plan(&self, transition: TransitionId) -> &LockPlan {
        &self.plans[transition.index()]
    }

    /// Guard regions assigned to `transition`. The exact-hold contract:
    /// during the side effect these, the source state's residency, and the
    /// target state's residency are held, no more, no fewer.
    #[must_use]
    pub fn guard_regions(&self, transition: TransitionId) -> &[RegionId] {
        &self.guard_regions[transition.index()]
    }

    /// Residency regions of `(process, state)`, ascending.
    #[must_use]
    pub fn residency(&self, process: ProcessId, state: StateId) -> &[RegionId] {
        &self.residency[process.index()][state.index()]
    }

    /// Residency regions of a process's initial state; acquired before the
    /// start barrier.
    #[must_use]
    pub fn initial_residency(&self, process: ProcessId) -> &[RegionId] {
        self.residency(process, self.protocol.process(process).initial())
    }

    /// Canonical digest; equal digests mean isomorphic plans.
    #[must_use]
    pub fn digest(&self) -> PlanDigest {
        self.digest
    }

    /// Compilation summary.
    #[must_use]
    pub fn report(&self) -> CompileReport {
        CompileReport {
            region_count: self.regions.len(),
            planned_transitions: self.plans.iter().filter(|p| !p.is_empty()).count(),
            hazards: self.hazards.clone(),
        }
    }

    /// Fault injection: strips `region` from `transition`'s plan, leaving
    /// everything else intact.
    ///
    /// This deliberately under-synchronizes the harness so downstream race
    /// detectors (instrumented adapters, sanitizers) can be validated
    /// against a known-missing lock. Never use outside of harness
    /// validation.
    #[must_use]
    pub fn without_region_on(mut self, transition: TransitionId, region: RegionId) -> Self {
        self.plans[transition.index()].strip(region);
        self.guard_regions[transition.index()].retain(|&r| r != region);
        self
    }
}

impl fmt::Debug for CompiledProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledProtocol")
            .field("regions", &self.regions.len())
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

/// Candidate key: watcher process, watched process, excluded set.
type CandidateKey = (ProcessId, ProcessId, StateSet);
type Candidates = BTreeMap<CandidateKey, BTreeSet<WatcherSlot>>;

fn collect_candidates(protocol: &Protocol) -> Result<Candidates, GuardDecompositionError> {
    let mut candidates: Candidates = BTreeMap::new();
    for transition in protocol.transitions() {
        let Some(guard) = transition.guard() else {
            continue;
        };
        for (watched, allowed) in guard.constraints() {
            if allowed.is_empty() {
                return Err(GuardDecompositionError::EmptyAllowedSet {
                    transition: transition.id(),
                    watched,
                });
            }
            let universe: StateSet = (0..protocol.process(watched).states().len())
                .map(|i| StateId(u16::try_from(i).unwrap_or(u16::MAX)))
                .collect();
            let excluded = universe.difference(allowed);
            if excluded.is_empty() {
                // The constraint allows every state; nothing to serialize.
                continue;
            }
            candidates
                .entry((transition.process(), watched, excluded))
                .or_default()
                .insert(WatcherSlot {
                    process: transition.process(),
                    state: transition.source(),
                    transition: transition.id(),
                });
        }
    }
    Ok(candidates)
}

fn check_laminarity(candidates: &Candidates) -> Result<(), GuardDecompositionError> {
    let mut per_pair: BTreeMap<(ProcessId, ProcessId), Vec<&StateSet>> = BTreeMap::new();
    for (watcher, watched, excluded) in candidates.keys() {
        per_pair
            .entry((*watcher, *watched))
            .or_default()
            .push(excluded);
    }
    for ((watcher, watched), sets) in per_pair {
        for (i, a) in sets.iter().enumerate() {
            for b in sets.iter().skip(i + 1) {
                let laminar = !a.intersects(b) || a.is_subset(b) || b.is_subset(a);
                if !laminar {
                    return Err(GuardDecompositionError::OverlappingExclusions {
                        watcher,
                        watched,
                    });
                }
            }
        }
    }
    Ok(())
}

fn number_regions(candidates: Candidates) -> Vec<RegionSpec> {
    // Watched-major canonical order: (watched, excluded, watcher, slots).
    let mut keyed: Vec<_> = candidates
        .into_iter()
        .map(|((watcher, watched, excluded), watchers)| {
            ((watched, excluded, watcher), watchers)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed
        .into_iter()
        .enumerate()
        .map(|(index, ((watched, excluded, _watcher), watchers))| {
            RegionSpec::new(
                RegionId(u16::try_from(index).unwrap_or(u16::MAX)),
                watched,
                excluded,
                watchers,
            )
        })
        .collect()
}

fn build_residency(protocol: &Protocol, regions: &[RegionSpec]) -> Vec<Vec<Vec<RegionId>>> {
    protocol
        .processes()
        .map(|(process, spec)| {
            (0..spec.states().len())
                .map(|s| {
                    let state = StateId(u16::try_from(s).unwrap_or(u16::MAX));
                    regions
                        .iter()
                        .filter(|region| region.resident(process, state))
                        .map(RegionSpec::id)
                        .collect()
                })
                .collect()
        })
        .collect()
}

fn build_plans(
    protocol: &Protocol,
    regions: &[RegionSpec],
    residency: &[Vec<Vec<RegionId>>],
) -> (Vec<LockPlan>, Vec<Vec<RegionId>>) {
    // Watcher-slot index over all regions; the only hot-path map here.
    let mut by_transition: FxHashMap<TransitionId, Vec<RegionId>> = FxHashMap::default();
    for region in regions {
        for slot in region.watchers() {
            by_transition
                .entry(slot.transition)
                .or_default()
                .push(region.id());
        }
    }

    let mut plans = Vec::with_capacity(protocol.transition_count());
    let mut guard_regions = Vec::with_capacity(protocol.transition_count());
    for transition in protocol.transitions() {
        let mut guards = by_transition
            .get(&transition.id())
            .cloned()
            .unwrap_or_default();
        guards.sort_unstable();

        let source = &residency[transition.process().index()][transition.source().index()];
        let target = &residency[transition.process().index()][transition.target().index()];
        let enters: Vec<RegionId> = target
            .iter()
            .filter(|r| !source.contains(*r))
            .copied()
            .collect();
        let exits: Vec<RegionId> = source
            .iter()
            .filter(|r| !target.contains(*r))
            .copied()
            .collect();

        let mut acquires = guards.clone();
        acquires.extend(enters);
        let mut releases = guards.clone();
        releases.extend(exits);

        plans.push(LockPlan::new(acquires, releases));
        guard_regions.push(guards);
    }
    (plans, guard_regions)
}

fn scan_hazards(
    protocol: &Protocol,
    residency: &[Vec<Vec<RegionId>>],
    plans: &[LockPlan],
) -> Vec<Hazard> {
    protocol
        .transitions()
        .filter_map(|transition| {
            let held = &residency[transition.process().index()][transition.source().index()];
            let plan = &plans[transition.id().index()];
            if held.is_empty() || plan.acquires().is_empty() {
                return None;
            }
            Some(Hazard {
                transition: transition.id(),
                held: held.clone(),
                acquires: plan.acquires().to_vec(),
            })
        })
        .collect()
}

fn digest_plan(protocol: &Protocol, regions: &[RegionSpec], plans: &[LockPlan]) -> PlanDigest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"contend-plan:v1");
    hasher.update(&u64::try_from(protocol.process_count()).unwrap_or(0).to_le_bytes());
    for (_, spec) in protocol.processes() {
        hasher.update(&u64::try_from(spec.states().len()).unwrap_or(0).to_le_bytes());
        hasher.update(&u64::from(spec.initial().0).to_le_bytes());
    }
    hasher.update(&u64::try_from(regions.len()).unwrap_or(0).to_le_bytes());
    for region in regions {
        hasher.update(&u64::from(region.watched().0).to_le_bytes());
        hasher.update(&u64::try_from(region.excluded().len()).unwrap_or(0).to_le_bytes());
        for state in region.excluded().iter() {
            hasher.update(&u64::from(state.0).to_le_bytes());
        }
        let watchers: Vec<_> = region.watchers().collect();
        hasher.update(&u64::try_from(watchers.len()).unwrap_or(0).to_le_bytes());
        for slot in watchers {
            hasher.update(&u64::from(slot.process.0).to_le_bytes());
            hasher.update(&u64::from(slot.state.0).to_le_bytes());
            hasher.update(&u64::from(slot.transition.0).to_le_bytes());
        }
    }
    hasher.update(&u64::try_from(plans.len()).unwrap_or(0).to_le_bytes());
    for plan in plans {
        hasher.update(&u64::try_from(plan.acquires().len()).unwrap_or(0).to_le_bytes());
        for region in plan.acquires() {
            hasher.update(&u64::from(region.0).to_le_bytes());
        }
        hasher.update(&u64::try_from(plan.releases().len()).unwrap_or(0).to_le_bytes());
        for region in plan.releases() {
            hasher.update(&u64::from(region.0).to_le_bytes());
        }
    }
    PlanDigest(hasher.finalize().into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::guard::Guard;
    use crate::protocol::TransitionDecl;

    /// Driver {unloaded, loading, loaded} / client {disconnected, connected};
    /// unload requires the client disconnected, connect requires the driver
    /// loaded.
    fn driver_client() -> Protocol {
        let mut b = Protocol::builder();
        let driver = b.process("driver").expect("process");
        let unloaded = b.state(driver, "unloaded").expect("state");
        let loading = b.state(driver, "loading").expect("state");
        let loaded = b.state(driver, "loaded").expect("state");
        let client = b.process("client").expect("process");
        let disconnected = b.state(client, "disconnected").expect("state");
        let connected = b.state(client, "connected").expect("state");

        b.transition(driver, unloaded, unloaded).expect("t");
        b.transition(driver, unloaded, loading).expect("t");
        b.transition(driver, loading, loaded).expect("t");
        b.transition(driver, loaded, loaded).expect("t");
        b.declare(
            TransitionDecl::new(driver, loaded, unloaded)
                .guard(Guard::new().require(client, [disconnected]))
                .label("unload"),
        )
        .expect("t");

        b.transition(client, disconnected, disconnected).expect("t");
        b.declare(
            TransitionDecl::new(client, disconnected, connected)
                .guard(Guard::new().require(driver, [loaded]))
                .label("connect"),
        )
        .expect("t");
        b.transition(client, connected, disconnected).expect("t");
        b.build().expect("valid model")
    }

    #[test]
    fn driver_client_compiles_to_two_regions() {
        let compiled = CompiledProtocol::compile(driver_client()).expect("compile");
        assert_eq!(compiled.regions().len(), 2);
        // Region 0 watches the driver (process 0), region 1 the client.
        assert_eq!(compiled.regions()[0].watched(), ProcessId(0));
        assert_eq!(compiled.regions()[1].watched(), ProcessId(1));
        // The driver starts resident: its initial state is excluded by the
        // client's connect guard.
        assert_eq!(compiled.initial_residency(ProcessId(0)), &[RegionId(0)]);
        assert!(compiled.initial_residency(ProcessId(1)).is_empty());
    }

    #[test]
    fn equal_exclusions_share_a_region_across_watcher_states() {
        let mut b = Protocol::builder();
        let p = b.process("p").expect("process");
        let p0 = b.state(p, "p0").expect("state");
        let p1 = b.state(p, "p1").expect("state");
        let q = b.process("q").expect("process");
        let q0 = b.state(q, "q0").expect("state");
        let q1 = b.state(q, "q1").expect("state");
        b.transition(q, q0, q1).expect("t");
        b.transition(q, q1, q0).expect("t");
        // Same guard shape from two different source states of p.
        b.declare(TransitionDecl::new(p, p0, p1).guard(Guard::new().require(q, [q0])))
            .expect("t");
        b.declare(TransitionDecl::new(p, p1, p0).guard(Guard::new().require(q, [q0])))
            .expect("t");
        let compiled = CompiledProtocol::compile(b.build().expect("model")).expect("compile");
        assert_eq!(compiled.regions().len(), 1);
        assert_eq!(compiled.regions()[0].watchers().count(), 2);
    }

    #[test]
    fn partial_overlap_fails_decomposition() {
        let mut b = Protocol::builder();
        let p = b.process("p").expect("process");
        let p0 = b.state(p, "p0").expect("state");
        let q = b.process("q").expect("process");
        let q0 = b.state(q, "q0").expect("state");
        let q1 = b.state(q, "q1").expect("state");
        let q2 = b.state(q, "q2").expect("state");
        b.transition(q, q0, q1).expect("t");
        b.transition(q, q1, q2).expect("t");
        b.transition(q, q2, q0).expect("t");
        // Excluded {q1, q2} vs {q0, q1}: intersecting, neither nested.
        b.declare(TransitionDecl::new(p, p0, p0).guard(Guard::new().require(q, [q0])))
            .expect("t");
        b.declare(TransitionDecl::new(p, p0, p0).guard(Guard::new().require(q, [q2])))
            .expect("t");
        assert!(matches!(
            CompiledProtocol::compile(b.build().expect("model")),
            Err(GuardDecompositionError::OverlappingExclusions { .. })
        ));
    }

    #[test]
    fn empty_allowed_set_fails_decomposition() {
        let mut b = Protocol::builder();
        let p = b.process("p").expect("process");
        let p0 = b.state(p, "p0").expect("state");
        let q = b.process("q").expect("process");
        let q0 = b.state(q, "q0").expect("state");
        b.transition(q, q0, q0).expect("t");
        b.declare(
            TransitionDecl::new(p, p0, p0).guard(Guard::new().require(q, [q0]).require(q, [])),
        )
        .expect("t");
        assert!(matches!(
            CompiledProtocol::compile(b.build().expect("model")),
            Err(GuardDecompositionError::EmptyAllowedSet { .. })
        ));
    }

    #[test]
    fn zero_guards_compile_to_zero_regions() {
        let mut b = Protocol::builder();
        let p = b.process("p").expect("process");
        let p0 = b.state(p, "p0").expect("state");
        let p1 = b.state(p, "p1").expect("state");
        b.transition(p, p0, p1).expect("t");
        b.transition(p, p1, p0).expect("t");
        let compiled = CompiledProtocol::compile(b.build().expect("model")).expect("compile");
        assert!(compiled.regions().is_empty());
        assert!(compiled.plan(TransitionId(0)).is_empty());
        assert_eq!(compiled.report().planned_transitions, 0);
    }

    #[test]
    fn recompiling_yields_the_same_digest() {
        let a = CompiledProtocol::compile(driver_client()).expect("compile");
        let b = CompiledProtocol::compile(driver_client()).expect("compile");
        assert_eq!(a.digest(), b.digest());
        assert_eq!(format!("{}", a.digest()).len(), 64);
    }

    #[test]
    fn unload_plan_acquires_guard_and_reentry_residency() {
        let compiled = CompiledProtocol::compile(driver_client()).expect("compile");
        let unload = compiled
            .protocol()
            .transitions()
            .find(|t| t.label() == "unload")
            .map(crate::protocol::TransitionSpec::id)
            .expect("unload transition");
        let plan = compiled.plan(unload);
        // Guard region (client connected) plus re-entering the excluded
        // {unloaded, loading} residency of the connect guard.
        assert_eq!(plan.acquires(), &[RegionId(0), RegionId(1)]);
        // Only the guard region is released; residency is kept.
        assert_eq!(plan.releases(), &[RegionId(1)]);
        assert_eq!(compiled.guard_regions(unload), &[RegionId(1)]);
    }
}
