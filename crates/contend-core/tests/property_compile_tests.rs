// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property tests over generated small models: compilation is
//! deterministic, plans respect the global order, and every guard-implied
//! exclusion pair is covered by a shared region.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use contend_core::{
    CompiledProtocol, Guard, ModelError, Protocol, StateId, TransitionDecl,
};
use proptest::prelude::*;

/// Declarative sketch of a random model; the ring backbone keeps every
/// state reachable and non-terminal, extras add weighted/guarded chaos.
#[derive(Debug, Clone)]
struct ModelSketch {
    sizes: Vec<u8>,
    extras: Vec<Extra>,
}

#[derive(Debug, Clone)]
struct Extra {
    process: u8,
    source: u8,
    target: u8,
    weight: u8,
    guard: Option<(u8, u8)>, // (watched offset, allowed mask)
}

fn extra_strategy() -> impl Strategy<Value = Extra> {
    (
        0..=3_u8,
        0..=3_u8,
        0..=3_u8,
        1..=4_u8,
        proptest::option::of((0..=2_u8, 0..=7_u8)),
    )
        .prop_map(|(process, source, target, weight, guard)| Extra {
            process,
            source,
            target,
            weight,
            guard,
        })
}

fn sketch_strategy() -> impl Strategy<Value = ModelSketch> {
    (
        proptest::collection::vec(2..=3_u8, 2..=3),
        proptest::collection::vec(extra_strategy(), 0..=6),
    )
        .prop_map(|(sizes, extras)| ModelSketch { sizes, extras })
}

const PROCESS_NAMES: [&str; 3] = ["p_alpha", "p_beta", "p_gamma"];
const STATE_NAMES: [&str; 3] = ["s0", "s1", "s2"];

fn build(sketch: &ModelSketch) -> Result<Protocol, ModelError> {
    let mut b = Protocol::builder();
    let mut processes = Vec::new();
    let mut states: Vec<Vec<StateId>> = Vec::new();
    for (p_index, &size) in sketch.sizes.iter().enumerate() {
        let process = b.process(PROCESS_NAMES[p_index])?;
        let mut ids = Vec::new();
        for s_index in 0..usize::from(size) {
            ids.push(b.state(process, STATE_NAMES[s_index])?);
        }
        // Ring backbone.
        for s_index in 0..ids.len() {
            b.transition(process, ids[s_index], ids[(s_index + 1) % ids.len()])?;
        }
        processes.push(process);
        states.push(ids);
    }

    for extra in &sketch.extras {
        let p_index = usize::from(extra.process) % processes.len();
        let own = &states[p_index];
        let source = own[usize::from(extra.source) % own.len()];
        let target = own[usize::from(extra.target) % own.len()];
        let mut decl = TransitionDecl::new(processes[p_index], source, target)
            .weight(u32::from(extra.weight));
        if let Some((offset, mask)) = extra.guard {
            let w_index = (p_index + 1 + usize::from(offset) % (processes.len() - 1))
                % processes.len();
            let allowed = states[w_index]
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, &s)| s);
            decl = decl.guard(Guard::new().require(processes[w_index], allowed));
        }
        b.declare(decl)?;
    }
    b.build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn compilation_is_deterministic(sketch in sketch_strategy()) {
        let first = build(&sketch).map(CompiledProtocol::compile);
        let second = build(&sketch).map(CompiledProtocol::compile);
        match (first, second) {
            (Ok(Ok(a)), Ok(Ok(b))) => {
                prop_assert_eq!(a.digest(), b.digest());
                prop_assert_eq!(a.regions(), b.regions());
            }
            (Ok(Err(a)), Ok(Err(b))) => prop_assert_eq!(a, b),
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            _ => prop_assert!(false, "compilation outcome not deterministic"),
        }
    }

    #[test]
    fn plans_follow_the_global_order(sketch in sketch_strategy()) {
        let Ok(Ok(compiled)) = build(&sketch).map(CompiledProtocol::compile) else {
            return Ok(());
        };
        for transition in compiled.protocol().transitions() {
            let plan = compiled.plan(transition.id());
            prop_assert!(plan.acquires().windows(2).all(|w| w[0] < w[1]));
            prop_assert!(plan.releases().windows(2).all(|w| w[0] > w[1]));
        }
    }

    #[test]
    fn every_exclusion_pair_shares_a_region(sketch in sketch_strategy()) {
        let Ok(Ok(compiled)) = build(&sketch).map(CompiledProtocol::compile) else {
            return Ok(());
        };
        let protocol = compiled.protocol();
        for transition in protocol.transitions() {
            let Some(guard) = transition.guard() else { continue };
            for (watched, allowed) in guard.constraints() {
                for index in 0..protocol.process(watched).states().len() {
                    let state = StateId(u16::try_from(index).expect("small index"));
                    if allowed.contains(state) {
                        continue;
                    }
                    let covered = compiled.guard_regions(transition.id()).iter().any(|r| {
                        compiled.residency(watched, state).contains(r)
                    });
                    prop_assert!(covered, "uncovered exclusion pair");
                }
            }
        }
    }

    #[test]
    fn guard_free_sketches_need_no_locks(mut sketch in sketch_strategy()) {
        for extra in &mut sketch.extras {
            extra.guard = None;
        }
        let Ok(Ok(compiled)) = build(&sketch).map(CompiledProtocol::compile) else {
            return Ok(());
        };
        prop_assert_eq!(compiled.regions().len(), 0);
    }
}
