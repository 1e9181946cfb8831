// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Exact-hold discipline: during every committed step the held regions are
//! precisely the compiler's assignment for that transition — its guard
//! regions, the source state's residency, and the target state's residency
//! (entered before the side effect so the cell commit is covered). No
//! extra regions, none missing.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;

use contend_core::{CompiledProtocol, Harness, HarnessConfig, RegionId};
use contend_dry_tests::{protocols::driver_client_pair, DriverGate, RecordingObserver};

#[test]
fn held_regions_match_the_compiled_assignment_exactly() {
    let pair = driver_client_pair().expect("model");
    let unload = pair.unload;
    let compiled = CompiledProtocol::compile(pair.protocol).expect("compile");
    let observer = RecordingObserver::new();
    let gate = DriverGate::strict(contend_core::Session(0), 2);

    Harness::new(&compiled, gate)
        .with_config(HarnessConfig {
            seed: 23,
            steps: 5_000,
            assert_guards: true,
        })
        .with_observer(&observer)
        .run()
        .expect("clean run");

    let events = observer.events();
    assert!(!events.is_empty());
    let mut saw_guarded_effect = false;
    for event in &events {
        let assigned: BTreeSet<RegionId> = compiled
            .guard_regions(event.transition)
            .iter()
            .chain(compiled.residency(event.process, event.source))
            .chain(compiled.residency(event.process, event.target))
            .copied()
            .collect();
        let held: BTreeSet<RegionId> = event.held.iter().copied().collect();
        assert_eq!(
            held, assigned,
            "step {} held {held:?}, compiler assigned {assigned:?}",
            event.transition
        );
        if event.transition == unload {
            saw_guarded_effect = true;
            assert!(
                !compiled.guard_regions(event.transition).is_empty(),
                "unload must carry a guard region"
            );
        }
    }
    assert!(saw_guarded_effect, "run never exercised the unload path");
}
