// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scenario: one driver, three clients, lock regions assigned per
//! (driver-transition, client-state) pair. Across 100k randomized steps at
//! most one client may occupy `active` while the driver is mid-unload —
//! with the compiled residency discipline the count is in fact zero, and
//! no write may ever reach an unloaded resource.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use contend_core::demo::tty::build_tty_demo;
use contend_core::{CompiledProtocol, Harness, HarnessConfig, Session, StateId};
use contend_dry_tests::{DriverGate, RecordingObserver};

#[test]
fn at_most_one_client_is_active_during_unload_across_100k_steps() {
    let demo = build_tty_demo(3).expect("demo model");
    let compiled = CompiledProtocol::compile(demo.protocol).expect("compile");
    // One region per (unload, client) pair plus one per client's
    // connect/engage family.
    assert_eq!(compiled.regions().len(), 6);
    assert!(compiled.report().hazards.is_empty(), "model must be cycle-free");

    let observer = RecordingObserver::new();
    let gate = DriverGate::new(Session(0), 4);
    let report = Harness::new(&compiled, gate)
        .with_config(HarnessConfig {
            seed: 0x100_000,
            steps: 100_000,
            assert_guards: true,
        })
        .with_observer(&observer)
        .run()
        .expect("clean run");
    assert_eq!(report.steps.iter().max(), Some(&100_000));
    assert!(observer.violations().is_empty());

    let mut cells: Vec<StateId> = compiled
        .protocol()
        .processes()
        .map(|(_, spec)| spec.initial())
        .collect();
    let mut unloads = 0_u64;
    for event in observer.events() {
        if event.process == demo.driver && event.transition == demo.unload {
            unloads += 1;
            let active_clients = demo
                .clients
                .iter()
                .filter(|client| cells[client.index()] == demo.active)
                .count();
            assert!(
                active_clients <= 1,
                "{active_clients} clients active during unload"
            );
        }
        cells[event.process.index()] = event.target;
    }
    assert!(unloads > 0, "run never exercised the unload path");
}

#[test]
fn no_write_reaches_an_unloaded_resource() {
    let demo = build_tty_demo(3).expect("demo model");
    let compiled = CompiledProtocol::compile(demo.protocol).expect("compile");
    let gate = DriverGate::new(Session(0), 4);
    let harness = Harness::new(&compiled, gate).with_config(HarnessConfig {
        seed: 0x100_001,
        steps: 100_000,
        assert_guards: true,
    });
    harness.run().expect("clean run");

    let gate = harness.adapter();
    assert!(
        gate.breaches().is_empty(),
        "instrumented resource saw a barred interleaving: {:?}",
        gate.breaches()
    );
    assert!(gate.write_count() > 0, "run never exercised the write path");
}
