// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scenario: deliberately omit one lock region from a transition's plan
//! and confirm the harness surfaces the under-synchronization — first
//! through its own guard assertion, then (assertions off) through the
//! downstream detector observing the resource adapter.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use contend_core::{CompiledProtocol, Harness, HarnessConfig, HarnessError, Session};
use contend_dry_tests::{protocols::driver_client_pair, DriverGate};

/// Region index 1 watches the client's `connected` state — the region the
/// unload transition must hold. Stripping it un-serializes unload against
/// the client.
fn sabotaged() -> (CompiledProtocol, contend_core::TransitionId) {
    let pair = driver_client_pair().expect("model");
    let unload = pair.unload;
    let compiled = CompiledProtocol::compile(pair.protocol).expect("compile");
    let client_region = compiled.guard_regions(unload)[0];
    (compiled.without_region_on(unload, client_region), unload)
}

#[test]
fn guard_assertion_catches_the_missing_region() {
    let (compiled, unload) = sabotaged();
    assert!(compiled.guard_regions(unload).is_empty());

    let gate = DriverGate::strict(Session(0), 2);
    let result = Harness::new(&compiled, gate)
        .with_config(HarnessConfig {
            seed: 0xFA_017,
            steps: 200_000,
            assert_guards: true,
        })
        .run();

    let error = result.expect_err("stripped region must surface as a violation");
    assert!(
        matches!(
            &error,
            HarnessError::ProtocolViolation { transition, .. } if *transition == unload
        ),
        "unexpected failure: {error:?}"
    );
    if let HarnessError::ProtocolViolation { snapshot, .. } = error {
        // The snapshot covers the full joint state vector.
        assert_eq!(snapshot.0.len(), 2);
    }
}

#[test]
fn downstream_detector_reports_a_true_positive() {
    let (compiled, _unload) = sabotaged();

    let gate = DriverGate::strict(Session(0), 2);
    let harness = Harness::new(&compiled, gate).with_config(HarnessConfig {
        seed: 0xFA_018,
        steps: 200_000,
        // Self-checks off: only the instrumented resource is watching.
        assert_guards: false,
    });
    harness.run().expect("run completes; the detector, not the harness, flags the race");

    let gate = harness.adapter();
    assert!(
        !gate.breaches().is_empty(),
        "stripped region produced no observable breach in 200k steps"
    );
}
