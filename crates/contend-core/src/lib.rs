// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! contend-core: guard-to-lock compiler and multi-threaded protocol
//! stress harness.
//!
//! A [`Protocol`] describes N actors as finite-state machines with
//! weighted transitions and cross-actor guards. [`CompiledProtocol`]
//! turns the guards into the fewest mutual-exclusion regions that enforce
//! them and emits a per-transition [`LockPlan`]. [`Harness`] then runs one
//! OS thread per actor against a caller-supplied [`ResourceAdapter`],
//! serializing side effects exactly where the guards demand and leaving
//! every other interleaving free — so missing synchronization in the
//! resource surfaces as an observable race, hang, or protocol violation.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod adapter;
mod barrier;
mod compile;
/// Demo protocols (driver/clients contention) for docs and tests.
pub mod demo;
mod entropy;
mod guard;
mod harness;
mod ident;
mod observer;
mod plan;
mod protocol;
mod region;
mod runner;

// Re-exports for the stable public API
/// Resource boundary: the operations under test and their error type.
pub use adapter::{AdapterError, EffectFn, NullAdapter, ResourceAdapter};
/// Guard-to-lock compilation results and failures.
pub use compile::{
    CompileReport, CompiledProtocol, GuardDecompositionError, Hazard, PlanDigest,
};
/// Shared racy entropy source (see the module docs for the atomicity policy).
pub use entropy::SharedEntropy;
/// Guard predicates and ordered state sets.
pub use guard::{Guard, StateSet};
/// Harness facade, configuration, and fatal error taxonomy.
pub use harness::{Harness, HarnessConfig, HarnessError, RunReport};
/// Identifier newtypes for model and plan elements.
pub use ident::{ProcessId, RegionId, Session, StateId, TransitionId};
/// Step observation sinks and events.
pub use observer::{JointSnapshot, NullObserver, StepEvent, StepObserver};
/// Per-transition lock schedules.
pub use plan::{LockAction, LockPlan};
/// Protocol model, builder, and validation errors.
pub use protocol::{
    ModelError, ProcessSpec, Protocol, ProtocolBuilder, StateSpec, TransitionDecl, TransitionSpec,
};
/// Compiled lock regions.
pub use region::{RegionSpec, WatcherSlot};
