// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Demo protocol: a tty-style driver and N clients contending for it.
//!
//! The classic shape the harness was built for. One driver loads and
//! unloads the resource; clients connect, use it, and disconnect. Two
//! guard families couple the machines:
//!
//! - a client may connect or engage only while the driver is `loaded`;
//! - the driver may unload only while no client is `active`.
//!
//! The compiler turns the first family into one region per client (both
//! watcher states share a region — same exclusion), and the second into
//! one region per (unload, client) pair, which is exactly the lock shape
//! the equivalent hand-written harnesses carry.

use crate::adapter::{AdapterError, ResourceAdapter};
use crate::ident::{ProcessId, Session, StateId, TransitionId};
use crate::protocol::{ModelError, Protocol, TransitionDecl};
use crate::Guard;

/// Upper bound on demo clients (mnemonics are static).
pub const MAX_CLIENTS: usize = 8;

const CLIENT_NAMES: [&str; MAX_CLIENTS] = [
    "tty_client1",
    "tty_client2",
    "tty_client3",
    "tty_client4",
    "tty_client5",
    "tty_client6",
    "tty_client7",
    "tty_client8",
];

fn open_effect(adapter: &dyn ResourceAdapter, session: Session) -> Result<(), AdapterError> {
    adapter.open(session)
}

fn write_effect(adapter: &dyn ResourceAdapter, session: Session) -> Result<(), AdapterError> {
    adapter.write(session, b"tty demo payload")
}

fn close_effect(adapter: &dyn ResourceAdapter, session: Session) -> Result<(), AdapterError> {
    adapter.close(session)
}

/// The built demo model plus the ids tests care about.
#[derive(Debug)]
pub struct TtyDemo {
    /// The validated model.
    pub protocol: Protocol,
    /// Driver process.
    pub driver: ProcessId,
    /// Client processes, in declaration order.
    pub clients: Vec<ProcessId>,
    /// Driver state: not loaded.
    pub unloaded: StateId,
    /// Driver state: mid-load.
    pub loading: StateId,
    /// Driver state: serving clients.
    pub loaded: StateId,
    /// Client state: no handle.
    pub disconnected: StateId,
    /// Client state: handle held, idle.
    pub connected: StateId,
    /// Client state: handle held, writing.
    pub active: StateId,
    /// The guarded unload transition (the close-equivalent).
    pub unload: TransitionId,
    /// Each client's guarded connect transition.
    pub connects: Vec<TransitionId>,
}

/// Builds the driver/clients demo protocol.
///
/// `client_count` is clamped to `1..=MAX_CLIENTS`.
pub fn build_tty_demo(client_count: usize) -> Result<TtyDemo, ModelError> {
    let client_count = client_count.clamp(1, MAX_CLIENTS);
    let mut b = Protocol::builder();

    let driver = b.process("tty_driver")?;
    let unloaded = b.state(driver, "unloaded")?;
    let loading = b.state(driver, "loading")?;
    let loaded = b.state(driver, "loaded")?;

    let mut clients = Vec::with_capacity(client_count);
    let mut disconnected = StateId(0);
    let mut connected = StateId(0);
    let mut active = StateId(0);
    for name in CLIENT_NAMES.iter().take(client_count) {
        let client = b.process(name)?;
        disconnected = b.state(client, "disconnected")?;
        connected = b.state(client, "connected")?;
        active = b.state(client, "active")?;
        clients.push(client);
    }

    // Driver machine. Loading is split in two so the guard on connect
    // watches a genuinely multi-state exclusion.
    b.declare(TransitionDecl::new(driver, unloaded, unloaded).weight(2).label("idle"))?;
    b.declare(TransitionDecl::new(driver, unloaded, loading).label("load_begin"))?;
    b.declare(
        TransitionDecl::new(driver, loading, loaded)
            .effect(open_effect)
            .label("register"),
    )?;
    b.declare(TransitionDecl::new(driver, loaded, loaded).weight(2).label("serve"))?;
    let mut unload_guard = Guard::new();
    for &client in &clients {
        unload_guard = unload_guard.require(client, [disconnected, connected]);
    }
    let unload = b.declare(
        TransitionDecl::new(driver, loaded, unloaded)
            .guard(unload_guard)
            .effect(close_effect)
            .label("unload"),
    )?;

    // Client machines.
    let mut connects = Vec::with_capacity(client_count);
    for &client in &clients {
        b.declare(TransitionDecl::new(client, disconnected, disconnected).weight(2).label("idle"))?;
        let connect = b.declare(
            TransitionDecl::new(client, disconnected, connected)
                .guard(Guard::new().require(driver, [loaded]))
                .effect(open_effect)
                .label("connect"),
        )?;
        connects.push(connect);
        b.declare(
            TransitionDecl::new(client, connected, active)
                .guard(Guard::new().require(driver, [loaded]))
                .label("engage"),
        )?;
        b.declare(
            TransitionDecl::new(client, active, active)
                .weight(2)
                .effect(write_effect)
                .label("use"),
        )?;
        b.declare(TransitionDecl::new(client, active, connected).label("release"))?;
        b.declare(
            TransitionDecl::new(client, connected, disconnected)
                .effect(close_effect)
                .label("disconnect"),
        )?;
    }

    Ok(TtyDemo {
        protocol: b.build()?,
        driver,
        clients,
        unloaded,
        loading,
        loaded,
        disconnected,
        connected,
        active,
        unload,
        connects,
    })
}
