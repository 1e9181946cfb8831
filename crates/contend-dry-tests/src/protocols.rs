// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canned protocol models for scenario tests.

use contend_core::{
    AdapterError, Guard, ModelError, ProcessId, Protocol, ResourceAdapter, Session, StateId,
    TransitionDecl, TransitionId,
};

fn open_effect(adapter: &dyn ResourceAdapter, session: Session) -> Result<(), AdapterError> {
    adapter.open(session)
}

fn close_effect(adapter: &dyn ResourceAdapter, session: Session) -> Result<(), AdapterError> {
    adapter.close(session)
}

/// The two-actor scenario model: driver {unloaded, loading, loaded},
/// client {disconnected, connected}; the driver may not unload while the
/// client is connected, the client may only connect while the driver is
/// loaded.
#[derive(Debug)]
pub struct DriverClientPair {
    /// The validated model.
    pub protocol: Protocol,
    /// Driver process (session 0).
    pub driver: ProcessId,
    /// Client process (session 1).
    pub client: ProcessId,
    /// Driver states.
    pub unloaded: StateId,
    /// See [`Self::unloaded`].
    pub loading: StateId,
    /// See [`Self::unloaded`].
    pub loaded: StateId,
    /// Client states.
    pub disconnected: StateId,
    /// See [`Self::disconnected`].
    pub connected: StateId,
    /// The guarded unload transition (close-equivalent on the driver).
    pub unload: TransitionId,
    /// The guarded connect transition.
    pub connect: TransitionId,
}

/// Builds the scenario-1 model. The client is biased toward staying
/// connected so unload contention is exercised constantly.
pub fn driver_client_pair() -> Result<DriverClientPair, ModelError> {
    let mut b = Protocol::builder();

    let driver = b.process("driver")?;
    let unloaded = b.state(driver, "unloaded")?;
    let loading = b.state(driver, "loading")?;
    let loaded = b.state(driver, "loaded")?;

    let client = b.process("client")?;
    let disconnected = b.state(client, "disconnected")?;
    let connected = b.state(client, "connected")?;

    b.declare(TransitionDecl::new(driver, unloaded, unloaded).label("idle"))?;
    b.declare(TransitionDecl::new(driver, unloaded, loading).weight(3).label("load_begin"))?;
    b.declare(
        TransitionDecl::new(driver, loading, loaded)
            .effect(open_effect)
            .label("register"),
    )?;
    b.declare(TransitionDecl::new(driver, loaded, loaded).label("serve"))?;
    let unload = b.declare(
        TransitionDecl::new(driver, loaded, unloaded)
            .guard(Guard::new().require(client, [disconnected]))
            .effect(close_effect)
            .label("unload"),
    )?;

    b.declare(TransitionDecl::new(client, disconnected, disconnected).label("idle"))?;
    let connect = b.declare(
        TransitionDecl::new(client, disconnected, connected)
            .guard(Guard::new().require(driver, [loaded]))
            .effect(open_effect)
            .weight(3)
            .label("connect"),
    )?;
    b.declare(TransitionDecl::new(client, connected, connected).weight(6).label("linger"))?;
    b.declare(
        TransitionDecl::new(client, connected, disconnected)
            .effect(close_effect)
            .label("disconnect"),
    )?;

    Ok(DriverClientPair {
        protocol: b.build()?,
        driver,
        client,
        unloaded,
        loading,
        loaded,
        disconnected,
        connected,
        unload,
        connect,
    })
}
