// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Instrumented resource doubles.
//!
//! [`DriverGate`] stands in for the shared resource and doubles as the
//! downstream race detector: it tracks which handles are open and records
//! a breach whenever the call pattern reaching it is one the protocol's
//! guards are supposed to rule out. A correctly locked harness never
//! breaches it; a harness with an omitted region does, which is how the
//! fault-injection scenarios prove the harness surfaces
//! under-synchronization.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use contend_core::{AdapterError, ResourceAdapter, Session};

/// Gatekeeper adapter for driver/client protocols.
///
/// One session (the driver's) owns the resource lifecycle via
/// `open`/`close`; every other session models a client handle. The checks
/// are deliberately non-atomic read-then-act sequences — the gate is a
/// detector observing call interleavings, not a synchronizer.
#[derive(Debug)]
pub struct DriverGate {
    driver: Session,
    driver_open: AtomicBool,
    handles: Vec<AtomicBool>,
    strict_close: bool,
    breaches: Mutex<Vec<String>>,
    writes: AtomicU64,
    driver_closes: AtomicU64,
}

impl DriverGate {
    /// Creates a gate for `sessions` total sessions where `driver` owns
    /// the lifecycle. Write-path checks only.
    #[must_use]
    pub fn new(driver: Session, sessions: usize) -> Self {
        Self {
            driver,
            driver_open: AtomicBool::new(false),
            handles: (0..sessions).map(|_| AtomicBool::new(false)).collect(),
            strict_close: false,
            breaches: Mutex::new(Vec::new()),
            writes: AtomicU64::new(0),
            driver_closes: AtomicU64::new(0),
        }
    }

    /// Like [`Self::new`], and additionally treats a driver close while
    /// any client handle is open as a breach (scenario-1 property).
    #[must_use]
    pub fn strict(driver: Session, sessions: usize) -> Self {
        Self {
            strict_close: true,
            ..Self::new(driver, sessions)
        }
    }

    fn breach(&self, detail: String) {
        if let Ok(mut breaches) = self.breaches.lock() {
            breaches.push(detail);
        }
    }

    /// Breaches recorded so far.
    #[must_use]
    pub fn breaches(&self) -> Vec<String> {
        self.breaches
            .lock()
            .map(|breaches| breaches.clone())
            .unwrap_or_default()
    }

    /// Total client writes that reached the resource.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Total driver closes (unloads) that reached the resource.
    #[must_use]
    pub fn driver_close_count(&self) -> u64 {
        self.driver_closes.load(Ordering::SeqCst)
    }
}

impl ResourceAdapter for DriverGate {
    fn init(&self) -> Result<(), AdapterError> {
        self.driver_open.store(false, Ordering::SeqCst);
        for handle in &self.handles {
            handle.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn open(&self, session: Session) -> Result<(), AdapterError> {
        if session == self.driver {
            self.driver_open.store(true, Ordering::SeqCst);
            return Ok(());
        }
        if !self.driver_open.load(Ordering::SeqCst) {
            self.breach(format!("open on session {} without a loaded driver", session.0));
        }
        self.handles[session.index()].store(true, Ordering::SeqCst);
        Ok(())
    }

    fn write(&self, session: Session, _bytes: &[u8]) -> Result<(), AdapterError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if !self.driver_open.load(Ordering::SeqCst) {
            self.breach(format!("write on session {} without a loaded driver", session.0));
        }
        if !self.handles[session.index()].load(Ordering::SeqCst) {
            self.breach(format!("write on session {} without an open handle", session.0));
        }
        Ok(())
    }

    fn close(&self, session: Session) -> Result<(), AdapterError> {
        if session == self.driver {
            self.driver_closes.fetch_add(1, Ordering::SeqCst);
            if self.strict_close {
                for (index, handle) in self.handles.iter().enumerate() {
                    if index != self.driver.index() && handle.load(Ordering::SeqCst) {
                        self.breach(format!(
                            "driver close while session {index} holds an open handle"
                        ));
                    }
                }
            }
            self.driver_open.store(false, Ordering::SeqCst);
            return Ok(());
        }
        self.handles[session.index()].store(false, Ordering::SeqCst);
        Ok(())
    }
}
