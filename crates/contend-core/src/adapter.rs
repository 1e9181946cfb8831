// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared resource adapter boundary.
//!
//! The resource under test lives behind [`ResourceAdapter`]; the harness
//! only ever calls it synchronously from runner threads, serialized exactly
//! where the compiled lock plan demands and nowhere else. Any
//! synchronization the resource needs beyond that is the resource's own
//! responsibility — and a bug if missing, which is the point.

use thiserror::Error;

use crate::ident::Session;

/// Error signalled by a resource operation.
///
/// There is no retry path anywhere in the harness: a failing operation
/// aborts the whole run as [`crate::HarnessError::AdapterFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The operation reported a failure.
    #[error("{op} failed: {detail}")]
    Failed {
        /// Operation name (`"init"`, `"open"`, `"write"`, `"close"`, …).
        op: &'static str,
        /// Adapter-supplied detail.
        detail: String,
    },
}

impl AdapterError {
    /// Convenience constructor for adapter implementations.
    #[must_use]
    pub fn failed(op: &'static str, detail: impl Into<String>) -> Self {
        Self::Failed {
            op,
            detail: detail.into(),
        }
    }
}

/// Operations of the shared resource under test.
///
/// `init` runs exactly once, on the coordinator thread, before the start
/// barrier releases any actor. The session-scoped operations may be called
/// concurrently from different runner threads except where the lock plan
/// serializes them. Implementations must be `Sync`; they are shared by
/// reference across all runner threads.
pub trait ResourceAdapter: Sync {
    /// One-time initialization, before any actor runs a side effect.
    fn init(&self) -> Result<(), AdapterError>;

    /// Opens a handle for `session`.
    fn open(&self, session: Session) -> Result<(), AdapterError>;

    /// Writes `bytes` through `session`'s handle.
    fn write(&self, session: Session, bytes: &[u8]) -> Result<(), AdapterError>;

    /// Closes `session`'s handle.
    fn close(&self, session: Session) -> Result<(), AdapterError>;
}

/// Side-effect hook attached to a transition.
///
/// Plain function pointer (trivially `Send + Sync`), mirroring how rewrite
/// rules carry their executors. The runner invokes the hook with the shared
/// adapter and the acting process's session while holding exactly the
/// regions the compiler assigned to the transition.
pub type EffectFn = fn(&dyn ResourceAdapter, Session) -> Result<(), AdapterError>;

/// Adapter that accepts every operation; the zero-guard fuzzing baseline.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAdapter;

impl ResourceAdapter for NullAdapter {
    fn init(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn open(&self, _session: Session) -> Result<(), AdapterError> {
        Ok(())
    }

    fn write(&self, _session: Session, _bytes: &[u8]) -> Result<(), AdapterError> {
        Ok(())
    }

    fn close(&self, _session: Session) -> Result<(), AdapterError> {
        Ok(())
    }
}
