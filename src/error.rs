//! Error taxonomy for the relay core.
//!
//! Errors fall into the classes the event loop reacts to differently:
//!
//! - connection-fatal errors evict one connection and are never retried,
//! - resource exhaustion rejects an admit or evicts a recipient,
//! - readiness-wait failures end the loop.
//!
//! Transient conditions (`WouldBlock`, `EINTR`) never surface as a
//! [`RelayError`]; they are absorbed where they occur.

use crate::Handle;

use std::io;
use thiserror::Error;

/// Errors produced by the connection pool and the event loop.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No live connection owns this handle.
    ///
    /// Callers that may race an eviction with a readiness report treat
    /// this as a no-op.
    #[error("no live connection for handle {0}")]
    NotFound(Handle),

    /// A live connection already owns this handle.
    #[error("handle {0} is already admitted")]
    DuplicateHandle(Handle),

    /// The handle is beyond what the readiness backend can wait on.
    #[error("handle {handle} exceeds the readiness limit {limit}")]
    HandleOutOfRange { handle: Handle, limit: Handle },

    /// An allocation for a connection or a message could not be satisfied.
    #[error("out of memory while allocating {what}")]
    Exhausted { what: &'static str },

    /// A recipient's outbound backlog would grow past the configured limit.
    #[error("backlog of handle {handle} would reach {queued} bytes (limit {limit})")]
    BacklogExceeded {
        handle: Handle,
        queued: usize,
        limit: usize,
    },

    /// A transport operation failed irrecoverably.
    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The readiness wait itself failed.
    #[error("readiness wait failed: {0}")]
    Wait(#[source] io::Error),

    /// Invalid relay configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        RelayError::Io { op, source }
    }

    /// Returns `true` when the error only concerns a single connection.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::Io { .. }
                | RelayError::HandleOutOfRange { .. }
                | RelayError::BacklogExceeded { .. }
                | RelayError::Exhausted { .. }
        )
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, RelayError>;
