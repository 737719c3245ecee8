//! Reactor error types.

use std::os::fd::RawFd;

use thiserror::Error;

/// Errors from readiness registration and polling.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// Registering the descriptor with the runtime failed.
    #[error("failed to watch socket {fd}: {source}")]
    Register {
        /// The descriptor.
        fd: RawFd,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Polling readiness failed.
    #[error("socket readiness poll failed: {0}")]
    Poll(#[source] std::io::Error),

    /// The library asked to wait without naming any condition.
    #[error("empty wait condition")]
    EmptyInterest,

    /// A socket wait was requested but the connection has no socket.
    #[error("no socket to watch")]
    NoSocket,

    /// Readiness was polled without an armed registration.
    #[error("watcher is not armed")]
    NotArmed,
}

/// Result type for reactor operations.
pub type Result<T> = std::result::Result<T, ReactorError>;
