//! Client error types.

use maria_nonblock::{NativeError, codes};
use maria_reactor::ReactorError;
use thiserror::Error;

/// Errors that can occur during client operations.
///
/// Every operation returns its failure to the immediate caller; nothing is
/// escalated past the operation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The connection was closed, or never opened.
    #[error("closed")]
    Closed,

    /// Another operation is outstanding on the same connection.
    #[error("busy")]
    Busy,

    /// The server or the transport reported a failure.
    #[error("{message}")]
    Connection {
        /// Error text.
        message: String,
        /// Numeric error code, when the library provides one.
        code: Option<u32>,
    },

    /// The operation was aborted because the connection was closed while it
    /// was in flight.
    #[error("interrupted")]
    Interrupted,

    /// A supplied parameter was rejected before any I/O was attempted.
    #[error("bad argument #{position} ({message})")]
    Argument {
        /// One-based position of the offending argument.
        position: usize,
        /// What was wrong with it.
        message: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a connection error with a code.
    pub fn connection(message: impl Into<String>, code: u32) -> Self {
        Self::Connection {
            message: message.into(),
            code: Some(code),
        }
    }

    /// The numeric error code, for connection errors that carry one.
    #[must_use]
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Connection { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether the physical connection is gone (server gone away or lost).
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self.code(),
            Some(codes::CR_SERVER_GONE_ERROR | codes::CR_SERVER_LOST)
        )
    }

    /// Whether the operation was rejected without touching the connection.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Busy | Self::Argument { .. } | Self::Config(_)
        )
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        Self::Connection {
            message: err.message,
            code: Some(err.code),
        }
    }
}

impl From<ReactorError> for Error {
    fn from(err: ReactorError) -> Self {
        Self::Connection {
            message: err.to_string(),
            code: None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
