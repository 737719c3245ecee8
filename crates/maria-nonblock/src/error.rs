//! Errors reported by the native client library.

use thiserror::Error;

/// Client-side error codes used by the MariaDB client library.
///
/// Server-side codes (1000-1999) are passed through as received.
pub mod codes {
    /// Can't connect through the local socket.
    pub const CR_CONNECTION_ERROR: u32 = 2002;
    /// Can't connect to the server host.
    pub const CR_CONN_HOST_ERROR: u32 = 2003;
    /// Server has gone away (write on a dead connection).
    pub const CR_SERVER_GONE_ERROR: u32 = 2006;
    /// Out of memory while allocating a handle.
    pub const CR_OUT_OF_MEMORY: u32 = 2008;
    /// Lost connection to the server during a query.
    pub const CR_SERVER_LOST: u32 = 2013;
    /// Commands issued in the wrong order.
    pub const CR_COMMANDS_OUT_OF_SYNC: u32 = 2014;
    /// Malformed packet from the server.
    pub const CR_MALFORMED_PACKET: u32 = 2027;
    /// Statement not prepared.
    pub const CR_NO_PREPARE_STMT: u32 = 2030;
    /// Invalid parameter number for a statement.
    pub const CR_INVALID_PARAMETER_NO: u32 = 2034;
    /// Column index out of range in a column fetch.
    pub const CR_INVALID_BUFFER_USE: u32 = 2035;
    /// No row is current in a column fetch.
    pub const CR_NO_DATA: u32 = 2051;
}

/// An error as reported by `mysql_errno` / `mysql_error` / `mysql_sqlstate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({code})")]
pub struct NativeError {
    /// Numeric error code (client or server).
    pub code: u32,
    /// Human-readable error text.
    pub message: String,
    /// Five-character SQLSTATE, when known.
    pub sqlstate: Option<String>,
}

impl NativeError {
    /// Create an error with a code and message.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sqlstate: None,
        }
    }

    /// Attach a SQLSTATE.
    #[must_use]
    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    /// Lost connection during a query.
    pub fn server_lost() -> Self {
        Self::new(codes::CR_SERVER_LOST, "Lost connection to server during query")
            .with_sqlstate("HY000")
    }

    /// Server has gone away.
    pub fn server_gone() -> Self {
        Self::new(codes::CR_SERVER_GONE_ERROR, "Server has gone away").with_sqlstate("HY000")
    }

    /// Commands out of sync.
    pub fn out_of_sync() -> Self {
        Self::new(
            codes::CR_COMMANDS_OUT_OF_SYNC,
            "Commands out of sync; you can't run this command now",
        )
        .with_sqlstate("HY000")
    }

    /// Whether this error means the connection itself is unusable.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self.code,
            codes::CR_SERVER_GONE_ERROR | codes::CR_SERVER_LOST
        )
    }
}

/// Result type for native library calls.
pub type NativeResult<T> = std::result::Result<T, NativeError>;
