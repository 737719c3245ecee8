//! Connection phase tracking.
//!
//! A connection runs at most one multi-step protocol at a time. The phase
//! names which protocol and which sub-step of it is active, so a readiness
//! event is always dispatched to the right continuation.

use std::fmt;

/// Sub-step of a simple query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStep {
    /// Sending the query text and reading the result header.
    Send,
    /// Reading and buffering the result set.
    Store,
}

/// Sub-step of a prepared statement operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementStep {
    /// Preparing the statement on the server.
    Prepare,
    /// Executing with bound parameters.
    Execute,
    /// Fetching the row at the given zero-based index.
    Fetch {
        /// Index of the row being fetched.
        row: usize,
    },
}

/// What a connection is currently doing. Variants never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No operation in progress.
    #[default]
    Idle,
    /// Connection handshake in progress.
    Connecting,
    /// Simple query in progress.
    Query(QueryStep),
    /// Prepared statement operation in progress.
    Statement(StatementStep),
}

impl Phase {
    /// Check if an operation is in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Short name, used as a tracing field.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Query(QueryStep::Send) => "query.send",
            Self::Query(QueryStep::Store) => "query.store",
            Self::Statement(StatementStep::Prepare) => "statement.prepare",
            Self::Statement(StatementStep::Execute) => "statement.execute",
            Self::Statement(StatementStep::Fetch { .. }) => "statement.fetch",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Statement(StatementStep::Fetch { row }) => write!(f, "statement.fetch[{row}]"),
            other => f.write_str(other.name()),
        }
    }
}
