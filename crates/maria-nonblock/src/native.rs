//! The non-blocking native client interface.
//!
//! [`NativeConnection`] is one `MYSQL*` handle together with the statement
//! handles it owns. Every potentially blocking call is split in a `*_start`
//! and a `*_cont` half; both return a [`Step`]. After a [`Step::Wait`] the
//! caller must not issue any other call on the handle except the matching
//! `*_cont` or [`close`](NativeConnection::close).

use std::os::fd::RawFd;
use std::time::Duration;

use bytes::Bytes;

use crate::bind::{ColumnBuffer, FetchStatus};
use crate::error::{NativeError, NativeResult};
use crate::options::ConnectOptions;
use crate::result::StoredResult;
use crate::wait::{Step, WaitStatus};

/// Handle of a statement owned by a [`NativeConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

impl std::fmt::Display for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stmt#{}", self.0)
    }
}

/// Factory for connection handles (`mysql_init`).
pub trait NativeDriver {
    /// Allocate a fresh, unconnected handle with non-blocking mode enabled.
    fn init(&self) -> NativeResult<Box<dyn NativeConnection>>;
}

/// One native connection handle.
pub trait NativeConnection {
    /// Socket descriptor the library is currently using, once it has one.
    ///
    /// May change during connect (for example when falling back to another
    /// address), so callers re-read it after every step.
    fn socket(&self) -> Option<RawFd>;

    /// Current timeout value (`mysql_get_timeout_value`), for waits that
    /// include [`WaitStatus::TIMEOUT`].
    fn timeout_value(&self) -> Option<Duration>;

    /// Error of the last failed call (`mysql_errno` / `mysql_error`).
    fn last_error(&self) -> Option<NativeError>;

    /// Begin `mysql_real_connect`.
    fn connect_start(&mut self, options: &ConnectOptions) -> Step<NativeResult<()>>;

    /// Continue a connect.
    fn connect_cont(&mut self, ready: WaitStatus) -> Step<NativeResult<()>>;

    /// Begin `mysql_real_query`.
    fn query_start(&mut self, sql: &str) -> Step<NativeResult<()>>;

    /// Continue a query.
    fn query_cont(&mut self, ready: WaitStatus) -> Step<NativeResult<()>>;

    /// Begin `mysql_store_result`.
    ///
    /// Finishes with `None` for statements without a result set, and also
    /// on failure; [`last_error`](Self::last_error) distinguishes the two.
    fn store_result_start(&mut self) -> Step<Option<StoredResult>>;

    /// Continue a store result.
    fn store_result_cont(&mut self, ready: WaitStatus) -> Step<Option<StoredResult>>;

    /// Allocate a statement handle (`mysql_stmt_init`).
    fn stmt_init(&mut self) -> NativeResult<StmtId>;

    /// Begin `mysql_stmt_prepare`.
    fn stmt_prepare_start(&mut self, stmt: StmtId, sql: &str) -> Step<NativeResult<()>>;

    /// Continue a prepare.
    fn stmt_prepare_cont(&mut self, stmt: StmtId, ready: WaitStatus) -> Step<NativeResult<()>>;

    /// Number of `?` placeholders of a prepared statement.
    fn stmt_param_count(&self, stmt: StmtId) -> usize;

    /// Number of result columns of a prepared statement.
    fn stmt_field_count(&self, stmt: StmtId) -> usize;

    /// Bind parameters (`mysql_stmt_bind_param`). `None` binds NULL.
    fn stmt_bind_param(&mut self, stmt: StmtId, params: &[Option<Bytes>]) -> NativeResult<()>;

    /// Begin `mysql_stmt_execute`.
    fn stmt_execute_start(&mut self, stmt: StmtId) -> Step<NativeResult<()>>;

    /// Continue an execute.
    fn stmt_execute_cont(&mut self, stmt: StmtId, ready: WaitStatus) -> Step<NativeResult<()>>;

    /// Begin `mysql_stmt_fetch` into the given column buffers.
    fn stmt_fetch_start(&mut self, stmt: StmtId, columns: &mut [ColumnBuffer])
    -> Step<FetchStatus>;

    /// Continue a fetch.
    fn stmt_fetch_cont(
        &mut self,
        stmt: StmtId,
        columns: &mut [ColumnBuffer],
        ready: WaitStatus,
    ) -> Step<FetchStatus>;

    /// Read a column of the current row from `offset` (`mysql_stmt_fetch_column`).
    ///
    /// Returns the number of bytes written into `out`.
    fn stmt_fetch_column(
        &mut self,
        stmt: StmtId,
        column: usize,
        offset: usize,
        out: &mut [u8],
    ) -> NativeResult<usize>;

    /// Release a statement handle (`mysql_stmt_close`).
    fn stmt_close(&mut self, stmt: StmtId);

    /// Close the connection (`mysql_close`). Safe in any state, including
    /// in the middle of a non-blocking operation.
    fn close(&mut self);
}
