//! Prepared statements.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use maria_nonblock::{ColumnBuffer, StmtId};

use crate::connection::ConnectionInner;
use crate::machine::{self, RunMachine};
use crate::operation::Operation;
use crate::param::Param;
use crate::row::RowSet;

/// State shared between a [`Statement`] handle and its running operations.
pub(crate) struct StatementInner {
    conn: Rc<RefCell<ConnectionInner>>,
    id: StmtId,
    sql: String,
    param_count: usize,
    column_count: usize,
    buffers: RefCell<Vec<ColumnBuffer>>,
    released: Cell<bool>,
}

impl StatementInner {
    pub(crate) fn new(
        conn: Rc<RefCell<ConnectionInner>>,
        id: StmtId,
        sql: String,
        param_count: usize,
        column_count: usize,
        inline_capacity: usize,
    ) -> Self {
        Self {
            conn,
            id,
            sql,
            param_count,
            column_count,
            buffers: RefCell::new(vec![
                ColumnBuffer::with_capacity(inline_capacity);
                column_count
            ]),
            released: Cell::new(false),
        }
    }

    pub(crate) fn id(&self) -> StmtId {
        self.id
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn param_count(&self) -> usize {
        self.param_count
    }

    pub(crate) fn column_count(&self) -> usize {
        self.column_count
    }

    pub(crate) fn buffers(&self) -> &RefCell<Vec<ColumnBuffer>> {
        &self.buffers
    }

    fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        match self.conn.try_borrow_mut() {
            Ok(mut conn) => conn.release_statement(self.id),
            Err(_) => tracing::warn!(
                stmt = %self.id,
                "connection state in use, statement stays open until the connection closes"
            ),
        }
    }
}

impl Drop for StatementInner {
    fn drop(&mut self) {
        self.release();
    }
}

/// A prepared statement.
///
/// Holds a strong reference to its connection, so the connection stays
/// alive while the statement is in use even if the [`Connection`] handle
/// itself was dropped. Shares the connection's one-operation-at-a-time rule.
///
/// [`Connection`]: crate::Connection
pub struct Statement {
    inner: Rc<StatementInner>,
}

impl Statement {
    pub(crate) fn new(inner: StatementInner) -> Self {
        Self {
            inner: Rc::new(inner),
        }
    }

    /// Execute with positional parameters and buffer all result rows.
    ///
    /// Missing trailing parameters bind NULL. Non-NULL values are sent as
    /// text. Booleans and surplus parameters fail with
    /// [`Error::Argument`](crate::Error::Argument) before any I/O.
    ///
    /// # Panics
    ///
    /// Panics if the execution suspends outside of a `LocalSet`.
    pub fn run(&self, params: &[Param]) -> Operation<RowSet> {
        machine::drive(
            &self.inner.conn,
            RunMachine::new(Rc::clone(&self.inner), params.to_vec()),
        )
    }

    /// Release the native statement and this handle's connection reference.
    ///
    /// If an operation is outstanding on the connection, the native release
    /// happens when it completes.
    pub fn close(self) {
        self.inner.release();
    }

    /// Number of `?` placeholders.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.inner.param_count
    }

    /// Number of result columns; zero for statements without a result set.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.inner.column_count
    }

    /// The statement text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.inner.sql
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("id", &self.inner.id)
            .field("sql", &self.inner.sql)
            .field("params", &self.inner.param_count)
            .field("columns", &self.inner.column_count)
            .finish()
    }
}
