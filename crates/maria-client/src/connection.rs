//! Connection state and the public connection handle.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

use maria_nonblock::{NativeConnection, NativeDriver, StmtId, WaitStatus};
use maria_reactor::{Deadline, Watcher};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::instrumentation;
use crate::machine::{self, ConnectMachine, PrepareMachine, QueryMachine};
use crate::operation::Operation;
use crate::row::RowSet;
use crate::state::Phase;
use crate::statement::Statement;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// The caller waiting on an outstanding operation.
#[derive(Debug)]
struct PendingOp {
    id: u64,
    name: &'static str,
    waker: Option<Waker>,
}

/// Shared state of one physical connection.
///
/// Owned through `Rc<RefCell<_>>` by the [`Connection`] handle, every
/// [`Statement`] prepared on it, and any driver task running an operation.
/// The native handle is released when the last owner goes away, or earlier
/// by an explicit [`Connection::close`].
pub(crate) struct ConnectionInner {
    id: u64,
    native: Option<Box<dyn NativeConnection>>,
    phase: Phase,
    pending: Option<PendingOp>,
    watcher: Watcher,
    deferred_closes: Vec<StmtId>,
    next_op: u64,
    inline_capacity: usize,
}

impl ConnectionInner {
    pub(crate) fn new(native: Box<dyn NativeConnection>, inline_capacity: usize) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            native: Some(native),
            phase: Phase::Idle,
            pending: None,
            watcher: Watcher::new(),
            deferred_closes: Vec::new(),
            next_op: 0,
            inline_capacity,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn inline_capacity(&self) -> usize {
        self.inline_capacity
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn native_mut(&mut self) -> Result<&mut (dyn NativeConnection + 'static)> {
        self.native.as_deref_mut().ok_or(Error::Closed)
    }

    /// Reject the operation if the connection is closed or busy.
    pub(crate) fn gate(&self) -> Result<()> {
        if self.native.is_none() {
            return Err(Error::Closed);
        }
        if self.pending.is_some() {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Claim the outstanding-operation slot. Call only after [`gate`](Self::gate).
    pub(crate) fn begin(&mut self, name: &'static str) -> u64 {
        self.next_op += 1;
        let id = self.next_op;
        self.pending = Some(PendingOp {
            id,
            name,
            waker: None,
        });
        tracing::debug!(connection_id = self.id, operation = name, "operation started");
        id
    }

    /// Whether `op` still owns the slot (it was not interrupted).
    pub(crate) fn owns(&self, op: u64) -> bool {
        self.pending.as_ref().is_some_and(|p| p.id == op)
    }

    /// Release the slot held by `op`, stop watching and flush statement
    /// closes that were deferred while the operation ran.
    pub(crate) fn finish(&mut self, op: u64) {
        if !self.owns(op) {
            return;
        }
        self.pending = None;
        self.phase = Phase::Idle;
        self.watcher.disarm();
        if let Some(native) = self.native.as_deref_mut() {
            for stmt in self.deferred_closes.drain(..) {
                tracing::trace!(connection_id = self.id, %stmt, "closing deferred statement");
                native.stmt_close(stmt);
            }
        }
    }

    /// Arm the watcher (and the deadline, for `TIMEOUT` waits) for `status`.
    ///
    /// The descriptor is read from the native handle on every call.
    pub(crate) fn arm(&mut self, status: WaitStatus, deadline: &mut Deadline) -> Result<()> {
        let native = self.native.as_deref().ok_or(Error::Closed)?;
        let fd = native.socket();
        let timeout = if status.wants_timeout() {
            native.timeout_value()
        } else {
            None
        };

        self.watcher.arm(fd, status)?;
        match timeout {
            Some(after) => deadline.arm(after),
            None => deadline.disarm(),
        }

        tracing::trace!(
            connection_id = self.id,
            fd,
            wait = ?status,
            phase = %self.phase,
            "waiting for readiness"
        );
        Ok(())
    }

    /// Poll the watcher and deadline on behalf of `op`.
    ///
    /// Resolves with [`Error::Interrupted`] once `op` lost the slot.
    pub(crate) fn poll_ready(
        &mut self,
        op: u64,
        deadline: &mut Deadline,
        cx: &mut Context<'_>,
    ) -> Poll<Result<WaitStatus>> {
        let Some(pending) = self.pending.as_mut().filter(|p| p.id == op) else {
            return Poll::Ready(Err(Error::Interrupted));
        };
        match &pending.waker {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            _ => pending.waker = Some(cx.waker().clone()),
        }

        if let Poll::Ready(result) = self.watcher.poll_ready(cx) {
            return Poll::Ready(result.map_err(Error::from));
        }
        if deadline.poll_expired(cx).is_ready() {
            tracing::trace!(connection_id = self.id, "wait deadline expired");
            return Poll::Ready(Ok(WaitStatus::TIMEOUT));
        }
        Poll::Pending
    }

    /// Drop a native handle whose connect failed. The library already
    /// invalidated it, so it is not closed again.
    pub(crate) fn discard_native(&mut self) {
        self.watcher.disarm();
        self.native = None;
    }

    /// Close the physical connection, interrupting any outstanding operation.
    pub(crate) fn shutdown(&mut self) -> Result<()> {
        let Some(mut native) = self.native.take() else {
            return Err(Error::Closed);
        };

        self.watcher.disarm();
        if let Some(pending) = self.pending.take() {
            tracing::debug!(
                connection_id = self.id,
                operation = pending.name,
                phase = %self.phase,
                "interrupting outstanding operation"
            );
            if let Some(waker) = pending.waker {
                waker.wake();
            }
        }
        self.phase = Phase::Idle;
        self.deferred_closes.clear();

        native.close();
        tracing::info!(connection_id = self.id, "connection closed");
        Ok(())
    }

    /// Release a native statement, deferring while an operation is
    /// outstanding. A closed connection already released its statements.
    pub(crate) fn release_statement(&mut self, stmt: StmtId) {
        let Some(native) = self.native.as_deref_mut() else {
            return;
        };
        if self.pending.is_some() {
            tracing::trace!(connection_id = self.id, %stmt, "deferring statement close");
            self.deferred_closes.push(stmt);
            return;
        }
        tracing::debug!(connection_id = self.id, %stmt, "closing statement");
        native.stmt_close(stmt);
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.watcher.disarm();
        if let Some(mut native) = self.native.take() {
            for stmt in self.deferred_closes.drain(..) {
                native.stmt_close(stmt);
            }
            native.close();
            tracing::debug!(connection_id = self.id, "connection released");
        }
    }
}

/// A connection to a MariaDB server.
///
/// Operations must be issued from within a [`tokio::task::LocalSet`]: an
/// operation that cannot finish synchronously is advanced by a local task.
/// At most one operation is outstanding at a time; a second one fails with
/// [`Error::Busy`] without touching the connection.
///
/// # Example
///
/// ```rust,ignore
/// use maria_client::{Config, Connection};
///
/// let local = tokio::task::LocalSet::new();
/// local.run_until(async {
///     let conn = Connection::connect(&driver, &Config::new().host("localhost")).await?;
///     let rows = conn.exec("SELECT 1, NULL, 'x'").await?;
///     assert_eq!(rows.len(), 1);
///     conn.close()
/// }).await?;
/// ```
pub struct Connection {
    inner: Rc<RefCell<ConnectionInner>>,
}

impl Connection {
    /// Connect to a server using a native library handle from `driver`.
    ///
    /// # Panics
    ///
    /// Panics if the handshake suspends outside of a `LocalSet`.
    pub fn connect(driver: &dyn NativeDriver, config: &Config) -> Operation<Connection> {
        let span = instrumentation::connect_span(config);
        let native = match span.in_scope(|| driver.init()) {
            Ok(native) => native,
            Err(err) => {
                tracing::warn!(parent: &span, error = %err, "failed to allocate connection handle");
                return Operation::ready(Err(err.into()));
            }
        };

        let inner = ConnectionInner::new(native, config.inline_capacity);
        span.record(instrumentation::attributes::DB_CONNECTION_ID, inner.id());

        let options = config.to_connect_options();
        tracing::info!(
            parent: &span,
            host = %options.host_or_default(),
            port = options.port_or_default(),
            socket = options.socket.as_deref(),
            "connecting to MariaDB"
        );

        let shared = Rc::new(RefCell::new(inner));
        let handle = Connection {
            inner: Rc::clone(&shared),
        };
        machine::drive(&shared, ConnectMachine::new(options, handle, span))
    }

    /// Execute a query and buffer its whole result set.
    ///
    /// Statements without a result set yield an empty [`RowSet`].
    ///
    /// # Panics
    ///
    /// Panics if the query suspends outside of a `LocalSet`.
    pub fn exec(&self, sql: &str) -> Operation<RowSet> {
        machine::drive(&self.inner, QueryMachine::new(sql))
    }

    /// Prepare a statement.
    ///
    /// # Panics
    ///
    /// Panics if the prepare suspends outside of a `LocalSet`.
    pub fn prepare(&self, sql: &str) -> Operation<Statement> {
        machine::drive(
            &self.inner,
            PrepareMachine::new(sql, Rc::clone(&self.inner)),
        )
    }

    /// Close the connection.
    ///
    /// An outstanding operation resolves with [`Error::Interrupted`]. Every
    /// later operation on this connection, or on statements prepared on it,
    /// fails with [`Error::Closed`]. Closing twice returns [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| Error::Busy)?
            .shutdown()
    }

    /// Whether the native connection has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.try_borrow().is_ok_and(|c| c.native.is_none())
    }

    /// Whether an operation is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.try_borrow().map_or(true, |c| c.pending.is_some())
    }

    /// The current protocol phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.try_borrow().map_or(Phase::Idle, |c| c.phase)
    }

    /// Identifier used in log output.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.try_borrow().map_or(0, |c| c.id)
    }

    /// Number of owners of the connection state: this handle, each live
    /// statement, and a running driver task.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("phase", &self.phase())
            .field("closed", &self.is_closed())
            .finish()
    }
}
