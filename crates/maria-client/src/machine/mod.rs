//! Non-blocking protocol state machines and the loop that drives them.
//!
//! Each operation is a small state machine over the native library's
//! start/continue calls. [`drive`] runs the first step synchronously under
//! the connection's busy gate. If the step must wait, a local task takes
//! over: it arms the watcher, waits for readiness, and feeds the satisfied
//! condition back into the machine until it reaches a terminal state.

mod connect;
mod query;
mod statement;

use std::cell::RefCell;
use std::future::poll_fn;
use std::rc::Rc;

use maria_nonblock::{Step, WaitStatus};
use maria_reactor::Deadline;
use tokio::sync::oneshot;
use tracing::{Instrument, Span};

use crate::connection::ConnectionInner;
use crate::error::{Error, Result};
use crate::operation::Operation;

pub(crate) use connect::ConnectMachine;
pub(crate) use query::QueryMachine;
pub(crate) use statement::{PrepareMachine, RunMachine};

/// A resumable operation on one connection.
pub(crate) trait Machine: 'static {
    /// Final value of a successful operation.
    type Output: 'static;

    /// Operation name for log output.
    fn name(&self) -> &'static str;

    /// Span the operation runs in.
    fn span(&self, connection_id: u64) -> Span;

    /// Issue the first non-blocking call.
    fn start(&mut self, conn: &mut ConnectionInner) -> Step<Result<Self::Output>>;

    /// Continue after the awaited condition was satisfied.
    fn resume(&mut self, conn: &mut ConnectionInner, ready: WaitStatus)
    -> Step<Result<Self::Output>>;
}

/// Run `machine` on the connection behind `shared`.
///
/// The closed/busy check and claiming the operation slot happen in one
/// uninterrupted borrow, so no other operation can slip in between.
pub(crate) fn drive<M: Machine>(
    shared: &Rc<RefCell<ConnectionInner>>,
    mut machine: M,
) -> Operation<M::Output> {
    let Ok(mut conn) = shared.try_borrow_mut() else {
        return Operation::ready(Err(Error::Busy));
    };
    if let Err(err) = conn.gate() {
        tracing::debug!(
            connection_id = conn.id(),
            operation = machine.name(),
            error = %err,
            "operation rejected"
        );
        return Operation::ready(Err(err));
    }

    let span = machine.span(conn.id());
    let op = conn.begin(machine.name());
    let status = match span.in_scope(|| machine.start(&mut conn)) {
        Step::Done(result) => {
            conn.finish(op);
            let connection_id = conn.id();
            drop(conn);
            log_completion(&span, connection_id, machine.name(), &result);
            return Operation::ready(result);
        }
        Step::Wait(status) => status,
    };
    drop(conn);

    let (tx, rx) = oneshot::channel();
    let shared = Rc::clone(shared);
    let task_span = span.clone();
    tokio::task::spawn_local(
        async move {
            let result = wait_loop(&shared, &mut machine, op, status).await;
            let connection_id = {
                let mut conn = shared.borrow_mut();
                conn.finish(op);
                conn.id()
            };
            log_completion(&task_span, connection_id, machine.name(), &result);
            drop(machine);
            drop(shared);
            if tx.send(result).is_err() {
                tracing::trace!(connection_id, "caller gone, result discarded");
            }
        }
        .instrument(span),
    );
    Operation::pending(rx)
}

/// Wait for readiness and advance the machine until it finishes.
async fn wait_loop<M: Machine>(
    shared: &Rc<RefCell<ConnectionInner>>,
    machine: &mut M,
    op: u64,
    mut status: WaitStatus,
) -> Result<M::Output> {
    let mut deadline = Deadline::new();
    loop {
        {
            let mut conn = shared.borrow_mut();
            if !conn.owns(op) {
                return Err(Error::Interrupted);
            }
            conn.arm(status, &mut deadline)?;
        }

        let ready = poll_fn(|cx| shared.borrow_mut().poll_ready(op, &mut deadline, cx)).await?;

        let mut conn = shared.borrow_mut();
        if !conn.owns(op) {
            return Err(Error::Interrupted);
        }
        tracing::trace!(connection_id = conn.id(), ready = ?ready, "socket ready");
        match machine.resume(&mut conn, ready) {
            Step::Done(result) => return result,
            Step::Wait(next) => status = next,
        }
    }
}

fn log_completion<T>(span: &Span, connection_id: u64, name: &'static str, result: &Result<T>) {
    let _enter = span.enter();
    match result {
        Ok(_) => tracing::debug!(connection_id, operation = name, "operation completed"),
        Err(Error::Interrupted) => {
            tracing::debug!(connection_id, operation = name, "operation interrupted");
        }
        Err(err) => tracing::debug!(
            connection_id,
            operation = name,
            error = %err,
            code = err.code(),
            "operation failed"
        ),
    }
}

#[cfg(test)]
mod tests;
