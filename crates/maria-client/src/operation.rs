//! Pending operation handles.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// The result of a database operation, possibly still in progress.
///
/// If the first non-blocking step finished synchronously, the operation is
/// already resolved. Otherwise a local driver task advances the protocol on
/// every readiness event and fulfils this handle when it completes.
///
/// Dropping an `Operation` does not cancel the protocol: the driver task runs
/// it to completion and discards the result. Use
/// [`Connection::close`](crate::Connection::close) to abort an operation.
#[must_use = "operations run regardless, but their result is only observable by awaiting"]
pub struct Operation<T> {
    state: State<T>,
}

enum State<T> {
    Ready(Option<Result<T>>),
    Pending(oneshot::Receiver<Result<T>>),
}

impl<T> Operation<T> {
    pub(crate) fn ready(result: Result<T>) -> Self {
        Self {
            state: State::Ready(Some(result)),
        }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            state: State::Pending(rx),
        }
    }

    /// Whether the operation completed without suspending.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }
}

impl<T> Unpin for Operation<T> {}

impl<T> Future for Operation<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            // A resolved operation polled again reports the connection as
            // closed rather than panicking.
            State::Ready(result) => Poll::Ready(result.take().unwrap_or(Err(Error::Closed))),
            State::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                // The driver task was dropped before finishing, which only
                // happens when its LocalSet is torn down.
                Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Interrupted)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<T> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Ready(Some(_)) => "ready",
            State::Ready(None) => "consumed",
            State::Pending(_) => "pending",
        };
        f.debug_struct("Operation").field("state", &state).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    #[test]
    fn test_ready_operation_resolves_immediately() {
        let op = Operation::ready(Ok(7));
        assert!(op.is_immediate());
        let mut task = tokio_test::task::spawn(op);
        assert_eq!(assert_ready!(task.poll()).unwrap(), 7);
    }

    #[test]
    fn test_pending_operation_resolves_on_send() {
        let (tx, rx) = oneshot::channel();
        let op: Operation<u8> = Operation::pending(rx);
        assert!(!op.is_immediate());
        let mut task = tokio_test::task::spawn(op);
        assert_pending!(task.poll());

        tx.send(Ok(1)).unwrap();
        assert!(task.is_woken());
        assert_eq!(assert_ready!(task.poll()).unwrap(), 1);
    }

    #[test]
    fn test_dropped_driver_reports_interrupted() {
        let (tx, rx) = oneshot::channel::<Result<()>>();
        let mut task = tokio_test::task::spawn(Operation::pending(rx));
        drop(tx);
        assert_eq!(assert_ready!(task.poll()), Err(Error::Interrupted));
    }
}
