//! Connection handshake.

use maria_nonblock::{ConnectOptions, NativeResult, Step, WaitStatus};
use tracing::Span;

use super::Machine;
use crate::connection::{Connection, ConnectionInner};
use crate::error::{Error, Result};
use crate::state::Phase;

/// Drives `connect_start` / `connect_cont` to completion.
///
/// Carries the connection handle so the caller receives the very handle
/// whose state the handshake ran on.
pub(crate) struct ConnectMachine {
    options: ConnectOptions,
    handle: Option<Connection>,
    span: Span,
}

impl ConnectMachine {
    pub(crate) fn new(options: ConnectOptions, handle: Connection, span: Span) -> Self {
        Self {
            options,
            handle: Some(handle),
            span,
        }
    }

    fn on_step(
        &mut self,
        conn: &mut ConnectionInner,
        step: Step<NativeResult<()>>,
    ) -> Step<Result<Connection>> {
        match step {
            Step::Wait(status) => Step::Wait(status),
            Step::Done(Ok(())) => {
                tracing::info!(connection_id = conn.id(), "connected");
                Step::Done(self.handle.take().ok_or(Error::Closed))
            }
            Step::Done(Err(err)) => {
                tracing::warn!(
                    connection_id = conn.id(),
                    code = err.code,
                    error = %err.message,
                    "connect failed"
                );
                conn.discard_native();
                Step::Done(Err(err.into()))
            }
        }
    }
}

impl Machine for ConnectMachine {
    type Output = Connection;

    fn name(&self) -> &'static str {
        "connect"
    }

    fn span(&self, _connection_id: u64) -> Span {
        self.span.clone()
    }

    fn start(&mut self, conn: &mut ConnectionInner) -> Step<Result<Connection>> {
        conn.set_phase(Phase::Connecting);
        let step = match conn.native_mut() {
            Ok(native) => native.connect_start(&self.options),
            Err(err) => return Step::Done(Err(err)),
        };
        self.on_step(conn, step)
    }

    fn resume(&mut self, conn: &mut ConnectionInner, ready: WaitStatus) -> Step<Result<Connection>> {
        let step = match conn.native_mut() {
            Ok(native) => native.connect_cont(ready),
            Err(err) => return Step::Done(Err(err)),
        };
        self.on_step(conn, step)
    }
}
