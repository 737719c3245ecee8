//! Prepared statements: prepare once, then bind/execute/fetch per run.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use maria_nonblock::{
    FetchStatus, NativeConnection, NativeResult, Step, StmtId, WaitStatus, codes,
};
use tracing::Span;

use super::Machine;
use crate::connection::ConnectionInner;
use crate::error::{Error, Result};
use crate::instrumentation::{self, span_names};
use crate::materialize;
use crate::param::{self, Param};
use crate::row::{Row, RowSet};
use crate::state::{Phase, StatementStep};
use crate::statement::{Statement, StatementInner};

/// Allocates a native statement and drives `stmt_prepare`.
pub(crate) struct PrepareMachine {
    sql: String,
    conn: Rc<RefCell<ConnectionInner>>,
    stmt: Option<StmtId>,
}

impl PrepareMachine {
    pub(crate) fn new(sql: &str, conn: Rc<RefCell<ConnectionInner>>) -> Self {
        Self {
            sql: sql.to_string(),
            conn,
            stmt: None,
        }
    }

    fn on_step(
        &mut self,
        conn: &mut ConnectionInner,
        step: Step<NativeResult<()>>,
    ) -> Step<Result<Statement>> {
        let Some(id) = self.stmt else {
            return Step::Done(Err(Error::Closed));
        };
        match step {
            Step::Wait(status) => Step::Wait(status),
            Step::Done(Err(err)) => {
                self.stmt = None;
                if let Ok(native) = conn.native_mut() {
                    native.stmt_close(id);
                }
                Step::Done(Err(err.into()))
            }
            Step::Done(Ok(())) => {
                self.stmt = None;
                let (param_count, column_count) = match conn.native_mut() {
                    Ok(native) => (native.stmt_param_count(id), native.stmt_field_count(id)),
                    Err(err) => return Step::Done(Err(err)),
                };
                tracing::debug!(
                    connection_id = conn.id(),
                    %id,
                    param_count,
                    column_count,
                    "statement prepared"
                );
                let inner = StatementInner::new(
                    Rc::clone(&self.conn),
                    id,
                    std::mem::take(&mut self.sql),
                    param_count,
                    column_count,
                    conn.inline_capacity(),
                );
                Step::Done(Ok(Statement::new(inner)))
            }
        }
    }
}

impl Machine for PrepareMachine {
    type Output = Statement;

    fn name(&self) -> &'static str {
        "prepare"
    }

    fn span(&self, connection_id: u64) -> Span {
        instrumentation::statement_span(span_names::PREPARE, connection_id, &self.sql)
    }

    fn start(&mut self, conn: &mut ConnectionInner) -> Step<Result<Statement>> {
        conn.set_phase(Phase::Statement(StatementStep::Prepare));
        let native = match conn.native_mut() {
            Ok(native) => native,
            Err(err) => return Step::Done(Err(err)),
        };
        let id = match native.stmt_init() {
            Ok(id) => id,
            Err(err) => return Step::Done(Err(err.into())),
        };
        self.stmt = Some(id);
        let step = native.stmt_prepare_start(id, &self.sql);
        self.on_step(conn, step)
    }

    fn resume(&mut self, conn: &mut ConnectionInner, ready: WaitStatus) -> Step<Result<Statement>> {
        let Some(id) = self.stmt else {
            return Step::Done(Err(Error::Closed));
        };
        let step = match conn.native_mut() {
            Ok(native) => native.stmt_prepare_cont(id, ready),
            Err(err) => return Step::Done(Err(err)),
        };
        self.on_step(conn, step)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStep {
    Execute,
    Fetch,
}

/// Binds parameters, executes, and streams rows one fetch at a time.
pub(crate) struct RunMachine {
    stmt: Rc<StatementInner>,
    params: Vec<Param>,
    step: RunStep,
    rows: RowSet,
}

impl RunMachine {
    pub(crate) fn new(stmt: Rc<StatementInner>, params: Vec<Param>) -> Self {
        Self {
            stmt,
            params,
            step: RunStep::Execute,
            rows: RowSet::empty(),
        }
    }

    fn on_execute(
        &mut self,
        conn: &mut ConnectionInner,
        step: Step<NativeResult<()>>,
    ) -> Step<Result<RowSet>> {
        match step {
            Step::Wait(status) => Step::Wait(status),
            Step::Done(Err(err)) => Step::Done(Err(err.into())),
            Step::Done(Ok(())) => {
                if self.stmt.column_count() == 0 {
                    return Step::Done(Ok(RowSet::empty()));
                }
                self.step = RunStep::Fetch;
                self.fetch_rows(conn, None)
            }
        }
    }

    /// Fetch rows until the library waits or the result is exhausted.
    ///
    /// With `ready` set, the first call continues an interrupted fetch.
    fn fetch_rows(
        &mut self,
        conn: &mut ConnectionInner,
        mut ready: Option<WaitStatus>,
    ) -> Step<Result<RowSet>> {
        let id = self.stmt.id();
        loop {
            conn.set_phase(Phase::Statement(StatementStep::Fetch {
                row: self.rows.len(),
            }));
            let native = match conn.native_mut() {
                Ok(native) => native,
                Err(err) => return Step::Done(Err(err)),
            };
            let mut buffers = self.stmt.buffers().borrow_mut();
            let step = match ready.take() {
                Some(ready) => native.stmt_fetch_cont(id, &mut buffers, ready),
                None => native.stmt_fetch_start(id, &mut buffers),
            };

            let status = match step {
                Step::Wait(status) => return Step::Wait(status),
                Step::Done(status) => status,
            };
            match status {
                FetchStatus::Row => {
                    self.rows.push(materialize::column_buffers(&buffers));
                }
                FetchStatus::Truncated => match read_truncated(native, id, &buffers) {
                    Ok(row) => self.rows.push(row),
                    Err(err) => {
                        self.rows = RowSet::empty();
                        return Step::Done(Err(err));
                    }
                },
                FetchStatus::NoData => {
                    return Step::Done(Ok(std::mem::take(&mut self.rows)));
                }
                FetchStatus::Error(err) => {
                    // Partial rows are never returned alongside an error.
                    self.rows = RowSet::empty();
                    return Step::Done(Err(err.into()));
                }
            }
        }
    }
}

/// Build a row whose truncated columns are re-read at full length.
///
/// Each overflow value gets its own buffer sized to the reported length;
/// the scratch buffers of the other columns are left untouched. A short
/// read fails the row.
fn read_truncated(
    native: &mut dyn NativeConnection,
    id: StmtId,
    buffers: &[maria_nonblock::ColumnBuffer],
) -> Result<Row> {
    let mut values = Vec::with_capacity(buffers.len());
    for (column, buffer) in buffers.iter().enumerate() {
        if !buffer.is_truncated() {
            values.push(materialize::column_value(buffer));
            continue;
        }
        let mut full = vec![0u8; buffer.length()];
        let read = native.stmt_fetch_column(id, column, 0, &mut full)?;
        if read != full.len() {
            return Err(Error::connection(
                format!(
                    "column {column} returned {read} of {} bytes",
                    full.len()
                ),
                codes::CR_MALFORMED_PACKET,
            ));
        }
        tracing::trace!(%id, column, length = read, "fetched truncated column");
        values.push(Some(Bytes::from(full)));
    }
    Ok(Row::new(values))
}

impl Machine for RunMachine {
    type Output = RowSet;

    fn name(&self) -> &'static str {
        "run"
    }

    fn span(&self, connection_id: u64) -> Span {
        instrumentation::statement_span(span_names::RUN, connection_id, self.stmt.sql())
    }

    fn start(&mut self, conn: &mut ConnectionInner) -> Step<Result<RowSet>> {
        let values = match param::bind_values(&self.params, self.stmt.param_count()) {
            Ok(values) => values,
            Err(err) => return Step::Done(Err(err)),
        };

        conn.set_phase(Phase::Statement(StatementStep::Execute));
        self.step = RunStep::Execute;
        self.rows = RowSet::empty();
        let id = self.stmt.id();
        let native = match conn.native_mut() {
            Ok(native) => native,
            Err(err) => return Step::Done(Err(err)),
        };
        if let Err(err) = native.stmt_bind_param(id, &values) {
            return Step::Done(Err(err.into()));
        }
        let step = native.stmt_execute_start(id);
        self.on_execute(conn, step)
    }

    fn resume(&mut self, conn: &mut ConnectionInner, ready: WaitStatus) -> Step<Result<RowSet>> {
        match self.step {
            RunStep::Execute => {
                let step = match conn.native_mut() {
                    Ok(native) => native.stmt_execute_cont(self.stmt.id(), ready),
                    Err(err) => return Step::Done(Err(err)),
                };
                self.on_execute(conn, step)
            }
            RunStep::Fetch => self.fetch_rows(conn, Some(ready)),
        }
    }
}
