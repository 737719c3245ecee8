//! Simple query: send, then store the result.

use maria_nonblock::{NativeResult, Step, StoredResult, WaitStatus};
use tracing::Span;

use super::Machine;
use crate::connection::ConnectionInner;
use crate::error::Result;
use crate::instrumentation::{self, span_names};
use crate::materialize;
use crate::row::RowSet;
use crate::state::{Phase, QueryStep};

pub(crate) struct QueryMachine {
    sql: String,
    step: QueryStep,
}

impl QueryMachine {
    pub(crate) fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            step: QueryStep::Send,
        }
    }

    fn on_send(
        &mut self,
        conn: &mut ConnectionInner,
        step: Step<NativeResult<()>>,
    ) -> Step<Result<RowSet>> {
        match step {
            Step::Wait(status) => Step::Wait(status),
            // The server rejected the query; no result to fetch.
            Step::Done(Err(err)) => Step::Done(Err(err.into())),
            Step::Done(Ok(())) => {
                self.step = QueryStep::Store;
                conn.set_phase(Phase::Query(QueryStep::Store));
                let step = match conn.native_mut() {
                    Ok(native) => native.store_result_start(),
                    Err(err) => return Step::Done(Err(err)),
                };
                self.on_store(conn, step)
            }
        }
    }

    fn on_store(
        &mut self,
        conn: &mut ConnectionInner,
        step: Step<Option<StoredResult>>,
    ) -> Step<Result<RowSet>> {
        match step {
            Step::Wait(status) => Step::Wait(status),
            Step::Done(Some(mut result)) => Step::Done(Ok(materialize::stored_result(&mut result))),
            // No result object: success for statements without rows, unless
            // the library recorded an error.
            Step::Done(None) => {
                let error = conn.native_mut().ok().and_then(|native| native.last_error());
                match error {
                    Some(err) => Step::Done(Err(err.into())),
                    None => Step::Done(Ok(RowSet::empty())),
                }
            }
        }
    }
}

impl Machine for QueryMachine {
    type Output = RowSet;

    fn name(&self) -> &'static str {
        "exec"
    }

    fn span(&self, connection_id: u64) -> Span {
        instrumentation::statement_span(span_names::EXEC, connection_id, &self.sql)
    }

    fn start(&mut self, conn: &mut ConnectionInner) -> Step<Result<RowSet>> {
        self.step = QueryStep::Send;
        conn.set_phase(Phase::Query(QueryStep::Send));
        let step = match conn.native_mut() {
            Ok(native) => native.query_start(&self.sql),
            Err(err) => return Step::Done(Err(err)),
        };
        self.on_send(conn, step)
    }

    fn resume(&mut self, conn: &mut ConnectionInner, ready: WaitStatus) -> Step<Result<RowSet>> {
        match self.step {
            QueryStep::Send => {
                let step = match conn.native_mut() {
                    Ok(native) => native.query_cont(ready),
                    Err(err) => return Step::Done(Err(err)),
                };
                self.on_send(conn, step)
            }
            QueryStep::Store => {
                let step = match conn.native_mut() {
                    Ok(native) => native.store_result_cont(ready),
                    Err(err) => return Step::Done(Err(err)),
                };
                self.on_store(conn, step)
            }
        }
    }
}
