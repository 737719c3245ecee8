//! Driver tests against a scripted native connection.
//!
//! The fake reports waits on one end of a real socket pair, so readiness is
//! delivered by tokio exactly as for a network connection. `WRITE` waits are
//! satisfied at once; `READ` waits hold until the test writes to the peer.
//! The fake never reads, so once the peer wrote, every later `READ` wait is
//! satisfied too.
//!
//! Connecting completes synchronously unless `connect_waits` is set, so the
//! waits of a test belong to the operation under test.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use maria_nonblock::{
    ColumnBuffer, ConnectOptions, FetchStatus, NativeConnection, NativeDriver, NativeError,
    NativeResult, Step, StmtId, StoredResult, StoredResultBuilder, WaitStatus,
};
use tokio::task::LocalSet;

use crate::{Config, Connection, Error, Param, Phase, QueryStep};

type Values = Vec<Option<&'static str>>;

/// What the fake observed.
#[derive(Debug, Default)]
struct Calls {
    log: Vec<String>,
    ready: Vec<WaitStatus>,
    bound: Vec<Vec<Option<Bytes>>>,
    stmt_closes: Vec<StmtId>,
    closed: bool,
}

impl Calls {
    fn count(&self, call: &str) -> usize {
        self.log.iter().filter(|c| *c == call).count()
    }
}

struct FakeNative {
    calls: Rc<RefCell<Calls>>,
    socket: UnixStream,
    wait: WaitStatus,
    connect_waits: usize,
    waits_per_call: usize,
    remaining: usize,
    timeout: Option<Duration>,
    connect_error: Option<NativeError>,
    query_error: Option<NativeError>,
    last_error: Option<NativeError>,
    result: Option<Vec<Values>>,
    params: usize,
    columns: usize,
    rows: VecDeque<Values>,
    fetch_error_after: Option<usize>,
    short_column_read: bool,
    current: Values,
    fetched: usize,
    next_stmt: u32,
}

impl FakeNative {
    fn new(calls: Rc<RefCell<Calls>>, socket: UnixStream) -> Self {
        socket.set_nonblocking(true).unwrap();
        Self {
            calls,
            socket,
            wait: WaitStatus::WRITE,
            connect_waits: 0,
            waits_per_call: 0,
            remaining: 0,
            timeout: None,
            connect_error: None,
            query_error: None,
            last_error: None,
            result: None,
            params: 0,
            columns: 0,
            rows: VecDeque::new(),
            fetch_error_after: None,
            short_column_read: false,
            current: Vec::new(),
            fetched: 0,
            next_stmt: 0,
        }
    }

    fn log(&self, call: &str) {
        self.calls.borrow_mut().log.push(call.to_string());
    }

    fn begin<T>(&mut self, call: &str, done: impl FnOnce(&mut Self) -> T) -> Step<T> {
        let waits = self.waits_per_call;
        self.begin_with(call, waits, done)
    }

    fn begin_with<T>(
        &mut self,
        call: &str,
        waits: usize,
        done: impl FnOnce(&mut Self) -> T,
    ) -> Step<T> {
        self.log(call);
        self.remaining = waits;
        self.step(done)
    }

    fn resume<T>(
        &mut self,
        call: &str,
        ready: WaitStatus,
        done: impl FnOnce(&mut Self) -> T,
    ) -> Step<T> {
        self.log(call);
        self.calls.borrow_mut().ready.push(ready);
        self.step(done)
    }

    fn step<T>(&mut self, done: impl FnOnce(&mut Self) -> T) -> Step<T> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Step::Wait(self.wait);
        }
        Step::Done(done(self))
    }

    fn stored(&mut self) -> Option<StoredResult> {
        let rows = self.result.take()?;
        let mut builder = StoredResultBuilder::new(rows.first().map_or(0, Vec::len));
        for row in rows {
            builder.push_row(row);
        }
        Some(builder.finish())
    }

    fn fetch(&mut self, columns: &mut [ColumnBuffer]) -> FetchStatus {
        if self.fetch_error_after == Some(self.fetched) {
            return FetchStatus::Error(NativeError::server_lost());
        }
        let Some(row) = self.rows.pop_front() else {
            return FetchStatus::NoData;
        };
        self.fetched += 1;
        let mut truncated = false;
        for (buffer, value) in columns.iter_mut().zip(&row) {
            truncated |= buffer.fill(value.map(str::as_bytes));
        }
        self.current = row;
        if truncated {
            FetchStatus::Truncated
        } else {
            FetchStatus::Row
        }
    }
}

impl NativeConnection for FakeNative {
    fn socket(&self) -> Option<RawFd> {
        Some(self.socket.as_raw_fd())
    }

    fn timeout_value(&self) -> Option<Duration> {
        self.timeout
    }

    fn last_error(&self) -> Option<NativeError> {
        self.last_error.clone()
    }

    fn connect_start(&mut self, _options: &ConnectOptions) -> Step<NativeResult<()>> {
        let waits = self.connect_waits;
        self.begin_with("connect_start", waits, |f| {
            f.connect_error.clone().map_or(Ok(()), Err)
        })
    }

    fn connect_cont(&mut self, ready: WaitStatus) -> Step<NativeResult<()>> {
        self.resume("connect_cont", ready, |f| {
            f.connect_error.clone().map_or(Ok(()), Err)
        })
    }

    fn query_start(&mut self, _sql: &str) -> Step<NativeResult<()>> {
        self.begin("query_start", |f| f.query_error.clone().map_or(Ok(()), Err))
    }

    fn query_cont(&mut self, ready: WaitStatus) -> Step<NativeResult<()>> {
        self.resume("query_cont", ready, |f| {
            f.query_error.clone().map_or(Ok(()), Err)
        })
    }

    fn store_result_start(&mut self) -> Step<Option<StoredResult>> {
        self.begin("store_result_start", Self::stored)
    }

    fn store_result_cont(&mut self, ready: WaitStatus) -> Step<Option<StoredResult>> {
        self.resume("store_result_cont", ready, Self::stored)
    }

    fn stmt_init(&mut self) -> NativeResult<StmtId> {
        self.next_stmt += 1;
        Ok(StmtId(self.next_stmt))
    }

    fn stmt_prepare_start(&mut self, _stmt: StmtId, _sql: &str) -> Step<NativeResult<()>> {
        self.begin("prepare_start", |_| Ok(()))
    }

    fn stmt_prepare_cont(&mut self, _stmt: StmtId, ready: WaitStatus) -> Step<NativeResult<()>> {
        self.resume("prepare_cont", ready, |_| Ok(()))
    }

    fn stmt_param_count(&self, _stmt: StmtId) -> usize {
        self.params
    }

    fn stmt_field_count(&self, _stmt: StmtId) -> usize {
        self.columns
    }

    fn stmt_bind_param(&mut self, _stmt: StmtId, params: &[Option<Bytes>]) -> NativeResult<()> {
        self.calls.borrow_mut().bound.push(params.to_vec());
        Ok(())
    }

    fn stmt_execute_start(&mut self, _stmt: StmtId) -> Step<NativeResult<()>> {
        self.begin("execute_start", |_| Ok(()))
    }

    fn stmt_execute_cont(&mut self, _stmt: StmtId, ready: WaitStatus) -> Step<NativeResult<()>> {
        self.resume("execute_cont", ready, |_| Ok(()))
    }

    fn stmt_fetch_start(&mut self, _stmt: StmtId, columns: &mut [ColumnBuffer]) -> Step<FetchStatus> {
        self.begin("fetch_start", |f| f.fetch(columns))
    }

    fn stmt_fetch_cont(
        &mut self,
        _stmt: StmtId,
        columns: &mut [ColumnBuffer],
        ready: WaitStatus,
    ) -> Step<FetchStatus> {
        self.resume("fetch_cont", ready, |f| f.fetch(columns))
    }

    fn stmt_fetch_column(
        &mut self,
        _stmt: StmtId,
        column: usize,
        offset: usize,
        out: &mut [u8],
    ) -> NativeResult<usize> {
        self.log("fetch_column");
        let value = self.current[column].unwrap_or_default().as_bytes();
        let tail = &value[offset.min(value.len())..];
        let mut n = tail.len().min(out.len());
        if self.short_column_read {
            n = n.saturating_sub(1);
        }
        out[..n].copy_from_slice(&tail[..n]);
        Ok(n)
    }

    fn stmt_close(&mut self, stmt: StmtId) {
        self.calls.borrow_mut().stmt_closes.push(stmt);
    }

    fn close(&mut self) {
        self.calls.borrow_mut().closed = true;
    }
}

struct FakeDriver {
    native: RefCell<Option<FakeNative>>,
}

impl NativeDriver for FakeDriver {
    fn init(&self) -> NativeResult<Box<dyn NativeConnection>> {
        self.native
            .borrow_mut()
            .take()
            .map(|n| Box::new(n) as Box<dyn NativeConnection>)
            .ok_or_else(|| NativeError::new(2008, "MySQL client ran out of memory"))
    }
}

/// A fake plus the peer end of its socket and the shared call record.
struct Harness {
    driver: FakeDriver,
    peer: UnixStream,
    calls: Rc<RefCell<Calls>>,
}

fn harness(configure: impl FnOnce(&mut FakeNative)) -> Harness {
    let (ours, peer) = UnixStream::pair().unwrap();
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut native = FakeNative::new(Rc::clone(&calls), ours);
    configure(&mut native);
    Harness {
        driver: FakeDriver {
            native: RefCell::new(Some(native)),
        },
        peer,
        calls,
    }
}

async fn connect(h: &Harness, config: &Config) -> Connection {
    Connection::connect(&h.driver, config).await.unwrap()
}

// =============================================================================
// Synchronous completion
// =============================================================================

#[tokio::test]
async fn test_synchronous_steps_resolve_immediately() {
    let h = harness(|n| n.result = Some(vec![vec![Some("1"), None, Some("x")]]));
    let op = Connection::connect(&h.driver, &Config::new());
    assert!(op.is_immediate());
    let conn = op.await.unwrap();

    let op = conn.exec("SELECT 1, NULL, 'x'");
    assert!(op.is_immediate());
    let rows = op.await.unwrap();
    assert_eq!(
        rows.to_text(),
        vec![vec![Some("1".into()), None, Some("x".into())]]
    );
    assert_eq!(conn.phase(), Phase::Idle);
    assert_eq!(conn.handle_count(), 1);
}

#[tokio::test]
async fn test_no_result_object_is_empty_row_set() {
    let h = harness(|_| {});
    let conn = connect(&h, &Config::new()).await;
    let rows = conn.exec("DELETE FROM t WHERE 0").await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_no_result_object_with_error_fails() {
    let h = harness(|n| n.last_error = Some(NativeError::new(1146, "Table 't' doesn't exist")));
    let conn = connect(&h, &Config::new()).await;
    let err = conn.exec("SELECT * FROM t").await.unwrap_err();
    assert_eq!(err.code(), Some(1146));
}

#[tokio::test]
async fn test_query_error_skips_store() {
    let h = harness(|n| n.query_error = Some(NativeError::new(1064, "syntax error")));
    let conn = connect(&h, &Config::new()).await;
    let err = conn.exec("SELEC").await.unwrap_err();
    assert_eq!(
        err,
        Error::Connection {
            message: "syntax error".into(),
            code: Some(1064)
        }
    );
    assert_eq!(h.calls.borrow().count("store_result_start"), 0);
    assert!(!conn.is_busy());
}

// =============================================================================
// Suspended operations
// =============================================================================

#[tokio::test]
async fn test_suspended_exec_advances_both_steps() {
    let h = harness(|n| {
        n.waits_per_call = 2;
        n.wait = WaitStatus::READ | WaitStatus::WRITE;
        n.result = Some(vec![vec![Some("a")], vec![Some("b")]]);
    });
    LocalSet::new()
        .run_until(async {
            let conn = connect(&h, &Config::new()).await;
            let op = conn.exec("SELECT c FROM t");
            assert!(!op.is_immediate());
            assert!(conn.is_busy());
            assert_eq!(conn.phase(), Phase::Query(QueryStep::Send));

            let rows = op.await.unwrap();
            assert_eq!(rows.len(), 2);
            assert!(!conn.is_busy());
            assert_eq!(conn.handle_count(), 1);

            let calls = h.calls.borrow();
            assert_eq!(calls.count("query_cont"), 2);
            assert_eq!(calls.count("store_result_cont"), 2);
            assert!(calls.ready.iter().all(|r| r.contains(WaitStatus::WRITE)));
        })
        .await;
}

#[tokio::test]
async fn test_second_operation_is_busy_without_side_effects() {
    let h = harness(|n| {
        n.wait = WaitStatus::READ;
        n.waits_per_call = 1;
    });
    LocalSet::new()
        .run_until(async {
            let conn = connect(&h, &Config::new()).await;
            let first = conn.exec("SELECT SLEEP(1)");
            assert!(conn.is_busy());

            assert_eq!(conn.exec("SELECT 2").await.unwrap_err(), Error::Busy);
            assert_eq!(conn.prepare("SELECT ?").await.unwrap_err(), Error::Busy);
            assert_eq!(h.calls.borrow().count("query_start"), 1);
            assert_eq!(h.calls.borrow().count("prepare_start"), 0);

            (&h.peer).write_all(b"!").unwrap();
            first.await.unwrap();
            assert!(!conn.is_busy());
        })
        .await;
}

#[tokio::test]
async fn test_close_interrupts_suspended_exec() {
    let h = harness(|n| {
        n.wait = WaitStatus::READ;
        n.waits_per_call = 1;
    });
    LocalSet::new()
        .run_until(async {
            let conn = connect(&h, &Config::new()).await;
            let pending = conn.exec("SELECT SLEEP(10)");
            tokio::task::yield_now().await;

            conn.close().unwrap();
            assert!(h.calls.borrow().closed);
            assert_eq!(pending.await.unwrap_err(), Error::Interrupted);

            assert_eq!(conn.exec("SELECT 1").await.unwrap_err(), Error::Closed);
            assert_eq!(conn.close().unwrap_err(), Error::Closed);
            assert_eq!(h.calls.borrow().count("query_cont"), 0);
        })
        .await;
}

#[tokio::test]
async fn test_close_before_driver_task_runs() {
    let h = harness(|n| n.waits_per_call = 1);
    LocalSet::new()
        .run_until(async {
            let conn = connect(&h, &Config::new()).await;
            let pending = conn.exec("SELECT 1");
            conn.close().unwrap();
            assert_eq!(pending.await.unwrap_err(), Error::Interrupted);
        })
        .await;
}

#[tokio::test]
async fn test_dropped_operation_still_completes() {
    let h = harness(|n| {
        n.waits_per_call = 1;
        n.result = Some(vec![vec![Some("1")]]);
    });
    LocalSet::new()
        .run_until(async {
            let conn = connect(&h, &Config::new()).await;
            drop(conn.exec("SELECT 1"));
            while conn.is_busy() {
                tokio::task::yield_now().await;
            }
            assert_eq!(h.calls.borrow().count("store_result_start"), 1);
            assert_eq!(conn.handle_count(), 1);
        })
        .await;
}

#[tokio::test]
async fn test_failed_connect_never_closes_native() {
    let h = harness(|n| {
        n.connect_waits = 1;
        n.connect_error = Some(NativeError::new(1045, "Access denied for user 'app'"));
    });
    LocalSet::new()
        .run_until(async {
            let err = Connection::connect(&h.driver, &Config::new())
                .await
                .unwrap_err();
            assert_eq!(err.code(), Some(1045));
            assert_eq!(h.calls.borrow().count("connect_cont"), 1);
            assert!(!h.calls.borrow().closed);
        })
        .await;
}

#[tokio::test]
#[should_panic(expected = "spawn_local")]
async fn test_suspending_outside_local_set_panics() {
    let h = harness(|n| n.waits_per_call = 1);
    let conn = connect(&h, &Config::new()).await;
    drop(conn.exec("SELECT 1"));
}

#[tokio::test]
async fn test_suspended_connect_resolves_with_handle() {
    let h = harness(|n| {
        n.connect_waits = 2;
        n.result = Some(vec![vec![Some("1")]]);
    });
    LocalSet::new()
        .run_until(async {
            let op = Connection::connect(&h.driver, &Config::new());
            assert!(!op.is_immediate());
            let conn = op.await.unwrap();
            assert_eq!(conn.phase(), Phase::Idle);
            assert_eq!(conn.handle_count(), 1);
            assert_eq!(h.calls.borrow().count("connect_cont"), 2);

            assert!(conn.exec("SELECT 1").is_immediate());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_wait_resumes_with_timeout() {
    let h = harness(|n| {
        n.waits_per_call = 1;
        n.wait = WaitStatus::READ | WaitStatus::TIMEOUT;
        n.timeout = Some(Duration::from_secs(5));
    });
    LocalSet::new()
        .run_until(async {
            let conn = connect(&h, &Config::new()).await;
            let started = tokio::time::Instant::now();
            conn.exec("SELECT SLEEP(60)").await.unwrap();
            assert!(started.elapsed() >= Duration::from_secs(10));
            // one deadline for the query, one for storing its result
            assert_eq!(
                h.calls.borrow().ready,
                vec![WaitStatus::TIMEOUT, WaitStatus::TIMEOUT]
            );
        })
        .await;
}

// =============================================================================
// Prepared statements
// =============================================================================

#[tokio::test]
async fn test_run_binds_text_and_fills_nulls() {
    let h = harness(|n| {
        n.params = 3;
        n.columns = 2;
        n.rows = VecDeque::from([vec![Some("1"), None]]);
    });
    let conn = connect(&h, &Config::new()).await;
    let stmt = conn.prepare("SELECT ?, ? FROM t WHERE x = ?").await.unwrap();
    assert_eq!(stmt.param_count(), 3);
    assert_eq!(stmt.column_count(), 2);

    let rows = stmt.run(&["a".into(), 7.into()]).await.unwrap();
    assert_eq!(rows.to_text(), vec![vec![Some("1".into()), None]]);
    assert_eq!(
        h.calls.borrow().bound[0],
        vec![
            Some(Bytes::from_static(b"a")),
            Some(Bytes::from_static(b"7")),
            None
        ]
    );
}

#[tokio::test]
async fn test_run_rejects_bad_argument_before_io() {
    let h = harness(|n| n.params = 1);
    let conn = connect(&h, &Config::new()).await;
    let stmt = conn.prepare("SELECT ?").await.unwrap();

    let err = stmt.run(&[Param::Bool(true)]).await.unwrap_err();
    assert!(matches!(err, Error::Argument { position: 1, .. }));
    assert!(h.calls.borrow().bound.is_empty());
    assert_eq!(h.calls.borrow().count("execute_start"), 0);
    assert!(!conn.is_busy());
}

#[tokio::test]
async fn test_zero_column_statement_skips_fetch() {
    let h = harness(|n| n.params = 1);
    let conn = connect(&h, &Config::new()).await;
    let stmt = conn.prepare("DELETE FROM t WHERE id = ?").await.unwrap();
    assert!(stmt.run(&[1.into()]).await.unwrap().is_empty());
    assert_eq!(h.calls.borrow().count("fetch_start"), 0);
}

#[tokio::test]
async fn test_truncated_column_is_refetched_exactly() {
    let h = harness(|n| {
        n.columns = 3;
        n.rows = VecDeque::from([vec![Some("ab"), Some("0123456789"), Some("cd")]]);
    });
    let conn = connect(&h, &Config::new().inline_capacity(4)).await;
    let stmt = conn.prepare("SELECT a, b, c FROM t").await.unwrap();
    let rows = stmt.run(&[]).await.unwrap();

    let row = &rows.rows()[0];
    assert_eq!(row.get(0), Some(&b"ab"[..]));
    assert_eq!(row.get(1), Some(&b"0123456789"[..]));
    assert_eq!(row.get(2), Some(&b"cd"[..]));
    assert_eq!(h.calls.borrow().count("fetch_column"), 1);
}

#[tokio::test]
async fn test_short_column_read_fails_run() {
    let h = harness(|n| {
        n.columns = 2;
        n.rows = VecDeque::from([
            vec![Some("ok"), Some("x")],
            vec![Some("ab"), Some("0123456789")],
        ]);
        n.short_column_read = true;
    });
    let conn = connect(&h, &Config::new().inline_capacity(4)).await;
    let stmt = conn.prepare("SELECT a, b FROM t").await.unwrap();

    let err = stmt.run(&[]).await.unwrap_err();
    assert_eq!(err.code(), Some(maria_nonblock::codes::CR_MALFORMED_PACKET));
    assert_eq!(h.calls.borrow().count("fetch_column"), 1);
    assert!(!conn.is_busy());
}

#[tokio::test]
async fn test_fetch_error_discards_partial_rows() {
    let h = harness(|n| {
        n.columns = 1;
        n.rows = VecDeque::from([vec![Some("1")], vec![Some("2")]]);
        n.fetch_error_after = Some(1);
    });
    let conn = connect(&h, &Config::new()).await;
    let stmt = conn.prepare("SELECT id FROM t").await.unwrap();
    let err = stmt.run(&[]).await.unwrap_err();
    assert!(err.is_connection_lost());
}

#[tokio::test]
async fn test_suspended_fetch_resumes_row_by_row() {
    let h = harness(|n| {
        n.columns = 1;
        n.waits_per_call = 1;
        n.rows = VecDeque::from([vec![Some("1")], vec![Some("2")], vec![Some("3")]]);
    });
    LocalSet::new()
        .run_until(async {
            let conn = connect(&h, &Config::new()).await;
            let stmt = conn.prepare("SELECT id FROM t").await.unwrap();
            let rows = stmt.run(&[]).await.unwrap();
            assert_eq!(rows.len(), 3);
            // three rows plus the end-of-data fetch
            assert_eq!(h.calls.borrow().count("fetch_cont"), 4);
        })
        .await;
}

#[tokio::test]
async fn test_statement_keeps_connection_alive() {
    let h = harness(|n| {
        n.columns = 1;
        n.rows = VecDeque::from([vec![Some("ok")]]);
    });
    let conn = connect(&h, &Config::new()).await;
    let stmt = conn.prepare("SELECT 'ok'").await.unwrap();
    assert_eq!(conn.handle_count(), 2);

    drop(conn);
    assert!(!h.calls.borrow().closed);
    assert_eq!(stmt.run(&[]).await.unwrap().len(), 1);

    stmt.close();
    assert!(h.calls.borrow().closed);
    assert_eq!(h.calls.borrow().stmt_closes, vec![StmtId(1)]);
}

#[tokio::test]
async fn test_statement_drop_while_exec_pending_defers_release() {
    let h = harness(|n| {
        n.wait = WaitStatus::READ;
        n.waits_per_call = 1;
    });
    LocalSet::new()
        .run_until(async {
            let conn = connect(&h, &Config::new()).await;
            let pending_prepare = conn.prepare("SELECT 1");
            (&h.peer).write_all(b"!").unwrap();
            let stmt = pending_prepare.await.unwrap();

            let pending = conn.exec("SELECT SLEEP(1)");
            drop(stmt);
            assert!(h.calls.borrow().stmt_closes.is_empty());

            (&h.peer).write_all(b"!").unwrap();
            pending.await.unwrap();
            assert_eq!(h.calls.borrow().stmt_closes, vec![StmtId(1)]);
        })
        .await;
}

#[tokio::test]
async fn test_run_after_connection_close_is_closed() {
    let h = harness(|n| n.columns = 1);
    let conn = connect(&h, &Config::new()).await;
    let stmt = conn.prepare("SELECT 1").await.unwrap();
    conn.close().unwrap();
    assert_eq!(stmt.run(&[]).await.unwrap_err(), Error::Closed);
    stmt.close();
    assert!(h.calls.borrow().stmt_closes.is_empty());
}
