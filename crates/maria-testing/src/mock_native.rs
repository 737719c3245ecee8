//! A native client stand-in that talks to [`MockServer`](crate::MockServer).
//!
//! [`MockConnection`] implements the start/continue contract over a real
//! non-blocking TCP socket. Every call flushes queued output, then reads
//! until a whole server frame is buffered; when the socket would block it
//! reports the matching wait bits. That makes the driver's readiness loop
//! run against genuine kernel readiness rather than a scripted one.
//!
//! Timeouts follow the client library: when a read, write or connect
//! timeout is configured, waits include [`WaitStatus::TIMEOUT`] and a
//! continuation that reports only `TIMEOUT` fails with `CR_SERVER_LOST`.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use maria_nonblock::{
    ColumnBuffer, ConnectOptions, FetchStatus, NativeConnection, NativeDriver, NativeError,
    NativeResult, Step, StmtId, StoredResult, StoredResultBuilder, WaitStatus, codes,
};

use crate::frame::{ClientFrame, ServerFrame};

const READ_CHUNK: usize = 8192;

/// Creates [`MockConnection`] handles.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    fail_init: bool,
}

impl MockDriver {
    /// A driver whose handles connect over TCP.
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver whose handle allocation always fails.
    pub fn out_of_memory() -> Self {
        Self { fail_init: true }
    }
}

impl NativeDriver for MockDriver {
    fn init(&self) -> NativeResult<Box<dyn NativeConnection>> {
        if self.fail_init {
            return Err(NativeError::new(
                codes::CR_OUT_OF_MEMORY,
                "MySQL client ran out of memory",
            ));
        }
        Ok(Box::new(MockConnection::new()))
    }
}

/// The operation a `*_cont` call is allowed to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Connect,
    Query,
    Store,
    Prepare(StmtId),
    Execute(StmtId),
    Fetch(StmtId),
}

#[derive(Debug, Default)]
struct MockStatement {
    server_id: Option<u32>,
    param_count: usize,
    field_count: usize,
    bound: Vec<Option<Bytes>>,
    has_result: bool,
    current_row: Option<Vec<Option<Bytes>>>,
}

/// Outcome of one pass over the socket.
enum Pumped {
    Frame(ServerFrame),
    Blocked(WaitStatus),
    Failed(NativeError),
}

/// One mock client handle.
#[derive(Debug)]
pub struct MockConnection {
    stream: Option<TcpStream>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    pending: Option<Pending>,
    result_columns: Option<usize>,
    store: Option<StoredResultBuilder>,
    statements: HashMap<StmtId, MockStatement>,
    next_stmt: u32,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    wait_timeout: Option<Duration>,
    last_error: Option<NativeError>,
    affected_rows: u64,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnection {
    /// A fresh, unconnected handle.
    pub fn new() -> Self {
        Self {
            stream: None,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            pending: None,
            result_columns: None,
            store: None,
            statements: HashMap::new(),
            next_stmt: 1,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            wait_timeout: None,
            last_error: None,
            affected_rows: 0,
        }
    }

    /// Affected row count of the last statement without a result set.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Whether the handle holds an open socket.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Record an error without disturbing the operation in flight.
    fn set_error(&mut self, err: NativeError) -> NativeError {
        self.last_error = Some(err.clone());
        err
    }

    /// Abort the operation in flight with `err`.
    ///
    /// Transport failures and a failed handshake also drop the socket.
    fn fail(&mut self, err: NativeError) -> NativeError {
        let fatal = err.is_connection_lost()
            || err.code == codes::CR_MALFORMED_PACKET
            || self.pending == Some(Pending::Connect);
        if fatal {
            self.drop_stream();
        }
        self.pending = None;
        self.store = None;
        self.set_error(err)
    }

    fn drop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.read_buf.clear();
        self.write_buf.clear();
        self.result_columns = None;
        for stmt in self.statements.values_mut() {
            stmt.has_result = false;
            stmt.current_row = None;
        }
    }

    /// Claim the handle for a new operation.
    fn begin(&mut self, op: Pending) -> NativeResult<()> {
        if self.stream.is_none() {
            return Err(self.set_error(NativeError::server_gone()));
        }
        if self.pending.is_some() {
            return Err(self.set_error(NativeError::out_of_sync()));
        }
        self.pending = Some(op);
        self.last_error = None;
        Ok(())
    }

    /// Check that `ready` continues `op`.
    fn resume(&mut self, op: Pending, ready: WaitStatus) -> NativeResult<()> {
        if self.pending != Some(op) {
            return Err(self.set_error(NativeError::out_of_sync()));
        }
        let socket = WaitStatus::READ | WaitStatus::WRITE | WaitStatus::EXCEPT;
        if ready.contains(WaitStatus::TIMEOUT) && !ready.intersects(socket) {
            let err = if op == Pending::Connect {
                NativeError::new(
                    codes::CR_SERVER_LOST,
                    "Lost connection to server at 'handshake', connection timed out",
                )
            } else {
                NativeError::server_lost()
            };
            return Err(self.fail(err));
        }
        Ok(())
    }

    fn send(&mut self, frame: &ClientFrame) {
        frame.encode(&mut self.write_buf);
    }

    /// Flush queued output, then read until one server frame is buffered.
    fn pump(&mut self) -> Step<NativeResult<ServerFrame>> {
        match self.pump_io() {
            Pumped::Frame(frame) => Step::Done(Ok(frame)),
            Pumped::Failed(err) => Step::Done(Err(err)),
            Pumped::Blocked(socket) => {
                let timeout = if self.pending == Some(Pending::Connect) {
                    self.connect_timeout
                } else if socket.contains(WaitStatus::WRITE) {
                    self.write_timeout
                } else {
                    self.read_timeout
                };
                self.wait_timeout = timeout;
                match timeout {
                    Some(_) => Step::Wait(socket | WaitStatus::TIMEOUT),
                    None => Step::Wait(socket),
                }
            }
        }
    }

    fn pump_io(&mut self) -> Pumped {
        let Some(stream) = self.stream.as_mut() else {
            return Pumped::Failed(NativeError::server_gone());
        };

        while !self.write_buf.is_empty() {
            match stream.write(&self.write_buf) {
                Ok(0) => return Pumped::Failed(NativeError::server_lost()),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Pumped::Blocked(WaitStatus::WRITE);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Pumped::Failed(lost(&e)),
            }
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match ServerFrame::decode(&mut self.read_buf) {
                Ok(Some(frame)) => return Pumped::Frame(frame),
                Ok(None) => {}
                Err(e) => {
                    return Pumped::Failed(NativeError::new(
                        codes::CR_MALFORMED_PACKET,
                        format!("Malformed packet: {e}"),
                    ));
                }
            }
            match stream.read(&mut chunk) {
                Ok(0) => return Pumped::Failed(NativeError::server_lost()),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Pumped::Blocked(WaitStatus::READ);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Pumped::Failed(lost(&e)),
            }
        }
    }

    fn advance_connect(&mut self) -> Step<NativeResult<()>> {
        match self.pump() {
            Step::Wait(status) => Step::Wait(status),
            Step::Done(Ok(ServerFrame::Ok { .. })) => {
                self.pending = None;
                tracing::trace!(fd = ?self.socket(), "mock handshake complete");
                Step::Done(Ok(()))
            }
            Step::Done(Ok(ServerFrame::Err { code, message })) => {
                Step::Done(Err(self.fail(NativeError::new(code, message))))
            }
            Step::Done(Ok(other)) => Step::Done(Err(self.fail(unexpected(&other)))),
            Step::Done(Err(err)) => Step::Done(Err(self.fail(err))),
        }
    }

    fn advance_query(&mut self) -> Step<NativeResult<()>> {
        match self.pump() {
            Step::Wait(status) => Step::Wait(status),
            Step::Done(Ok(ServerFrame::Ok { affected })) => {
                self.pending = None;
                self.affected_rows = affected;
                Step::Done(Ok(()))
            }
            Step::Done(Ok(ServerFrame::ResultHeader { columns })) => {
                self.pending = None;
                self.result_columns = Some(columns as usize);
                Step::Done(Ok(()))
            }
            Step::Done(Ok(ServerFrame::Err { code, message })) => {
                Step::Done(Err(self.fail(NativeError::new(code, message))))
            }
            Step::Done(Ok(other)) => Step::Done(Err(self.fail(unexpected(&other)))),
            Step::Done(Err(err)) => Step::Done(Err(self.fail(err))),
        }
    }

    fn advance_store(&mut self) -> Step<Option<StoredResult>> {
        loop {
            match self.pump() {
                Step::Wait(status) => return Step::Wait(status),
                Step::Done(Ok(ServerFrame::Row(values))) => {
                    let accepted = self
                        .store
                        .as_mut()
                        .is_some_and(|builder| builder.push_row(values));
                    if !accepted {
                        self.fail(malformed("row width does not match the result header"));
                        return Step::Done(None);
                    }
                }
                Step::Done(Ok(ServerFrame::Eof)) => {
                    self.pending = None;
                    return Step::Done(self.store.take().map(StoredResultBuilder::finish));
                }
                Step::Done(Ok(ServerFrame::Err { code, message })) => {
                    self.fail(NativeError::new(code, message));
                    return Step::Done(None);
                }
                Step::Done(Ok(other)) => {
                    self.fail(unexpected(&other));
                    return Step::Done(None);
                }
                Step::Done(Err(err)) => {
                    self.fail(err);
                    return Step::Done(None);
                }
            }
        }
    }

    fn advance_prepare(&mut self, stmt: StmtId) -> Step<NativeResult<()>> {
        match self.pump() {
            Step::Wait(status) => Step::Wait(status),
            Step::Done(Ok(ServerFrame::PrepareOk {
                stmt_id,
                params,
                columns,
            })) => {
                self.pending = None;
                if let Some(entry) = self.statements.get_mut(&stmt) {
                    entry.server_id = Some(stmt_id);
                    entry.param_count = params as usize;
                    entry.field_count = columns as usize;
                    entry.bound = vec![None; params as usize];
                }
                Step::Done(Ok(()))
            }
            Step::Done(Ok(ServerFrame::Err { code, message })) => {
                Step::Done(Err(self.fail(NativeError::new(code, message))))
            }
            Step::Done(Ok(other)) => Step::Done(Err(self.fail(unexpected(&other)))),
            Step::Done(Err(err)) => Step::Done(Err(self.fail(err))),
        }
    }

    fn advance_execute(&mut self, stmt: StmtId) -> Step<NativeResult<()>> {
        match self.pump() {
            Step::Wait(status) => Step::Wait(status),
            Step::Done(Ok(ServerFrame::Ok { affected })) => {
                self.pending = None;
                self.affected_rows = affected;
                Step::Done(Ok(()))
            }
            Step::Done(Ok(ServerFrame::ResultHeader { .. })) => {
                self.pending = None;
                if let Some(entry) = self.statements.get_mut(&stmt) {
                    entry.has_result = true;
                }
                Step::Done(Ok(()))
            }
            Step::Done(Ok(ServerFrame::Err { code, message })) => {
                Step::Done(Err(self.fail(NativeError::new(code, message))))
            }
            Step::Done(Ok(other)) => Step::Done(Err(self.fail(unexpected(&other)))),
            Step::Done(Err(err)) => Step::Done(Err(self.fail(err))),
        }
    }

    fn advance_fetch(&mut self, stmt: StmtId, columns: &mut [ColumnBuffer]) -> Step<FetchStatus> {
        let frame = match self.pump() {
            Step::Wait(status) => return Step::Wait(status),
            Step::Done(Ok(frame)) => frame,
            Step::Done(Err(err)) => return Step::Done(FetchStatus::Error(self.fail(err))),
        };
        match frame {
            ServerFrame::Row(values) => {
                if values.len() != columns.len() {
                    let err = malformed("row width does not match the bound columns");
                    return Step::Done(FetchStatus::Error(self.fail(err)));
                }
                let mut truncated = false;
                for (buffer, value) in columns.iter_mut().zip(&values) {
                    truncated |= buffer.fill(value.as_deref());
                }
                self.pending = None;
                if let Some(entry) = self.statements.get_mut(&stmt) {
                    entry.current_row = Some(values);
                }
                if truncated {
                    Step::Done(FetchStatus::Truncated)
                } else {
                    Step::Done(FetchStatus::Row)
                }
            }
            ServerFrame::Eof => {
                self.pending = None;
                self.end_result(stmt);
                Step::Done(FetchStatus::NoData)
            }
            ServerFrame::Err { code, message } => {
                self.end_result(stmt);
                Step::Done(FetchStatus::Error(
                    self.fail(NativeError::new(code, message)),
                ))
            }
            other => Step::Done(FetchStatus::Error(self.fail(unexpected(&other)))),
        }
    }

    fn end_result(&mut self, stmt: StmtId) {
        if let Some(entry) = self.statements.get_mut(&stmt) {
            entry.has_result = false;
            entry.current_row = None;
        }
    }

    fn prepared_id(&self, stmt: StmtId) -> NativeResult<u32> {
        self.statements
            .get(&stmt)
            .and_then(|entry| entry.server_id)
            .ok_or_else(not_prepared)
    }
}

impl NativeConnection for MockConnection {
    fn socket(&self) -> Option<RawFd> {
        self.stream.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn timeout_value(&self) -> Option<Duration> {
        self.wait_timeout
    }

    fn last_error(&self) -> Option<NativeError> {
        self.last_error.clone()
    }

    fn connect_start(&mut self, options: &ConnectOptions) -> Step<NativeResult<()>> {
        if self.stream.is_some() || self.pending.is_some() {
            return Step::Done(Err(self.set_error(NativeError::out_of_sync())));
        }
        self.last_error = None;
        self.connect_timeout = options.connect_timeout;
        self.read_timeout = options.read_timeout;
        self.write_timeout = options.write_timeout;

        if let Some(path) = &options.socket {
            let err = NativeError::new(
                codes::CR_CONNECTION_ERROR,
                format!("Can't connect to local server through socket '{path}'"),
            );
            return Step::Done(Err(self.set_error(err)));
        }

        let host = options.host_or_default();
        let port = options.port_or_default();
        let stream = match open(host, port, options.connect_timeout) {
            Ok(stream) => stream,
            Err(e) => {
                let err = NativeError::new(
                    codes::CR_CONN_HOST_ERROR,
                    format!("Can't connect to server on '{host}' ({e})"),
                );
                return Step::Done(Err(self.set_error(err)));
            }
        };
        tracing::trace!(host, port, fd = stream.as_raw_fd(), "mock socket connected");
        self.stream = Some(stream);
        self.pending = Some(Pending::Connect);
        self.send(&ClientFrame::Hello {
            user: options.user.clone().unwrap_or_default(),
            password: options.password.clone().unwrap_or_default(),
            database: options.database.clone(),
        });
        self.advance_connect()
    }

    fn connect_cont(&mut self, ready: WaitStatus) -> Step<NativeResult<()>> {
        if let Err(err) = self.resume(Pending::Connect, ready) {
            return Step::Done(Err(err));
        }
        self.advance_connect()
    }

    fn query_start(&mut self, sql: &str) -> Step<NativeResult<()>> {
        if let Err(err) = self.begin(Pending::Query) {
            return Step::Done(Err(err));
        }
        self.result_columns = None;
        self.send(&ClientFrame::Query(sql.to_string()));
        self.advance_query()
    }

    fn query_cont(&mut self, ready: WaitStatus) -> Step<NativeResult<()>> {
        if let Err(err) = self.resume(Pending::Query, ready) {
            return Step::Done(Err(err));
        }
        self.advance_query()
    }

    fn store_result_start(&mut self) -> Step<Option<StoredResult>> {
        if self.pending.is_some() {
            self.set_error(NativeError::out_of_sync());
            return Step::Done(None);
        }
        self.last_error = None;
        let Some(columns) = self.result_columns.take() else {
            return Step::Done(None);
        };
        if let Err(err) = self.begin(Pending::Store) {
            self.last_error = Some(err);
            return Step::Done(None);
        }
        self.store = Some(StoredResultBuilder::new(columns));
        self.advance_store()
    }

    fn store_result_cont(&mut self, ready: WaitStatus) -> Step<Option<StoredResult>> {
        if self.resume(Pending::Store, ready).is_err() {
            return Step::Done(None);
        }
        self.advance_store()
    }

    fn stmt_init(&mut self) -> NativeResult<StmtId> {
        if self.stream.is_none() {
            return Err(self.set_error(NativeError::server_gone()));
        }
        let id = StmtId(self.next_stmt);
        self.next_stmt += 1;
        self.statements.insert(id, MockStatement::default());
        Ok(id)
    }

    fn stmt_prepare_start(&mut self, stmt: StmtId, sql: &str) -> Step<NativeResult<()>> {
        if !self.statements.contains_key(&stmt) {
            return Step::Done(Err(self.set_error(not_prepared())));
        }
        if let Err(err) = self.begin(Pending::Prepare(stmt)) {
            return Step::Done(Err(err));
        }
        self.send(&ClientFrame::Prepare(sql.to_string()));
        self.advance_prepare(stmt)
    }

    fn stmt_prepare_cont(&mut self, stmt: StmtId, ready: WaitStatus) -> Step<NativeResult<()>> {
        if let Err(err) = self.resume(Pending::Prepare(stmt), ready) {
            return Step::Done(Err(err));
        }
        self.advance_prepare(stmt)
    }

    fn stmt_param_count(&self, stmt: StmtId) -> usize {
        self.statements.get(&stmt).map_or(0, |s| s.param_count)
    }

    fn stmt_field_count(&self, stmt: StmtId) -> usize {
        self.statements.get(&stmt).map_or(0, |s| s.field_count)
    }

    fn stmt_bind_param(&mut self, stmt: StmtId, params: &[Option<Bytes>]) -> NativeResult<()> {
        let result = match self.statements.get_mut(&stmt) {
            Some(entry) if entry.server_id.is_some() => {
                if params.len() == entry.param_count {
                    entry.bound = params.to_vec();
                    Ok(())
                } else {
                    Err(NativeError::new(
                        codes::CR_INVALID_PARAMETER_NO,
                        "Invalid parameter number",
                    ))
                }
            }
            _ => Err(not_prepared()),
        };
        result.map_err(|err| self.set_error(err))
    }

    fn stmt_execute_start(&mut self, stmt: StmtId) -> Step<NativeResult<()>> {
        let server_id = match self.prepared_id(stmt) {
            Ok(id) => id,
            Err(err) => return Step::Done(Err(self.set_error(err))),
        };
        if let Err(err) = self.begin(Pending::Execute(stmt)) {
            return Step::Done(Err(err));
        }
        let params = match self.statements.get_mut(&stmt) {
            Some(entry) => {
                entry.has_result = false;
                entry.current_row = None;
                entry.bound.clone()
            }
            None => Vec::new(),
        };
        self.send(&ClientFrame::Execute {
            stmt_id: server_id,
            params,
        });
        self.advance_execute(stmt)
    }

    fn stmt_execute_cont(&mut self, stmt: StmtId, ready: WaitStatus) -> Step<NativeResult<()>> {
        if let Err(err) = self.resume(Pending::Execute(stmt), ready) {
            return Step::Done(Err(err));
        }
        self.advance_execute(stmt)
    }

    fn stmt_fetch_start(
        &mut self,
        stmt: StmtId,
        columns: &mut [ColumnBuffer],
    ) -> Step<FetchStatus> {
        let has_result = match self.statements.get(&stmt) {
            Some(entry) => entry.has_result,
            None => return Step::Done(FetchStatus::Error(self.set_error(not_prepared()))),
        };
        if !has_result {
            return Step::Done(FetchStatus::NoData);
        }
        if let Err(err) = self.begin(Pending::Fetch(stmt)) {
            return Step::Done(FetchStatus::Error(err));
        }
        self.advance_fetch(stmt, columns)
    }

    fn stmt_fetch_cont(
        &mut self,
        stmt: StmtId,
        columns: &mut [ColumnBuffer],
        ready: WaitStatus,
    ) -> Step<FetchStatus> {
        if let Err(err) = self.resume(Pending::Fetch(stmt), ready) {
            self.end_result(stmt);
            return Step::Done(FetchStatus::Error(err));
        }
        self.advance_fetch(stmt, columns)
    }

    fn stmt_fetch_column(
        &mut self,
        stmt: StmtId,
        column: usize,
        offset: usize,
        out: &mut [u8],
    ) -> NativeResult<usize> {
        let result = match self.statements.get(&stmt) {
            None => Err(not_prepared()),
            Some(entry) => match &entry.current_row {
                None => Err(NativeError::new(codes::CR_NO_DATA, "No data")),
                Some(row) => match row.get(column) {
                    None => Err(NativeError::new(
                        codes::CR_INVALID_PARAMETER_NO,
                        "Invalid parameter number",
                    )),
                    Some(None) => Ok(0),
                    Some(Some(value)) => {
                        let start = offset.min(value.len());
                        let n = (value.len() - start).min(out.len());
                        out[..n].copy_from_slice(&value[start..start + n]);
                        Ok(n)
                    }
                },
            },
        };
        result.map_err(|err| self.set_error(err))
    }

    fn stmt_close(&mut self, stmt: StmtId) {
        let Some(entry) = self.statements.remove(&stmt) else {
            return;
        };
        let Some(server_id) = entry.server_id else {
            return;
        };
        if self.stream.is_some() && self.pending.is_none() {
            // Not answered; flushed now or ahead of the next command.
            self.send(&ClientFrame::StmtClose(server_id));
            if let Some(stream) = self.stream.as_mut() {
                if let Ok(n) = stream.write(&self.write_buf) {
                    self.write_buf.advance(n);
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if self.pending.is_none() {
                self.write_buf.clear();
                ClientFrame::Quit.encode(&mut self.write_buf);
                let _ = stream.write_all(&self.write_buf);
            }
        }
        self.drop_stream();
        self.pending = None;
        self.store = None;
        self.statements.clear();
        self.wait_timeout = None;
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if self.stream.is_some() {
            self.close();
        }
    }
}

fn open(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved")))
}

fn lost(e: &io::Error) -> NativeError {
    NativeError::new(
        codes::CR_SERVER_LOST,
        format!("Lost connection to server during query ({e})"),
    )
    .with_sqlstate("HY000")
}

fn malformed(detail: &str) -> NativeError {
    NativeError::new(codes::CR_MALFORMED_PACKET, format!("Malformed packet: {detail}"))
}

fn unexpected(frame: &ServerFrame) -> NativeError {
    malformed(&format!("unexpected {frame:?}"))
}

fn not_prepared() -> NativeError {
    NativeError::new(codes::CR_NO_PREPARE_STMT, "Statement not prepared")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unconnected_handle() {
        let mut conn = MockConnection::new();
        assert!(conn.socket().is_none());
        assert!(conn.timeout_value().is_none());

        let Step::Done(Err(err)) = conn.query_start("SELECT 1") else {
            unreachable!("query without a connection must fail at once");
        };
        assert_eq!(err.code, codes::CR_SERVER_GONE_ERROR);
        assert_eq!(conn.last_error(), Some(err));
        assert!(conn.stmt_init().is_err());
    }

    #[test]
    fn test_continue_without_start_is_out_of_sync() {
        let mut conn = MockConnection::new();
        let Step::Done(Err(err)) = conn.connect_cont(WaitStatus::READ) else {
            unreachable!("continue without start must fail");
        };
        assert_eq!(err.code, codes::CR_COMMANDS_OUT_OF_SYNC);
    }

    #[test]
    fn test_socket_path_rejected() {
        let mut conn = MockConnection::new();
        let options = ConnectOptions {
            socket: Some("/run/mysqld/mysqld.sock".into()),
            ..ConnectOptions::default()
        };
        let Step::Done(Err(err)) = conn.connect_start(&options) else {
            unreachable!("socket connect must fail at once");
        };
        assert_eq!(err.code, codes::CR_CONNECTION_ERROR);
        assert!(err.message.contains("/run/mysqld/mysqld.sock"));
    }

    #[test]
    fn test_refused_port() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut conn = MockConnection::new();
        let options = ConnectOptions {
            host: Some("127.0.0.1".into()),
            port: Some(port),
            ..ConnectOptions::default()
        };
        let Step::Done(Err(err)) = conn.connect_start(&options) else {
            unreachable!("refused connect must fail at once");
        };
        assert_eq!(err.code, codes::CR_CONN_HOST_ERROR);
        assert!(conn.socket().is_none());
    }

    #[test]
    fn test_driver_out_of_memory() {
        let err = MockDriver::out_of_memory().init().err().unwrap();
        assert_eq!(err.code, codes::CR_OUT_OF_MEMORY);
        assert!(MockDriver::new().init().is_ok());
    }

    #[test]
    fn test_fetch_column_without_row() {
        let mut conn = MockConnection::new();
        let mut out = [0u8; 4];
        let err = conn.stmt_fetch_column(StmtId(9), 0, 0, &mut out).unwrap_err();
        assert_eq!(err.code, codes::CR_NO_PREPARE_STMT);
    }
}
