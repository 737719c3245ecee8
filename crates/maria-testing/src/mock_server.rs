//! Mock MariaDB server for driver tests.
//!
//! The server speaks the framed protocol of [`crate::frame`] and answers
//! queries and prepared statements from a table of scripted responses.
//!
//! ## Features
//!
//! - Credential check on the handshake
//! - Configurable responses per SQL text, with a default for the rest
//! - Delayed, hanging and dropped responses for timeout and interruption tests
//! - Server-side prepared statements with placeholder counting
//! - A log of every request received
//!
//! ## Example
//!
//! ```rust,ignore
//! use maria_testing::mock_server::{MockResponse, MockServer};
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let server = MockServer::builder()
//!         .with_response("SELECT 1", MockResponse::scalar("1"))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let addr = server.addr();
//!     // Connect the driver to addr...
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};

use crate::frame::{ClientFrame, FrameError, ServerFrame};

/// Server error codes sent by the mock.
pub mod codes {
    /// Access denied for user.
    pub const ER_ACCESS_DENIED_ERROR: u32 = 1045;
    /// SQL syntax error; the default response for unscripted statements.
    pub const ER_PARSE_ERROR: u32 = 1064;
    /// Wrong number of arguments to a prepared statement.
    pub const ER_WRONG_ARGUMENTS: u32 = 1210;
    /// Unknown prepared statement handle.
    pub const ER_UNKNOWN_STMT_HANDLER: u32 = 1243;
}

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame from the client.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Protocol violation by the client.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Handler for [`MockResponse::Custom`], called with the SQL text and the
/// bound parameters. Text queries and statement preparation pass no
/// parameters; the column count of a prepared statement comes from the
/// response to that call.
pub type ResponseFn = dyn Fn(&str, &[Option<Bytes>]) -> MockResponse + Send + Sync;

/// Scripted response to a statement.
#[derive(Clone)]
pub enum MockResponse {
    /// A result set.
    Rows {
        /// Column count.
        columns: usize,
        /// Row values, `None` for NULL.
        rows: Vec<Vec<Option<Bytes>>>,
    },

    /// Success without a result set.
    Affected(u64),

    /// A server error.
    Error {
        /// Error code.
        code: u32,
        /// Error text.
        message: String,
    },

    /// Never answer; the connection stays open until the client leaves.
    Hang,

    /// Answer after a delay.
    Delayed(Duration, Box<MockResponse>),

    /// Close the connection without answering.
    Drop,

    /// Compute the response per request.
    Custom(Arc<ResponseFn>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", &rows.len())
                .finish(),
            Self::Affected(n) => f.debug_tuple("Affected").field(n).finish(),
            Self::Error { code, message } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Hang => f.write_str("Hang"),
            Self::Delayed(delay, inner) => {
                f.debug_tuple("Delayed").field(delay).field(inner).finish()
            }
            Self::Drop => f.write_str("Drop"),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// A result set built from text values.
    pub fn rows<R, V>(columns: usize, rows: R) -> Self
    where
        R: IntoIterator<Item = V>,
        V: IntoIterator<Item = Option<&'static str>>,
    {
        Self::Rows {
            columns,
            rows: rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|v| v.map(|s| Bytes::from_static(s.as_bytes())))
                        .collect()
                })
                .collect(),
        }
    }

    /// A result set built from raw values.
    pub fn raw_rows(columns: usize, rows: Vec<Vec<Option<Bytes>>>) -> Self {
        Self::Rows { columns, rows }
    }

    /// A single-column, single-row result.
    pub fn scalar(value: &'static str) -> Self {
        Self::rows(1, [[Some(value)]])
    }

    /// A result set with columns but no rows.
    pub fn no_rows(columns: usize) -> Self {
        Self::Rows {
            columns,
            rows: Vec::new(),
        }
    }

    /// Success without a result set and no affected rows.
    pub fn empty() -> Self {
        Self::Affected(0)
    }

    /// Success without a result set.
    pub fn affected(count: u64) -> Self {
        Self::Affected(count)
    }

    /// A server error.
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Delay another response.
    pub fn delayed(delay: Duration, response: MockResponse) -> Self {
        Self::Delayed(delay, Box::new(response))
    }

    /// Compute the response from the SQL text and parameters.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str, &[Option<Bytes>]) -> MockResponse + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Result column count this response reports when prepared.
    fn prepared_columns(&self) -> usize {
        match self {
            Self::Rows { columns, .. } => *columns,
            Self::Delayed(_, inner) => inner.prepared_columns(),
            _ => 0,
        }
    }
}

/// A request as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    /// Text query.
    Query(String),
    /// Statement preparation.
    Prepare(String),
    /// Prepared statement execution.
    Execute {
        /// The statement's SQL text.
        sql: String,
        /// Bound parameters.
        params: Vec<Option<Bytes>>,
    },
    /// Prepared statement release.
    Close(String),
}

/// Configuration for the mock server.
#[derive(Default)]
pub struct MockServerConfig {
    /// Responses keyed by trimmed SQL text.
    responses: HashMap<String, MockResponse>,
    /// Response for unmatched statements.
    default_response: Option<MockResponse>,
    /// Required `(user, password)`, if any.
    credentials: Option<(String, String)>,
}

impl MockServerConfig {
    fn response_for(&self, sql: &str) -> MockResponse {
        self.responses
            .get(sql.trim())
            .or(self.default_response.as_ref())
            .cloned()
            .unwrap_or_else(|| {
                MockResponse::error(
                    codes::ER_PARSE_ERROR,
                    format!("You have an error in your SQL syntax near '{sql}'"),
                )
            })
    }
}

/// Builder for [`MockServer`].
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a builder with no scripted responses.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Answer `sql` (compared after trimming) with `response`.
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.config
            .responses
            .insert(sql.into().trim().to_string(), response);
        self
    }

    /// Answer unmatched statements with `response` instead of a syntax error.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = Some(response);
        self
    }

    /// Reject handshakes that do not carry these credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((user.into(), password.into()));
        self
    }

    /// Build and start the server.
    pub async fn build(self) -> Result<MockServer> {
        MockServer::start(self.config).await
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running mock server.
///
/// Listens on an ephemeral loopback port. The accept loop and the
/// per-connection handlers run as tokio tasks; dropping the server stops
/// accepting new connections.
pub struct MockServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    connection_count: Arc<Mutex<usize>>,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockServer {
    /// Create a builder.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start a server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = Arc::new(config);
        let connection_count = Arc::new(Mutex::new(0usize));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            connection_count: connection_count.clone(),
            requests: requests.clone(),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                tracing::debug!(%peer, "mock server accepted connection");
                                let session = Session {
                                    config: config.clone(),
                                    requests: requests.clone(),
                                    statements: HashMap::new(),
                                    next_stmt: 1,
                                };
                                let count = connection_count.clone();
                                tokio::spawn(async move {
                                    *count.lock().await += 1;
                                    if let Err(e) = session.run(stream).await {
                                        tracing::debug!("mock connection error: {}", e);
                                    }
                                    let mut c = count.lock().await;
                                    *c = c.saturating_sub(1);
                                });
                            }
                            Err(e) => {
                                tracing::error!("mock server accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(server)
    }

    /// Listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of sessions currently open.
    pub async fn connection_count(&self) -> usize {
        *self.connection_count.lock().await
    }

    /// Every request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().await.clone()
    }

    /// SQL text of the text queries received so far.
    pub async fn queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .filter_map(|r| match r {
                MockRequest::Query(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Stop accepting connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PreparedStatement {
    sql: String,
    params: usize,
}

/// Per-connection server state.
struct Session {
    config: Arc<MockServerConfig>,
    requests: Arc<Mutex<Vec<MockRequest>>>,
    statements: HashMap<u32, PreparedStatement>,
    next_stmt: u32,
}

/// What the session does after answering a request.
enum Flow {
    Continue,
    Close,
}

impl Session {
    async fn run(mut self, mut stream: TcpStream) -> Result<()> {
        let mut buf = BytesMut::with_capacity(4096);

        match read_frame(&mut stream, &mut buf).await? {
            Some(ClientFrame::Hello { user, password, .. }) => {
                if let Some((want_user, want_password)) = &self.config.credentials {
                    if *want_user != user || *want_password != password {
                        let reply = ServerFrame::Err {
                            code: codes::ER_ACCESS_DENIED_ERROR,
                            message: format!(
                                "Access denied for user '{user}'@'localhost' (using password: {})",
                                if password.is_empty() { "NO" } else { "YES" }
                            ),
                        };
                        write_frames(&mut stream, &[reply]).await?;
                        return Ok(());
                    }
                }
                write_frames(&mut stream, &[ServerFrame::Ok { affected: 0 }]).await?;
            }
            Some(other) => {
                return Err(MockServerError::Protocol(format!(
                    "expected handshake, got {other:?}"
                )));
            }
            None => return Ok(()),
        }

        while let Some(frame) = read_frame(&mut stream, &mut buf).await? {
            let flow = match frame {
                ClientFrame::Query(sql) => {
                    self.log(MockRequest::Query(sql.clone())).await;
                    let response = self.config.response_for(&sql);
                    respond(&mut stream, &mut buf, response, &sql, &[]).await?
                }
                ClientFrame::Prepare(sql) => {
                    self.log(MockRequest::Prepare(sql.clone())).await;
                    self.prepare(&mut stream, &mut buf, sql).await?
                }
                ClientFrame::Execute { stmt_id, params } => {
                    self.execute(&mut stream, &mut buf, stmt_id, params)
                        .await?
                }
                ClientFrame::StmtClose(stmt_id) => {
                    if let Some(stmt) = self.statements.remove(&stmt_id) {
                        self.log(MockRequest::Close(stmt.sql)).await;
                    }
                    Flow::Continue
                }
                ClientFrame::Quit => Flow::Close,
                ClientFrame::Hello { .. } => {
                    return Err(MockServerError::Protocol("repeated handshake".into()));
                }
            };
            if let Flow::Close = flow {
                break;
            }
        }
        Ok(())
    }

    async fn log(&self, request: MockRequest) {
        self.requests.lock().await.push(request);
    }

    async fn prepare(
        &mut self,
        stream: &mut TcpStream,
        buf: &mut BytesMut,
        sql: String,
    ) -> Result<Flow> {
        let mut response = self.config.response_for(&sql);
        if let MockResponse::Custom(f) = &response {
            response = f(&sql, &[]);
        }
        match response {
            MockResponse::Error { .. } | MockResponse::Hang | MockResponse::Drop => {
                respond(stream, buf, response, &sql, &[]).await
            }
            other => {
                let stmt_id = self.next_stmt;
                self.next_stmt += 1;
                let params = sql.matches('?').count();
                let reply = ServerFrame::PrepareOk {
                    stmt_id,
                    params: params as u32,
                    columns: other.prepared_columns() as u32,
                };
                self.statements
                    .insert(stmt_id, PreparedStatement { sql, params });
                write_frames(stream, &[reply]).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn execute(
        &mut self,
        stream: &mut TcpStream,
        buf: &mut BytesMut,
        stmt_id: u32,
        params: Vec<Option<Bytes>>,
    ) -> Result<Flow> {
        let Some(stmt) = self.statements.get(&stmt_id) else {
            let reply = ServerFrame::Err {
                code: codes::ER_UNKNOWN_STMT_HANDLER,
                message: format!("Unknown prepared statement handler ({stmt_id}) given to mysqld_stmt_execute"),
            };
            write_frames(stream, &[reply]).await?;
            return Ok(Flow::Continue);
        };
        let sql = stmt.sql.clone();
        let expected = stmt.params;
        self.log(MockRequest::Execute {
            sql: sql.clone(),
            params: params.clone(),
        })
        .await;
        if params.len() != expected {
            let reply = ServerFrame::Err {
                code: codes::ER_WRONG_ARGUMENTS,
                message: "Incorrect arguments to mysqld_stmt_execute".into(),
            };
            write_frames(stream, &[reply]).await?;
            return Ok(Flow::Continue);
        }
        let response = self.config.response_for(&sql);
        respond(stream, buf, response, &sql, &params).await
    }
}

/// Send a scripted response, resolving delays and custom handlers first.
async fn respond(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    mut response: MockResponse,
    sql: &str,
    params: &[Option<Bytes>],
) -> Result<Flow> {
    loop {
        match response {
            MockResponse::Custom(f) => response = f(sql, params),
            MockResponse::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                response = *inner;
            }
            _ => break,
        }
    }

    let frames = match response {
        MockResponse::Rows { columns, rows } => {
            let mut frames = Vec::with_capacity(rows.len() + 2);
            frames.push(ServerFrame::ResultHeader {
                columns: columns as u32,
            });
            frames.extend(rows.into_iter().map(ServerFrame::Row));
            frames.push(ServerFrame::Eof);
            frames
        }
        MockResponse::Affected(affected) => vec![ServerFrame::Ok { affected }],
        MockResponse::Error { code, message } => vec![ServerFrame::Err { code, message }],
        MockResponse::Hang => {
            // Keep the socket open and ignore the client until it leaves.
            while read_frame(stream, buf).await?.is_some() {}
            return Ok(Flow::Close);
        }
        MockResponse::Drop => return Ok(Flow::Close),
        MockResponse::Custom(_) | MockResponse::Delayed(..) => Vec::new(),
    };
    write_frames(stream, &frames).await?;
    Ok(Flow::Continue)
}

/// Read the next client frame; `None` on a clean end of stream.
async fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<Option<ClientFrame>> {
    loop {
        if let Some(frame) = ClientFrame::decode(buf)? {
            return Ok(Some(frame));
        }
        match stream.read_buf(buf).await {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }
}

async fn write_frames(stream: &mut TcpStream, frames: &[ServerFrame]) -> Result<()> {
    let mut out = BytesMut::new();
    for frame in frames {
        frame.encode(&mut out);
    }
    stream.write_all(&out).await?;
    stream.flush().await?;
    Ok(())
}
