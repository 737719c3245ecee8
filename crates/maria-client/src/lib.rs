//! # maria-client
//!
//! Async MariaDB client built on the client library's non-blocking API.
//!
//! Each operation (connect, query, prepare, run) is a resumable state machine
//! over the library's start/continue calls, advanced by socket readiness on
//! a single-threaded tokio scheduler. Any number of connections can have an
//! operation in flight at once; each connection runs at most one.
//!
//! ## Features
//!
//! - **Non-blocking state machines**: connect, simple query, prepare and
//!   prepared-statement run
//! - **Busy gate**: a second operation on a busy connection fails with
//!   [`Error::Busy`] instead of queueing
//! - **Interruption**: [`Connection::close`] aborts an in-flight operation
//!   with [`Error::Interrupted`]
//! - **Shared ownership**: statements keep their connection alive
//! - **Truncation fallback**: oversized column values are re-read at their
//!   full length
//!
//! ## Execution model
//!
//! Connection state lives in an `Rc<RefCell<_>>`, so handles are `!Send` and
//! operations must be issued inside a [`tokio::task::LocalSet`]. When the
//! first step of an operation cannot finish synchronously, a local task takes
//! over and fulfils the returned [`Operation`] future.
//!
//! ```text
//! Idle -> Connecting -> Idle (via connect())
//! Idle -> Query(Send) -> Query(Store) -> Idle (via exec())
//! Idle -> Statement(Prepare) -> Idle (via prepare())
//! Idle -> Statement(Execute) -> Statement(Fetch { row }) -> Idle (via run())
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use maria_client::{Config, Connection, Param};
//!
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let config = Config::from_connection_string("host=localhost;user=app;db=shop")?;
//!         let conn = Connection::connect(&driver, &config).await?;
//!
//!         let rows = conn.exec("SELECT 1, NULL, 'x'").await?;
//!         assert_eq!(rows.rows()[0].get_str(2).as_deref(), Some("x"));
//!
//!         let stmt = conn.prepare("SELECT name FROM users WHERE id = ?").await?;
//!         let rows = stmt.run(&[Param::from(42)]).await?;
//!
//!         conn.close()
//!     })
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod instrumentation;
mod machine;
pub mod materialize;
pub mod operation;
pub mod param;
pub mod row;
pub mod state;
pub mod statement;

pub use config::{Config, TimeoutConfig};
pub use connection::Connection;
pub use error::{Error, Result};
pub use maria_nonblock::{NativeConnection, NativeDriver};
pub use operation::Operation;
pub use param::Param;
pub use row::{Row, RowSet, Value};
pub use state::{Phase, QueryStep, StatementStep};
pub use statement::Statement;
