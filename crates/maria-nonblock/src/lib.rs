//! # maria-nonblock
//!
//! Contract of the MariaDB non-blocking client API, as seen by an async driver.
//!
//! The MariaDB client library exposes every potentially blocking call as a
//! `*_start` / `*_cont` pair. A call either finishes, or reports the socket
//! condition it is waiting for. The caller waits for that condition on its
//! own event loop and hands the satisfied condition back to `*_cont`.
//!
//! This crate describes that contract in Rust terms:
//!
//! - [`WaitStatus`] - the wait bits (`READ`, `WRITE`, `EXCEPT`, `TIMEOUT`)
//! - [`Step`] - the outcome of one start/continue call
//! - [`NativeConnection`] - the start/continue pairs for connect, query,
//!   store result, prepare, execute and fetch
//! - [`StoredResult`] / [`RawRow`] - the raw row/column buffer of a stored result
//! - [`ColumnBuffer`] - fixed-capacity scratch buffers for statement fetches
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic and
//! makes no assumptions about the async runtime. The wire encoding belongs to
//! the library implementing [`NativeConnection`]; higher-level crates only
//! drive the state machine.
//!
//! ## Example
//!
//! ```rust,ignore
//! use maria_nonblock::{Step, WaitStatus};
//!
//! match conn.query_start("SELECT 1") {
//!     Step::Done(Ok(())) => { /* result header received */ }
//!     Step::Done(Err(e)) => eprintln!("query failed: {e}"),
//!     Step::Wait(status) => assert!(status.contains(WaitStatus::READ)),
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bind;
pub mod error;
pub mod native;
pub mod options;
pub mod result;
pub mod wait;

pub use bind::{ColumnBuffer, FetchStatus};
pub use error::{NativeError, NativeResult, codes};
pub use native::{NativeConnection, NativeDriver, StmtId};
pub use options::ConnectOptions;
pub use result::{ColumnSlice, RawRow, StoredResult, StoredResultBuilder};
pub use wait::{Step, WaitStatus};
