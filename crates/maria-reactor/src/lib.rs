//! # maria-reactor
//!
//! Readiness reactor for drivers of the MariaDB non-blocking client API.
//!
//! The native library reports which socket condition it is waiting for
//! ([`WaitStatus`](maria_nonblock::WaitStatus)). This crate turns that into a
//! tokio readiness registration and hands the satisfied condition back.
//!
//! ## Features
//!
//! - One registration per connection ([`Watcher`]); re-arming replaces the
//!   previous interest, it never adds a second registration
//! - Simultaneous read and write interest
//! - Real deadlines for `TIMEOUT` waits ([`Deadline`])
//! - Translation between tokio [`Interest`](tokio::io::Interest) /
//!   [`Ready`](tokio::io::Ready) and library wait bits
//!
//! ## Architecture
//!
//! ```text
//! NativeConnection --Wait(bits)--> Watcher::arm(fd, bits)
//!                                  Watcher::poll_ready --> bits --> *_cont
//! ```
//!
//! The descriptor is passed on every arm, never cached by the caller, since
//! the library may switch sockets while connecting.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod deadline;
pub mod error;
pub mod readiness;
pub mod watcher;

pub use deadline::Deadline;
pub use error::ReactorError;
pub use readiness::{interest_for, status_from_ready};
pub use watcher::Watcher;
