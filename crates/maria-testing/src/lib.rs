//! # maria-testing
//!
//! Test infrastructure for MariaDB driver development.
//!
//! The crate provides a scripted mock server and a native-library stand-in
//! that talks to it over a real non-blocking TCP socket. Together they let
//! driver tests exercise every wait and readiness path without a database.
//!
//! ## Features
//!
//! - Mock server with per-statement responses, delays, hangs and drops
//! - [`MockDriver`] / [`MockConnection`] implementing the non-blocking
//!   client contract of `maria-nonblock`
//! - Request log for asserting what reached the server
//!
//! ## Mock Server Example
//!
//! ```rust,ignore
//! use maria_testing::{MockDriver, MockResponse, MockServer};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockServer::builder()
//!         .with_response("SELECT 1", MockResponse::scalar("1"))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let config = Config::new().host(server.host()).port(server.port());
//!     // Connection::connect(&MockDriver::new(), &config)...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod frame;
pub mod mock_native;
pub mod mock_server;

pub use frame::{ClientFrame, FrameError, ServerFrame};
pub use mock_native::{MockConnection, MockDriver};
pub use mock_server::{MockRequest, MockResponse, MockServer, MockServerBuilder, MockServerError};
