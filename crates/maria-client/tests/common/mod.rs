//! Shared helpers for tests against the mock server.

#![allow(dead_code, clippy::expect_used, clippy::panic)]

use std::future::Future;
use std::time::Duration;

use maria_client::{Config, Connection};
use maria_testing::{MockDriver, MockServer};

/// Run `f` on a fresh `LocalSet`, as every suspending operation requires.
pub async fn local<F: Future>(f: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(f).await
}

/// Route driver logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// Configuration pointing at `server` with the default test credentials.
pub fn config_for(server: &MockServer) -> Config {
    Config::new()
        .host(server.host())
        .port(server.port())
        .user("app")
        .password("secret")
}

/// Connect to `server` with the default configuration.
pub async fn connect(server: &MockServer) -> Connection {
    Connection::connect(&MockDriver::new(), &config_for(server))
        .await
        .expect("connect to mock server")
}

/// Wait until `conn` has no outstanding operation.
pub async fn until_idle(conn: &Connection) {
    for _ in 0..5_000 {
        if !conn.is_busy() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("connection never became idle");
}

/// Wait until the server reports `count` open sessions.
pub async fn until_sessions(server: &MockServer, count: usize) {
    for _ in 0..5_000 {
        if server.connection_count().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("server never reached {count} sessions");
}

/// A loopback port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}
