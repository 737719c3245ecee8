//! Connection parameters handed to `connect_start`.

use std::time::Duration;

/// Parameters of `mysql_real_connect` plus the timeout options.
///
/// Every field is optional; the library applies its own defaults
/// (local socket or `localhost`, port 3306, current user).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Server host name or address.
    pub host: Option<String>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Default database.
    pub database: Option<String>,
    /// TCP port.
    pub port: Option<u16>,
    /// Unix socket path.
    pub socket: Option<String>,
    /// `MYSQL_OPT_CONNECT_TIMEOUT`.
    pub connect_timeout: Option<Duration>,
    /// `MYSQL_OPT_READ_TIMEOUT`.
    pub read_timeout: Option<Duration>,
    /// `MYSQL_OPT_WRITE_TIMEOUT`.
    pub write_timeout: Option<Duration>,
}

impl ConnectOptions {
    /// Default TCP port of the server.
    pub const DEFAULT_PORT: u16 = 3306;

    /// Host to connect to, falling back to `localhost`.
    #[must_use]
    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    /// Port to connect to, falling back to [`Self::DEFAULT_PORT`].
    ///
    /// Port `0` means "use the default", as in the C API.
    #[must_use]
    pub fn port_or_default(&self) -> u16 {
        match self.port {
            Some(0) | None => Self::DEFAULT_PORT,
            Some(port) => port,
        }
    }
}
