//! Client configuration.

use std::time::Duration;

use maria_nonblock::ConnectOptions;

/// Default per-column inline capacity of statement scratch buffers.
pub const DEFAULT_INLINE_CAPACITY: usize = 256;

/// Timeouts handed to the native library.
///
/// The library enforces them itself: a wait that includes `TIMEOUT` is armed
/// with the library's current timeout value, and the library decides what an
/// expired deadline means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct TimeoutConfig {
    /// Time allowed for the connection handshake.
    pub connect_timeout: Option<Duration>,
    /// Time allowed for each read from the server.
    pub read_timeout: Option<Duration>,
    /// Time allowed for each write to the server.
    pub write_timeout: Option<Duration>,
}

impl TimeoutConfig {
    /// No timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}

/// Connection parameters.
///
/// All fields are optional; the native library fills in its defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    /// Server host.
    pub host: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Default database.
    pub database: Option<String>,
    /// Unix socket path.
    pub socket: Option<String>,
    /// Library timeouts.
    pub timeouts: TimeoutConfig,
    /// Inline capacity of each statement result column buffer. Longer values
    /// are read with a second column fetch.
    pub inline_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            socket: None,
            timeouts: TimeoutConfig::default(),
            inline_capacity: DEFAULT_INLINE_CAPACITY,
        }
    }
}

impl Config {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `key=value;key=value` connection string.
    ///
    /// Keys are case-insensitive. Recognized keys: `host` (`server`), `port`,
    /// `user` (`uid`, `user id`), `password` (`pwd`), `database` (`db`),
    /// `socket`, `connect timeout`, `read timeout`, `write timeout` (seconds)
    /// and `inline capacity` (bytes). Unknown keys are ignored. `host`
    /// accepts `host:port` and `[v6addr]:port`.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, crate::error::Error> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| crate::error::Error::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "host" | "server" => {
                    let (host, port) = split_host_port(value)?;
                    config.host = Some(host.to_string());
                    if port.is_some() {
                        config.port = port;
                    }
                }
                "port" => config.port = Some(parse_port(value)?),
                "user" | "uid" | "user id" => config.user = Some(value.to_string()),
                "password" | "pwd" => config.password = Some(value.to_string()),
                "database" | "db" => config.database = Some(value.to_string()),
                "socket" | "unix socket" => config.socket = Some(value.to_string()),
                "connect timeout" | "connection timeout" => {
                    config.timeouts.connect_timeout = Some(parse_secs(value)?);
                }
                "read timeout" => config.timeouts.read_timeout = Some(parse_secs(value)?),
                "write timeout" => config.timeouts.write_timeout = Some(parse_secs(value)?),
                "inline capacity" => {
                    config.inline_capacity = value.parse().map_err(|_| {
                        crate::error::Error::Config(format!("invalid inline capacity: {value}"))
                    })?;
                }
                _ => {
                    tracing::debug!(key = %key, "ignoring unknown connection string key");
                }
            }
        }

        Ok(config)
    }

    /// Set the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the user name.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the default database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the unix socket path.
    #[must_use]
    pub fn socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Set the timeouts.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the inline capacity of statement column buffers.
    #[must_use]
    pub fn inline_capacity(mut self, capacity: usize) -> Self {
        self.inline_capacity = capacity;
        self
    }

    /// Parameters for the native connect call.
    #[must_use]
    pub fn to_connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.host.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            port: self.port,
            socket: self.socket.clone(),
            connect_timeout: self.timeouts.connect_timeout,
            read_timeout: self.timeouts.read_timeout,
            write_timeout: self.timeouts.write_timeout,
        }
    }
}

/// Split `host:port` and `[v6addr]:port` shorthands. A bare value with more
/// than one `:` is an IPv6 literal without a port.
fn split_host_port(value: &str) -> Result<(&str, Option<u16>), crate::error::Error> {
    if let Some(bracketed) = value.strip_prefix('[') {
        let (addr, rest) = bracketed
            .split_once(']')
            .ok_or_else(|| crate::error::Error::Config(format!("invalid host: {value}")))?;
        return match rest {
            "" => Ok((addr, None)),
            _ => match rest.strip_prefix(':') {
                Some(port) => Ok((addr, Some(parse_port(port)?))),
                None => Err(crate::error::Error::Config(format!("invalid host: {value}"))),
            },
        };
    }
    match value.split_once(':') {
        Some((host, port)) if !port.contains(':') => Ok((host, Some(parse_port(port)?))),
        _ => Ok((value, None)),
    }
}

fn parse_port(value: &str) -> Result<u16, crate::error::Error> {
    value
        .parse()
        .map_err(|_| crate::error::Error::Config(format!("invalid port: {value}")))
}

fn parse_secs(value: &str) -> Result<Duration, crate::error::Error> {
    let secs: u64 = value
        .parse()
        .map_err(|_| crate::error::Error::Config(format!("invalid timeout: {value}")))?;
    Ok(Duration::from_secs(secs))
}
