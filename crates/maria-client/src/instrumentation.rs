//! Tracing instrumentation for database operations.
//!
//! Every operation runs inside a `tracing` span named after the operation and
//! carrying the attributes of the OpenTelemetry database conventions, so a
//! `tracing-opentelemetry` layer installed by the application exports them
//! unchanged.
//!
//! ## Semantic Conventions
//!
//! - `db.system`: "mariadb"
//! - `db.name`: Database name
//! - `db.statement`: SQL statement (sanitized)
//! - `db.operation`: Query operation type (SELECT, INSERT, etc.)
//! - `server.address`: Server hostname
//! - `server.port`: Server port

use tracing::Span;

use crate::config::Config;

/// Database system identifier.
pub const DB_SYSTEM: &str = "mariadb";

/// Span names for database operations.
pub mod span_names {
    /// Connection establishment.
    pub const CONNECT: &str = "mariadb.connect";
    /// Simple query execution.
    pub const EXEC: &str = "mariadb.exec";
    /// Statement preparation.
    pub const PREPARE: &str = "mariadb.prepare";
    /// Prepared statement execution.
    pub const RUN: &str = "mariadb.run";
}

/// Attribute keys following OpenTelemetry semantic conventions.
pub mod attributes {
    /// Database system type.
    pub const DB_SYSTEM: &str = "db.system";
    /// Database name.
    pub const DB_NAME: &str = "db.name";
    /// SQL statement (sanitized).
    pub const DB_STATEMENT: &str = "db.statement";
    /// Database operation type.
    pub const DB_OPERATION: &str = "db.operation";
    /// Server hostname.
    pub const SERVER_ADDRESS: &str = "server.address";
    /// Server port.
    pub const SERVER_PORT: &str = "server.port";
    /// Connection ID.
    pub const DB_CONNECTION_ID: &str = "db.connection_id";
}

/// Configuration for SQL statement sanitization.
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Whether to replace literals.
    pub enabled: bool,
    /// Maximum length of statement to record, in bytes.
    pub max_length: usize,
    /// Placeholder for replaced literals.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 2048,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// Record statements verbatim.
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Sanitize a SQL statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if !self.enabled {
            return truncate_string(sql, self.max_length);
        }
        truncate_string(&sanitize_sql(sql, &self.placeholder), self.max_length)
    }
}

/// Replace string and numeric literals with a placeholder.
///
/// Backquoted identifiers are kept. Backslash escapes and doubled quotes
/// inside string literals are honoured.
fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        chars.next();
                    } else if c == quote {
                        if chars.peek() == Some(&quote) {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                result.push_str(placeholder);
            }
            '`' => {
                result.push(c);
                for c in chars.by_ref() {
                    result.push(c);
                    if c == '`' {
                        break;
                    }
                }
            }
            c if c.is_ascii_digit()
                && !result.ends_with(|ch: char| ch.is_alphanumeric() || ch == '_') =>
            {
                // Covers decimals and 0x hex literals.
                while chars
                    .peek()
                    .is_some_and(|ch| ch.is_ascii_alphanumeric() || *ch == '.')
                {
                    chars.next();
                }
                result.push_str(placeholder);
            }
            c => result.push(c),
        }
    }

    result
}

/// Truncate to at most `max_len` bytes on a character boundary.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Extract the operation type from a SQL statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let keyword = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" => "SELECT",
        "INSERT" => "INSERT",
        "UPDATE" => "UPDATE",
        "DELETE" => "DELETE",
        "REPLACE" => "REPLACE",
        "CALL" => "CALL",
        "BEGIN" | "START" => "BEGIN",
        "COMMIT" => "COMMIT",
        "ROLLBACK" => "ROLLBACK",
        "CREATE" => "CREATE",
        "ALTER" => "ALTER",
        "DROP" => "DROP",
        "TRUNCATE" => "TRUNCATE",
        "SET" => "SET",
        "SHOW" => "SHOW",
        _ => "OTHER",
    }
}

/// Span for a connection attempt.
pub fn connect_span(config: &Config) -> Span {
    let options = config.to_connect_options();
    tracing::info_span!(
        "mariadb.connect",
        db.system = DB_SYSTEM,
        db.name = config.database.as_deref().unwrap_or_default(),
        server.address = options.host_or_default(),
        server.port = options.port_or_default(),
        db.connection_id = tracing::field::Empty,
    )
}

/// Span for a statement-carrying operation (`exec`, `prepare`, `run`).
pub fn statement_span(name: &'static str, connection_id: u64, sql: &str) -> Span {
    let statement = SanitizationConfig::default().sanitize(sql);
    let operation = extract_operation(sql);
    match name {
        span_names::PREPARE => tracing::debug_span!(
            "mariadb.prepare",
            db.system = DB_SYSTEM,
            db.operation = operation,
            db.statement = %statement,
            db.connection_id = connection_id,
        ),
        span_names::RUN => tracing::debug_span!(
            "mariadb.run",
            db.system = DB_SYSTEM,
            db.operation = operation,
            db.statement = %statement,
            db.connection_id = connection_id,
        ),
        _ => tracing::debug_span!(
            "mariadb.exec",
            db.system = DB_SYSTEM,
            db.operation = operation,
            db.statement = %statement,
            db.connection_id = connection_id,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("SELECT * FROM users"), "SELECT");
        assert_eq!(extract_operation("  select id from users"), "SELECT");
        assert_eq!(extract_operation("(SELECT 1) UNION (SELECT 2)"), "SELECT");
        assert_eq!(extract_operation("INSERT INTO users VALUES (1)"), "INSERT");
        assert_eq!(extract_operation("REPLACE INTO t VALUES (1)"), "REPLACE");
        assert_eq!(extract_operation("START TRANSACTION"), "BEGIN");
        assert_eq!(extract_operation("CALL refresh()"), "CALL");
        assert_eq!(extract_operation("set names utf8mb4"), "SET");
        assert_eq!(extract_operation("DROP TABLE foo"), "DROP");
        assert_eq!(extract_operation(""), "OTHER");
        assert_eq!(extract_operation("unknown stuff"), "OTHER");
    }

    #[test]
    fn test_sanitize_sql() {
        let p = "?";
        assert_eq!(
            sanitize_sql("SELECT * FROM users WHERE name = 'Alice'", p),
            "SELECT * FROM users WHERE name = ?"
        );
        assert_eq!(
            sanitize_sql("SELECT * WHERE name = 'O''Brien' OR name = 'it\\'s'", p),
            "SELECT * WHERE name = ? OR name = ?"
        );
        assert_eq!(
            sanitize_sql("SELECT * FROM t2 WHERE id = 42 AND flags = 0xFF", p),
            "SELECT * FROM t2 WHERE id = ? AND flags = ?"
        );
        assert_eq!(
            sanitize_sql("SELECT `col 'x'` FROM t WHERE a = ?", p),
            "SELECT `col 'x'` FROM t WHERE a = ?"
        );
    }

    #[test]
    fn test_truncate_string_respects_char_boundaries() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("ééééé", 6), "é...");
        assert_eq!(truncate_string("ééééé", 7), "éé...");
    }

    #[test]
    fn test_sanitization_config() {
        let config = SanitizationConfig::default();
        assert!(config.enabled);
        assert_eq!(config.sanitize("SELECT 1"), "SELECT ?");

        let verbatim = SanitizationConfig::no_sanitization();
        assert_eq!(verbatim.sanitize("SELECT 'x'"), "SELECT 'x'");
    }
}
