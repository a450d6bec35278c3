//! Error types for the Azure SQL MCP Gateway.
//!
//! This module defines semantic error types with SQL Server error code mapping
//! for user-friendly error messages. Tool-level failures are recovered into
//! error results by the dispatcher; these types carry the cause up to it.

use thiserror::Error;

/// Domain-specific errors for the gateway.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential acquisition failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Cannot open or maintain the database connection
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Tool argument validation error
    #[error("Query validation failed: {0}")]
    ValidationFailed(String),

    /// Query execution error
    #[error("Query execution error: {message}")]
    QueryExecution {
        message: String,
        sql_error_code: Option<i32>,
    },

    /// Connection attempt exceeded its deadline
    #[error("Timeout: operation exceeded {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Transport session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Invalid tool input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error with a source.
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    /// Create a query execution error.
    pub fn query_error(msg: impl Into<String>) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_error_code: None,
        }
    }

    /// Create a query execution error with the SQL Server error number.
    pub fn query_error_with_code(msg: impl Into<String>, code: i32) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_error_code: Some(code),
        }
    }

    /// Create a timeout error.
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout {
            timeout_seconds: seconds,
        }
    }

    /// Create a session not found error.
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound(id.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error indicates the underlying connection is unusable.
    ///
    /// The connection manager drops its cached connection when execution
    /// reports one of these, so the next call reconnects instead of failing
    /// against a dead handle.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Timeout { .. } => true,
            Self::QueryExecution {
                sql_error_code: Some(code),
                ..
            } => is_transient_sql_error(*code),
            _ => false,
        }
    }
}

/// Map SQL Server error codes to semantic ServerError types.
pub fn from_sql_error(code: i32, message: &str) -> ServerError {
    match code {
        // Login failures
        18456 => ServerError::auth(format!("Login failed: {message}")),

        // Database unavailable / not found
        4060 => ServerError::connection(format!("Database unavailable: {message}")),

        // Timeout
        -2 => ServerError::timeout(0),

        // Connection errors
        -1 => ServerError::connection("Connection broken"),
        53 => ServerError::connection("Server not found or not accessible"),

        // Default: generic query error carrying the code
        _ => ServerError::query_error_with_code(message, code),
    }
}

/// Check if a SQL Server error code indicates a broken or transient connection.
fn is_transient_sql_error(code: i32) -> bool {
    matches!(
        code,
        -2      // Timeout
        | -1    // Connection broken
        | 10053 // Connection forcibly closed
        | 10054 // Connection reset
        | 10060 // Connection timed out
        | 40197 // Azure: service error
        | 40501 // Azure: service busy
        | 40613 // Azure: database unavailable
        | 49918 // Azure: not enough resources
        | 49919 // Azure: too many requests
        | 49920 // Azure: too busy
    )
}

impl From<tiberius::error::Error> for ServerError {
    fn from(e: tiberius::error::Error) -> Self {
        use tiberius::error::Error;

        match e {
            Error::Server(token) => from_sql_error(token.code() as i32, token.message()),
            Error::Io { message, .. } => ServerError::connection(format!("IO error: {message}")),
            Error::Tls(message) => ServerError::connection(format!("TLS error: {message}")),
            Error::Routing { host, port } => ServerError::connection(format!(
                "Server requested re-routing to {host}:{port}"
            )),
            other => ServerError::query_error(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::ConnectionRefused => ServerError::connection("Connection refused"),
            ErrorKind::ConnectionReset => ServerError::connection("Connection reset"),
            ErrorKind::ConnectionAborted => ServerError::connection("Connection aborted"),
            ErrorKind::NotConnected => ServerError::connection("Not connected"),
            ErrorKind::TimedOut => ServerError::timeout(0),
            _ => ServerError::connection(format!("IO error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_error_mapping() {
        let err = from_sql_error(18456, "Login failed for user 'test'");
        assert!(matches!(err, ServerError::Authentication(_)));

        let err = from_sql_error(4060, "Cannot open database");
        assert!(matches!(err, ServerError::Connection { .. }));

        let err = from_sql_error(102, "Incorrect syntax near 'FORM'");
        assert!(matches!(
            err,
            ServerError::QueryExecution {
                sql_error_code: Some(102),
                ..
            }
        ));
    }

    #[test]
    fn test_connection_fatal_detection() {
        assert!(ServerError::connection("broken").is_connection_fatal());
        assert!(ServerError::timeout(30).is_connection_fatal());
        assert!(ServerError::query_error_with_code("reset", 10054).is_connection_fatal());
        assert!(!ServerError::query_error_with_code("syntax", 102).is_connection_fatal());
        assert!(!ServerError::validation("not a SELECT").is_connection_fatal());
        assert!(!ServerError::auth("denied").is_connection_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = ServerError::validation("Only SELECT statements are allowed");
        assert!(err.to_string().contains("SELECT"));

        let err = ServerError::timeout(30);
        assert!(err.to_string().contains("30 seconds"));
    }
}
