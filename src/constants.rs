//! Centralized constants for the Azure SQL MCP Gateway.
//!
//! This module contains the magic numbers and default values used throughout
//! the codebase, making them easy to find, understand, and modify.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// MCP protocol revision spoken by both transports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Service name reported by `/health` and the MCP `initialize` response.
pub const SERVICE_NAME: &str = "azure-sql-mcp-gateway";

/// Header carrying the transport session identifier.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Query parameter carrying the legacy SSE session identifier.
pub const SESSION_ID_QUERY_PARAM: &str = "sessionId";

// =============================================================================
// Token Lifetime Constants
// =============================================================================

/// Minimum remaining token lifetime before a proactive refresh, in seconds.
///
/// A connection whose access token has less than this margin left is treated
/// as unusable and replaced before the next query runs.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 120;

// =============================================================================
// Connection Constants
// =============================================================================

/// Default SQL Server TCP port.
pub const DEFAULT_SQL_PORT: u16 = 1433;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Default connection timeout as Duration.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration =
    Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS);

// =============================================================================
// HTTP Constants
// =============================================================================

/// Default HTTP bind address.
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Maximum accepted JSON-RPC request body size in bytes.
pub const MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

// =============================================================================
// Rate Limiting Constants
// =============================================================================

/// Default request budget per caller IP per window.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;

/// Default rate limit window in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

// =============================================================================
// Logging Constants
// =============================================================================

/// Default truncation length for query logging.
pub const LOG_QUERY_TRUNCATE_LENGTH: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_durations() {
        assert_eq!(DEFAULT_CONNECTION_TIMEOUT, Duration::from_secs(30));
    }

    #[test]
    fn test_safety_margin_is_two_minutes() {
        assert_eq!(TOKEN_SAFETY_MARGIN_SECS, 120);
    }
}
