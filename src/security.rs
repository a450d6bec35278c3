//! Read-only statement validation for the `read_data` tool.
//!
//! The gateway exposes a single free-form query tool and it is read-only by
//! contract: the leading token of the statement must be `SELECT`. This is a
//! coarse gate against mutating statements, not a SQL parser; the database
//! principal's permissions remain the real enforcement boundary.

use crate::error::ServerError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Pattern matching a statement whose first non-whitespace token is SELECT.
///
/// Compiled once at first use. The pattern is a hardcoded constant that has
/// been verified to be valid regex.
static SELECT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*SELECT\b")
        .unwrap_or_else(|e| panic!("Internal error: invalid SELECT pattern: {e}"))
});

/// Query validator enforcing the read-only contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryValidator;

impl QueryValidator {
    /// Validate that `query` is a non-empty SELECT statement.
    ///
    /// Note that CTEs (`WITH ... SELECT`) are rejected: the contract is the
    /// literal leading token, matching the source system's behavior.
    pub fn validate_read_only(query: &str) -> Result<(), ServerError> {
        if query.trim().is_empty() {
            return Err(ServerError::validation(
                "Query must be a non-empty string",
            ));
        }

        if !SELECT_PATTERN.is_match(query) {
            return Err(ServerError::validation(
                "Only SELECT statements are allowed",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_statements_pass() {
        assert!(QueryValidator::validate_read_only("SELECT 1").is_ok());
        assert!(QueryValidator::validate_read_only("select * from SalesLT.Customer").is_ok());
        assert!(QueryValidator::validate_read_only("  \n\t SELECT TOP 5 * FROM t").is_ok());
        assert!(QueryValidator::validate_read_only("SeLeCt name FROM sys.tables").is_ok());
    }

    #[test]
    fn test_mutating_statements_rejected() {
        for query in [
            "DELETE FROM t",
            "UPDATE t SET x = 1",
            "INSERT INTO t VALUES (1)",
            "DROP TABLE t",
            "TRUNCATE TABLE t",
            "EXEC sp_who",
            "MERGE INTO t USING s ON 1=1 WHEN MATCHED THEN DELETE;",
        ] {
            let err = QueryValidator::validate_read_only(query).unwrap_err();
            assert!(err.to_string().contains("SELECT"), "query: {query}");
        }
    }

    #[test]
    fn test_cte_rejected() {
        // WITH-prefixed statements are SELECTs in spirit but fail the
        // leading-token contract; documented source behavior.
        assert!(QueryValidator::validate_read_only("WITH cte AS (SELECT 1 AS x) SELECT * FROM cte").is_err());
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(QueryValidator::validate_read_only("").is_err());
        assert!(QueryValidator::validate_read_only("   \n  ").is_err());
    }

    #[test]
    fn test_select_must_be_a_whole_token() {
        // "SELECTED" must not sneak past the word boundary.
        assert!(QueryValidator::validate_read_only("SELECTED FROM t").is_err());
    }
}
