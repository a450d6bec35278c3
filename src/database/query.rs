//! SELECT query execution and result shaping.

use crate::constants::LOG_QUERY_TRUNCATE_LENGTH;
use crate::database::connection::RawConnection;
use crate::database::types::{self, SqlValue};
use crate::error::ServerError;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::debug;

/// Result of a SELECT execution: ordered column names plus rows as JSON
/// objects keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column names in select-list order.
    pub columns: Vec<String>,

    /// Result rows.
    pub rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    /// Number of rows returned.
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }
}

/// Execute a SELECT statement on the shared connection and collect all rows.
pub async fn run_select(
    client: &mut RawConnection,
    query: &str,
) -> Result<QueryResult, ServerError> {
    use futures_util::stream::TryStreamExt;

    let start = Instant::now();
    debug!(
        "Executing query: {}",
        truncate_for_log(query, LOG_QUERY_TRUNCATE_LENGTH)
    );

    let mut stream = client.query(query, &[]).await?;

    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Map<String, Value>> = Vec::new();

    while let Some(item) = stream.try_next().await? {
        match item {
            tiberius::QueryItem::Metadata(meta) => {
                columns = meta.columns().iter().map(|c| c.name().to_string()).collect();
            }
            tiberius::QueryItem::Row(row) => {
                let mut object = Map::with_capacity(columns.len());
                for (idx, name) in columns.iter().enumerate() {
                    let value: SqlValue = types::extract_column(&row, idx);
                    object.insert(name.clone(), value.to_json());
                }
                rows.push(object);
            }
        }
    }

    debug!(
        "Query completed: {} rows in {} ms",
        rows.len(),
        start.elapsed().as_millis()
    );

    Ok(QueryResult { columns, rows })
}

/// Truncate a string for logging purposes.
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_count() {
        let mut result = QueryResult::default();
        assert_eq!(result.record_count(), 0);

        let mut row = Map::new();
        row.insert("id".to_string(), json!(1));
        result.rows.push(row);
        assert_eq!(result.record_count(), 1);
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(
            truncate_for_log("this is a long string", 10),
            "this is a ..."
        );
        assert_eq!(truncate_for_log("exactly10!", 10), "exactly10!");
    }
}
