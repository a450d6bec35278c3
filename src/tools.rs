//! Tool dispatch for the three SQL operations.
//!
//! The dispatcher maps a tool name plus arguments to one of:
//!
//! - `read_data`: execute a SELECT statement and return matching rows
//! - `list_table`: list base tables as schema-qualified names
//! - `describe_table`: look up column names and declared types
//!
//! Every call follows the same state machine: validate arguments, ensure a
//! live connection (via the backend), execute, wrap the result in the audit
//! envelope. Any failure is converted into an error result - tool failures
//! are never fatal to the server process or the transport session.

mod inputs;

pub use inputs::*;

use crate::database::{ColumnDef, QueryResult, TableRef};
use crate::error::ServerError;
use crate::security::QueryValidator;
use crate::session::SessionIdentity;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Tool names exposed through `tools/list`.
pub const TOOL_READ_DATA: &str = "read_data";
pub const TOOL_LIST_TABLE: &str = "list_table";
pub const TOOL_DESCRIBE_TABLE: &str = "describe_table";

/// SQL operations the dispatcher executes against the shared connection.
///
/// Production wires this to the connection manager; tests substitute a mock
/// to observe which operations a dispatch reaches.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Execute a validated SELECT statement.
    async fn run_select(&self, query: &str) -> Result<QueryResult, ServerError>;

    /// List base tables, optionally filtered to the given schemas.
    async fn list_tables(&self, schemas: &[String]) -> Result<Vec<TableRef>, ServerError>;

    /// Look up columns for a table by unqualified name.
    async fn describe_table(&self, table_name: &str) -> Result<Vec<ColumnDef>, ServerError>;
}

/// A tool's advertised definition for `tools/list`.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Render in MCP wire shape.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// Outcome of one tool call, ready for the MCP result envelope.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Text content returned to the caller (JSON payload or error message).
    pub text: String,

    /// Whether this is an error result.
    pub is_error: bool,
}

impl ToolResult {
    fn success(payload: &Value) -> Self {
        Self {
            text: serde_json::to_string_pretty(payload)
                .unwrap_or_else(|e| format!("Failed to serialize result: {e}")),
            is_error: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            is_error: true,
        }
    }
}

/// Maps tool calls onto the SQL backend and shapes the response envelope.
pub struct ToolDispatcher {
    backend: Arc<dyn SqlBackend>,
}

impl ToolDispatcher {
    /// Create a dispatcher over the given backend.
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    /// The definitions advertised through `tools/list`.
    pub fn tool_definitions() -> Vec<ToolDefinition> {
        fn schema_of<T: schemars::JsonSchema>() -> Value {
            serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({}))
        }

        vec![
            ToolDefinition {
                name: TOOL_READ_DATA,
                description:
                    "Execute a read-only SELECT query against the database and return matching rows.",
                input_schema: schema_of::<ReadDataInput>(),
            },
            ToolDefinition {
                name: TOOL_LIST_TABLE,
                description:
                    "List base tables as schema-qualified names, optionally filtered to specific schemas.",
                input_schema: schema_of::<ListTableInput>(),
            },
            ToolDefinition {
                name: TOOL_DESCRIBE_TABLE,
                description:
                    "Describe a table's columns: names and declared data types, matched by unqualified table name.",
                input_schema: schema_of::<DescribeTableInput>(),
            },
        ]
    }

    /// Dispatch one tool call for the given caller.
    ///
    /// Never returns an error: failures become `is_error` results carrying
    /// the message.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<Value>,
        caller: &SessionIdentity,
    ) -> ToolResult {
        let started = Instant::now();

        let outcome = match name {
            TOOL_READ_DATA => self.read_data(arguments, caller).await,
            TOOL_LIST_TABLE => self.list_table(arguments, caller).await,
            TOOL_DESCRIBE_TABLE => self.describe_table(arguments, caller).await,
            other => Err(ServerError::invalid_input(format!("Unknown tool: {other}"))),
        };

        match outcome {
            Ok(payload) => {
                info!(
                    tool = name,
                    executed_by = caller.audit_name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool call completed"
                );
                ToolResult::success(&payload)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                ToolResult::error(e.to_string())
            }
        }
    }

    async fn read_data(
        &self,
        arguments: Option<Value>,
        caller: &SessionIdentity,
    ) -> Result<Value, ServerError> {
        let input: ReadDataInput = parse_arguments(TOOL_READ_DATA, arguments)?;

        // Validation precedes any connection attempt.
        QueryValidator::validate_read_only(&input.query)?;

        let result = self.backend.run_select(&input.query).await?;
        let count = result.record_count();

        Ok(json!({
            "success": true,
            "message": format!("Retrieved {count} record(s)"),
            "data": result.rows,
            "recordCount": count,
            "executedAt": Utc::now().to_rfc3339(),
            "executedBy": caller.audit_name(),
        }))
    }

    async fn list_table(
        &self,
        arguments: Option<Value>,
        caller: &SessionIdentity,
    ) -> Result<Value, ServerError> {
        let input: ListTableInput = parse_arguments(TOOL_LIST_TABLE, arguments)?;
        let filter = input.schema_filter();

        let mut tables = self.backend.list_tables(&filter).await?;

        // The catalog query already orders; re-sorting here pins the
        // case-insensitive (schema, table) contract regardless of the
        // database collation.
        tables.sort_by(|a, b| {
            (a.schema.to_lowercase(), a.name.to_lowercase())
                .cmp(&(b.schema.to_lowercase(), b.name.to_lowercase()))
        });

        let names: Vec<String> = tables.iter().map(TableRef::qualified).collect();
        let count = names.len();

        Ok(json!({
            "success": true,
            "tables": names,
            "tableCount": count,
            "executedAt": Utc::now().to_rfc3339(),
            "executedBy": caller.audit_name(),
        }))
    }

    async fn describe_table(
        &self,
        arguments: Option<Value>,
        caller: &SessionIdentity,
    ) -> Result<Value, ServerError> {
        let input: DescribeTableInput = parse_arguments(TOOL_DESCRIBE_TABLE, arguments)?;

        if input.table_name.trim().is_empty() {
            return Err(ServerError::invalid_input(
                "tableName must be a non-empty string",
            ));
        }

        // An unknown table legitimately yields zero columns.
        let columns = self.backend.describe_table(&input.table_name).await?;
        let count = columns.len();

        Ok(json!({
            "success": true,
            "tableName": input.table_name,
            "columns": columns,
            "columnCount": count,
            "executedAt": Utc::now().to_rfc3339(),
            "executedBy": caller.audit_name(),
        }))
    }
}

/// Deserialize tool arguments into their typed input struct.
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool: &str,
    arguments: Option<Value>,
) -> Result<T, ServerError> {
    let value = arguments.unwrap_or_else(|| json!({}));
    serde_json::from_value(value)
        .map_err(|e| ServerError::invalid_input(format!("Invalid arguments for {tool}: {e}")))
}
