//! MCP method handling shared by both transport front-ends.
//!
//! A transport parses the JSON-RPC envelope, resolves the session id, and
//! hands the request here; the response (if any) goes back out through the
//! originating transport's framing.

use crate::constants::{MCP_PROTOCOL_VERSION, SERVICE_NAME};
use crate::protocol::{error_codes, methods, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::server::McpGateway;
use crate::tools::{ToolDispatcher, ToolResult};
use serde_json::{json, Value};
use tracing::debug;

/// Handle one JSON-RPC message for the given transport session.
///
/// Returns `None` for notifications, which receive no response.
pub async fn handle_request(
    gateway: &McpGateway,
    session_id: &str,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    if request.jsonrpc != JSONRPC_VERSION {
        let id = request.id.unwrap_or(Value::Null);
        return Some(JsonRpcResponse::error(
            id,
            error_codes::INVALID_REQUEST,
            "Unsupported JSON-RPC version",
        ));
    }

    if request.is_notification() {
        debug!(method = %request.method, session_id, "notification received");
        return None;
    }

    let id = request.id.clone().unwrap_or(Value::Null);

    let response = match request.method.as_str() {
        methods::INITIALIZE => JsonRpcResponse::success(id, initialize_result()),
        methods::PING => JsonRpcResponse::success(id, json!({})),
        methods::TOOLS_LIST => JsonRpcResponse::success(id, tools_list_result()),
        methods::TOOLS_CALL => handle_tools_call(gateway, session_id, id, request.params).await,
        other => JsonRpcResponse::error(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        ),
    };

    Some(response)
}

/// The `initialize` result payload.
fn initialize_result() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// The `tools/list` result payload.
fn tools_list_result() -> Value {
    let tools: Vec<Value> = ToolDispatcher::tool_definitions()
        .iter()
        .map(|d| d.to_json())
        .collect();
    json!({ "tools": tools })
}

/// Dispatch a `tools/call` request for the calling session.
///
/// The caller identity is resolved from the session id the transport layer
/// threaded in; it is never guessed from other concurrently active sessions.
async fn handle_tools_call(
    gateway: &McpGateway,
    session_id: &str,
    id: Value,
    params: Option<Value>,
) -> JsonRpcResponse {
    let params = params.unwrap_or_else(|| json!({}));

    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return JsonRpcResponse::error(
            id,
            error_codes::INVALID_PARAMS,
            "Missing required parameter: name",
        );
    };

    let arguments = params.get("arguments").cloned();
    let caller = gateway.sessions().lookup(session_id);

    let result = gateway.dispatcher().dispatch(name, arguments, &caller).await;
    JsonRpcResponse::success(id, call_tool_result(result))
}

/// Wrap a dispatch outcome in the MCP `tools/call` result shape.
fn call_tool_result(result: ToolResult) -> Value {
    json!({
        "content": [
            { "type": "text", "text": result.text }
        ],
        "isError": result.is_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig, HttpConfig, SqlAuthMode};
    use crate::database::{ColumnDef, QueryResult, TableRef};
    use crate::error::ServerError;
    use crate::session::SessionIdentity;
    use crate::tools::SqlBackend;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct EmptyBackend;

    #[async_trait]
    impl SqlBackend for EmptyBackend {
        async fn run_select(&self, _query: &str) -> Result<QueryResult, ServerError> {
            Ok(QueryResult::default())
        }
        async fn list_tables(&self, _schemas: &[String]) -> Result<Vec<TableRef>, ServerError> {
            Ok(Vec::new())
        }
        async fn describe_table(&self, _table: &str) -> Result<Vec<ColumnDef>, ServerError> {
            Ok(Vec::new())
        }
    }

    fn test_gateway() -> McpGateway {
        let config = Config {
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "master".to_string(),
                auth: SqlAuthMode::Auto { client_id: None },
                encrypt: false,
                trust_server_certificate: true,
                connect_timeout: Duration::from_secs(5),
                application_name: "test".to_string(),
            },
            http: HttpConfig::default(),
        };
        McpGateway::with_backend(config, Arc::new(EmptyBackend))
    }

    fn request(method: &str, params: Option<Value>, id: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }

    #[tokio::test]
    async fn test_initialize_reports_protocol_and_server() {
        let gateway = test_gateway();
        let response = handle_request(&gateway, "s-1", request("initialize", None, Some(json!(1))))
            .await
            .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVICE_NAME);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_ping_returns_empty_result() {
        let gateway = test_gateway();
        let response = handle_request(&gateway, "s-1", request("ping", None, Some(json!(2))))
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_tools_list_advertises_three_tools() {
        let gateway = test_gateway();
        let response = handle_request(&gateway, "s-1", request("tools/list", None, Some(json!(3))))
            .await
            .unwrap();

        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 3);
        assert_eq!(tools[0]["name"], "read_data");
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let gateway = test_gateway();
        let response =
            handle_request(&gateway, "s-1", request("notifications/initialized", None, None)).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method_is_method_not_found() {
        let gateway = test_gateway();
        let response = handle_request(
            &gateway,
            "s-1",
            request("resources/list", None, Some(json!(4))),
        )
        .await
        .unwrap();

        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_call_requires_name() {
        let gateway = test_gateway();
        let response = handle_request(
            &gateway,
            "s-1",
            request("tools/call", Some(json!({})), Some(json!(5))),
        )
        .await
        .unwrap();

        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_call_uses_calling_session_identity() {
        let gateway = test_gateway();
        gateway.sessions().register(SessionIdentity::new(
            "s-agent",
            "api-key",
            Some("Data Agent".to_string()),
        ));
        gateway
            .sessions()
            .register(SessionIdentity::anonymous("s-other"));

        let response = handle_request(
            &gateway,
            "s-agent",
            request(
                "tools/call",
                Some(json!({"name": "list_table", "arguments": {}})),
                Some(json!(6)),
            ),
        )
        .await
        .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        let text = result["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["executedBy"], "Data Agent");
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version_rejected() {
        let gateway = test_gateway();
        let bad = JsonRpcRequest {
            jsonrpc: "1.0".to_string(),
            method: "ping".to_string(),
            params: None,
            id: Some(json!(7)),
        };
        let response = handle_request(&gateway, "s-1", bad).await.unwrap();
        assert_eq!(
            response.error.unwrap().code,
            error_codes::INVALID_REQUEST
        );
    }
}
