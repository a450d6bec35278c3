//! JSON-RPC 2.0 envelope types for the MCP wire protocol.
//!
//! Both transport front-ends speak the same envelope; only the framing
//! differs (SSE event stream vs. plain HTTP bodies).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error codes used by the gateway.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Transport session missing, unknown, or expired.
    pub const SESSION_ERROR: i32 = -32000;
}

/// MCP method names handled by the gateway.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// An incoming JSON-RPC request or notification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// Notifications carry no id and receive no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Whether this request opens an MCP session.
    pub fn is_initialize(&self) -> bool {
        self.method == methods::INITIALIZE
    }
}

/// An outgoing JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Build an error response.
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }
}

/// The error envelope returned for transport-session failures:
/// `{"jsonrpc":"2.0","error":{"code":-32000,"message":...},"id":null}`.
pub fn session_error_envelope(message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse::error(Value::Null, error_codes::SESSION_ERROR, message)
}
