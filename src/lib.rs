//! # Azure SQL MCP Gateway
//!
//! A thin Model Context Protocol (MCP) server exposing three read-oriented
//! SQL operations to AI agent runtimes over HTTP:
//!
//! - **Tools**: `read_data` (SELECT execution), `list_table` (schema-qualified
//!   table listing), `describe_table` (column metadata)
//! - **Transports**: legacy SSE (`/sse`) and StreamableHTTP (`/mcp`), both
//!   multiplexing many client sessions onto one dispatcher
//! - **Connection**: a single shared SQL connection authenticated with Azure
//!   AD access tokens, refreshed before the token's safety margin elapses
//!
//! ## Architecture
//!
//! Transport front-ends resolve a session id and caller identity, then hand
//! JSON-RPC messages to the shared handler; the tool dispatcher validates
//! typed inputs, ensures the connection is live, executes, and wraps results
//! in an audit envelope.

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod security;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::ServerError;
pub use server::McpGateway;
