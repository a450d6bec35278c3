//! Azure SQL MCP Gateway entry point.
//!
//! Starts the HTTP server hosting both MCP transports. The database
//! connection opens lazily on the first tool call, so startup succeeds even
//! while the database is still provisioning.

use anyhow::Result;
use azure_sql_mcp_gateway::{transport, Config, McpGateway};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let version = env!("CARGO_PKG_VERSION");
    info!("Azure SQL MCP Gateway v{version} starting");

    let config = Config::from_env()?;
    info!(
        server = %config.database.host,
        database = %config.database.database,
        "configuration loaded"
    );

    if config.http.api_key.is_none() {
        warn!("no API key configured; all callers will be treated as anonymous");
    }

    let gateway = McpGateway::new(config);
    transport::serve(gateway).await
}

/// Initialize the tracing subscriber from `RUST_LOG`.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("info,azure_sql_mcp_gateway=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
