//! Gateway assembly: configuration, SQL backend, dispatcher, and sessions.

use crate::config::Config;
use crate::database::{
    metadata, query, ColumnDef, ConnectionManager, QueryResult, TableRef, TdsConnector,
};
use crate::error::ServerError;
use crate::session::SessionRegistry;
use crate::tools::{SqlBackend, ToolDispatcher};
use async_trait::async_trait;
use std::sync::Arc;

/// [`SqlBackend`] implementation over the shared token-aware connection.
///
/// Each operation acquires the connection (refreshing it when the token is
/// near expiry), runs its SQL, and releases the guard. When execution
/// reports the connection itself broke, the cached handle is dropped so the
/// next call reconnects instead of failing against it.
pub struct SqlGateway {
    connections: ConnectionManager<TdsConnector>,
}

impl SqlGateway {
    /// Create a backend for the configured database.
    pub fn new(config: crate::config::DatabaseConfig) -> Self {
        Self {
            connections: ConnectionManager::new(TdsConnector::new(config)),
        }
    }

    async fn recover_if_fatal(&self, error: &ServerError) {
        if error.is_connection_fatal() {
            self.connections.invalidate().await;
        }
    }
}

#[async_trait]
impl SqlBackend for SqlGateway {
    async fn run_select(&self, select: &str) -> Result<QueryResult, ServerError> {
        let mut guard = self.connections.acquire().await?;
        let result = query::run_select(guard.client(), select).await;
        drop(guard);

        if let Err(e) = &result {
            self.recover_if_fatal(e).await;
        }
        result
    }

    async fn list_tables(&self, schemas: &[String]) -> Result<Vec<TableRef>, ServerError> {
        let mut guard = self.connections.acquire().await?;
        let result = metadata::list_tables(guard.client(), schemas).await;
        drop(guard);

        if let Err(e) = &result {
            self.recover_if_fatal(e).await;
        }
        result
    }

    async fn describe_table(&self, table_name: &str) -> Result<Vec<ColumnDef>, ServerError> {
        let mut guard = self.connections.acquire().await?;
        let result = metadata::describe_table(guard.client(), table_name).await;
        drop(guard);

        if let Err(e) = &result {
            self.recover_if_fatal(e).await;
        }
        result
    }
}

/// The gateway instance shared by both transport front-ends.
///
/// Holds the configuration, the session registry, and the tool dispatcher
/// over the single shared database connection. The connection itself opens
/// lazily on the first tool call.
pub struct McpGateway {
    config: Arc<Config>,
    sessions: Arc<SessionRegistry>,
    dispatcher: Arc<ToolDispatcher>,
}

impl McpGateway {
    /// Create a gateway backed by the configured Azure SQL database.
    pub fn new(config: Config) -> Self {
        let backend = Arc::new(SqlGateway::new(config.database.clone()));
        Self::with_backend(config, backend)
    }

    /// Create a gateway over an explicit SQL backend.
    ///
    /// Used by tests and by embedders that substitute their own backend.
    pub fn with_backend(config: Config, backend: Arc<dyn SqlBackend>) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new()),
            dispatcher: Arc::new(ToolDispatcher::new(backend)),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Get a reference to the tool dispatcher.
    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }
}
