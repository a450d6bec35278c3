//! Shared database connection management with token-aware refresh.
//!
//! The gateway holds exactly one live connection process-wide. Every tool
//! dispatch acquires it through [`ConnectionManager::acquire`], which is
//! idempotent: if the held token still has more than the safety margin of
//! lifetime left, the existing connection is reused; otherwise a fresh token
//! is obtained and the connection is rebuilt before the guard is returned.
//!
//! The slot mutex is held across the refresh, so concurrent callers at
//! token-expiry time cannot race into duplicate reconnects - one refresh
//! proceeds and the rest await its completion.

use crate::config::DatabaseConfig;
use crate::constants::TOKEN_SAFETY_MARGIN_SECS;
use crate::database::credentials::{AccessToken, CredentialProvider, TokenSource};
use crate::error::ServerError;
use async_trait::async_trait;
use chrono::Utc;
use tiberius::{AuthMethod, Client, Config as TdsConfig, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// Type alias for a raw tiberius connection.
pub type RawConnection = Client<Compat<TcpStream>>;

/// Opens a database connection bound to a freshly acquired access token.
///
/// Seam for the connection manager: production uses [`TdsConnector`]; tests
/// substitute a stub to observe refresh behavior without a database.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection handle type produced by this connector.
    type Conn: Send + 'static;

    /// Acquire a token and open a connection authenticated with it.
    async fn open(&self) -> Result<(Self::Conn, AccessToken), ServerError>;
}

/// Production connector: Azure AD token + TDS handshake to SQL Server.
pub struct TdsConnector {
    config: DatabaseConfig,
    tokens: CredentialProvider,
}

impl TdsConnector {
    /// Create a connector for the given database configuration.
    pub fn new(config: DatabaseConfig) -> Self {
        let tokens = CredentialProvider::new(config.auth.clone());
        Self { config, tokens }
    }
}

/// Build the tiberius configuration for a connection attempt.
///
/// Sets host, port, database, encryption, certificate trust, and application
/// name, and authenticates with the given Azure AD token.
fn build_tds_config(db_config: &DatabaseConfig, token: &str) -> TdsConfig {
    let mut config = TdsConfig::new();

    config.host(&db_config.host);
    config.port(db_config.port);
    config.database(&db_config.database);

    if db_config.encrypt {
        config.encryption(EncryptionLevel::Required);
    } else {
        config.encryption(EncryptionLevel::Off);
    }

    if db_config.trust_server_certificate {
        config.trust_cert();
    }

    config.application_name(&db_config.application_name);
    config.authentication(AuthMethod::aad_token(token));

    config
}

#[async_trait]
impl Connector for TdsConnector {
    type Conn = RawConnection;

    async fn open(&self) -> Result<(Self::Conn, AccessToken), ServerError> {
        let token = self.tokens.acquire().await?;
        let tds_config = build_tds_config(&self.config, &token.token);

        let address = format!("{}:{}", self.config.host, self.config.port);
        debug!("Creating connection to {address}");

        let timeout = self.config.connect_timeout;
        let client = tokio::time::timeout(timeout, async {
            let tcp = TcpStream::connect(&address).await.map_err(|e| {
                ServerError::connection(format!("Failed to connect to {address}: {e}"))
            })?;

            tcp.set_nodelay(true)
                .map_err(|e| ServerError::connection(format!("Failed to set TCP_NODELAY: {e}")))?;

            // TDS handshake
            Client::connect(tds_config, tcp.compat_write())
                .await
                .map_err(|e| {
                    ServerError::connection(format!("Failed to connect to SQL Server: {e}"))
                })
        })
        .await
        .map_err(|_| ServerError::timeout(timeout.as_secs()))??;

        debug!("Connection established successfully");
        Ok((client, token))
    }
}

/// A live connection paired with the token it was opened with.
struct Live<C> {
    conn: C,
    token: AccessToken,
}

/// Owner of the single shared database connection.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    margin_secs: i64,
    slot: Mutex<Option<Live<C::Conn>>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager with the default 2-minute token safety margin.
    pub fn new(connector: C) -> Self {
        Self::with_margin(connector, TOKEN_SAFETY_MARGIN_SECS)
    }

    /// Create a manager with an explicit safety margin in seconds.
    pub fn with_margin(connector: C, margin_secs: i64) -> Self {
        Self {
            connector,
            margin_secs,
            slot: Mutex::new(None),
        }
    }

    /// Acquire the shared connection, refreshing it first if its token is
    /// within the safety margin of expiry.
    ///
    /// Safe to call before every dispatch: a live connection with a fresh
    /// token makes this a no-op apart from the lock. The returned guard
    /// holds the slot mutex, so queries on the shared connection serialize.
    pub async fn acquire(&self) -> Result<ConnectionGuard<'_, C>, ServerError> {
        let mut slot = self.slot.lock().await;

        let usable = matches!(
            slot.as_ref(),
            Some(live) if live.token.is_fresh(Utc::now(), self.margin_secs)
        );

        if !usable {
            if slot.is_some() {
                debug!("access token within safety margin of expiry, reconnecting");
            }
            // Drop the stale connection before the new handshake so at most
            // one live connection exists at any time.
            *slot = None;

            let (conn, token) = self.connector.open().await?;
            info!(expires_on = %token.expires_on, "database connection established");
            *slot = Some(Live { conn, token });
        }

        Ok(ConnectionGuard { slot })
    }

    /// Drop the cached connection so the next acquire reconnects.
    ///
    /// Called when query execution reports the connection itself is broken.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            debug!("cached connection invalidated");
        }
    }
}

/// Exclusive access to the live connection for the duration of one call.
pub struct ConnectionGuard<'a, C: Connector> {
    slot: MutexGuard<'a, Option<Live<C::Conn>>>,
}

impl<C: Connector> ConnectionGuard<'_, C> {
    /// The live connection handle.
    pub fn client(&mut self) -> &mut C::Conn {
        // A guard is only constructed after the slot is populated.
        &mut self
            .slot
            .as_mut()
            .expect("connection slot populated while guard is held")
            .conn
    }

    /// The token the connection was opened with.
    pub fn token(&self) -> &AccessToken {
        &self
            .slot
            .as_ref()
            .expect("connection slot populated while guard is held")
            .token
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionGuard<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Connector stub handing out tokens with scripted expiries.
    struct StubConnector {
        opens: AtomicUsize,
        expiries: SyncMutex<VecDeque<DateTime<Utc>>>,
    }

    impl StubConnector {
        fn new(expiries: Vec<DateTime<Utc>>) -> Self {
            Self {
                opens: AtomicUsize::new(0),
                expiries: SyncMutex::new(expiries.into()),
            }
        }

        fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for StubConnector {
        type Conn = u32;

        async fn open(&self) -> Result<(Self::Conn, AccessToken), ServerError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst) as u32;
            let expires_on = self
                .expiries
                .lock()
                .pop_front()
                .unwrap_or_else(|| Utc::now() + Duration::hours(1));
            Ok((
                n,
                AccessToken {
                    token: format!("token-{n}"),
                    expires_on,
                },
            ))
        }
    }

    /// Connector stub that always fails.
    struct FailingConnector;

    #[async_trait]
    impl Connector for FailingConnector {
        type Conn = u32;

        async fn open(&self) -> Result<(Self::Conn, AccessToken), ServerError> {
            Err(ServerError::auth("identity provider unreachable"))
        }
    }

    #[tokio::test]
    async fn test_repeated_acquires_reuse_one_connection() {
        let connector = StubConnector::new(vec![Utc::now() + Duration::hours(1)]);
        let manager = ConnectionManager::new(connector);

        for _ in 0..5 {
            let guard = manager.acquire().await.unwrap();
            drop(guard);
        }

        assert_eq!(manager.connector.open_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_token_triggers_exactly_one_reconnect() {
        // First token lands inside the 120s safety margin; second is fresh.
        let connector = StubConnector::new(vec![
            Utc::now() + Duration::seconds(60),
            Utc::now() + Duration::hours(1),
        ]);
        let manager = ConnectionManager::new(connector);

        drop(manager.acquire().await.unwrap());
        drop(manager.acquire().await.unwrap());
        drop(manager.acquire().await.unwrap());

        assert_eq!(manager.connector.open_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_do_not_duplicate_connects() {
        let connector = StubConnector::new(vec![Utc::now() + Duration::hours(1)]);
        let manager = Arc::new(ConnectionManager::new(connector));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let guard = manager.acquire().await.unwrap();
                    drop(guard);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(manager.connector.open_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reconnect() {
        let connector = StubConnector::new(vec![
            Utc::now() + Duration::hours(1),
            Utc::now() + Duration::hours(1),
        ]);
        let manager = ConnectionManager::new(connector);

        drop(manager.acquire().await.unwrap());
        manager.invalidate().await;
        drop(manager.acquire().await.unwrap());

        assert_eq!(manager.connector.open_count(), 2);
    }

    #[tokio::test]
    async fn test_open_failure_propagates_and_next_acquire_retries() {
        let manager = ConnectionManager::new(FailingConnector);

        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, ServerError::Authentication(_)));

        // The slot stays empty; a later acquire attempts a fresh open.
        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, ServerError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_guard_exposes_connection_and_token() {
        let connector = StubConnector::new(vec![Utc::now() + Duration::hours(1)]);
        let manager = ConnectionManager::new(connector);

        let mut guard = manager.acquire().await.unwrap();
        assert_eq!(*guard.client(), 0);
        assert_eq!(guard.token().token, "token-0");
    }
}
