//! Configuration management for the Azure SQL MCP Gateway.
//!
//! Configuration is loaded from environment variables following the 12-factor
//! app pattern. Credential strategy is an explicit enum carried by value into
//! the credential provider; the process environment is read once at startup
//! and never mutated afterwards.

use crate::constants::{
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT,
    DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_SECS, DEFAULT_SQL_PORT,
    SERVICE_NAME,
};
use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection configuration
    pub database: DatabaseConfig,

    /// HTTP transport configuration
    pub http: HttpConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQL Server hostname, e.g. `myserver.database.windows.net`
    pub host: String,

    /// SQL Server port (default: 1433)
    pub port: u16,

    /// Database name
    pub database: String,

    /// Azure AD credential strategy
    pub auth: SqlAuthMode,

    /// Enable TLS encryption (default: true; Azure SQL requires it)
    pub encrypt: bool,

    /// Trust server certificate (for self-signed certs)
    pub trust_server_certificate: bool,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Application name sent to SQL Server
    pub application_name: String,
}

/// Azure AD credential strategy for outbound database access.
///
/// This replaces the source design's modal environment-variable handling:
/// the strategy and its parameters are resolved once at startup and passed
/// by value, so token acquisition never inspects or mutates process state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SqlAuthMode {
    /// Try managed identity first, then the operator's Azure CLI login.
    Auto {
        /// User-assigned managed identity client id, if any.
        client_id: Option<String>,
    },

    /// Platform-issued managed identity only.
    ManagedIdentity {
        /// User-assigned managed identity client id, if any.
        client_id: Option<String>,
    },

    /// Service principal with client secret.
    ServicePrincipal {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// API key required on all non-health endpoints.
    ///
    /// When unset, authentication is bypassed and every caller is treated as
    /// anonymous. This is an operational footgun kept for parity with the
    /// deployment layer, which always provisions a key in production.
    pub api_key: Option<String>,

    /// Display name recorded for callers presenting the API key.
    pub api_key_principal: Option<String>,

    /// Allowed origins for CORS (empty means all).
    pub cors_origins: Vec<String>,

    /// Enable per-IP rate limiting.
    pub rate_limit_enabled: bool,

    /// Request budget per caller IP per window.
    pub rate_limit_max_requests: u32,

    /// Rate limit window.
    pub rate_limit_window: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Required
    /// - `MSSQL_HOST`: SQL Server hostname
    /// - `MSSQL_DATABASE`: Database name
    ///
    /// ## Optional
    /// - `MSSQL_PORT`: Port number (default: 1433)
    /// - `MSSQL_AUTH_MODE`: `auto` (default), `managed-identity`, `service-principal`
    /// - `MSSQL_AZURE_CLIENT_ID`: User-assigned identity or service principal client id
    /// - `MSSQL_AZURE_TENANT_ID`: Tenant id (service principal only)
    /// - `MSSQL_AZURE_CLIENT_SECRET`: Client secret (service principal only)
    /// - `MSSQL_ENCRYPT`: Enable TLS (default: true)
    /// - `MSSQL_TRUST_CERT`: Trust server certificate (default: false)
    /// - `MSSQL_CONNECT_TIMEOUT`: Connection timeout in seconds (default: 30)
    /// - `MSSQL_HTTP_HOST`: HTTP bind address (default: 0.0.0.0)
    /// - `MSSQL_HTTP_PORT`: HTTP port (default: 3000)
    /// - `MSSQL_API_KEY`: API key for inbound authentication
    /// - `MSSQL_API_KEY_PRINCIPAL`: Display name for API-key callers
    /// - `MSSQL_HTTP_CORS_ORIGINS`: Comma-separated origin allow-list
    /// - `MSSQL_HTTP_RATE_LIMIT`: Enable rate limiting (default: false)
    /// - `MSSQL_HTTP_RATE_LIMIT_MAX`: Requests per window (default: 100)
    /// - `MSSQL_HTTP_RATE_LIMIT_WINDOW`: Window in seconds (default: 60)
    pub fn from_env() -> Result<Self, ServerError> {
        let host = std::env::var("MSSQL_HOST")
            .map_err(|_| ServerError::config("MSSQL_HOST environment variable is required"))?;

        let database = std::env::var("MSSQL_DATABASE")
            .map_err(|_| ServerError::config("MSSQL_DATABASE environment variable is required"))?;

        let auth = Self::auth_mode_from_env()?;

        let port = std::env::var("MSSQL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_SQL_PORT);

        let encrypt = std::env::var("MSSQL_ENCRYPT")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(true);

        let trust_server_certificate = std::env::var("MSSQL_TRUST_CERT")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let connect_timeout_secs = std::env::var("MSSQL_CONNECT_TIMEOUT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS);

        Ok(Config {
            database: DatabaseConfig {
                host,
                port,
                database,
                auth,
                encrypt,
                trust_server_certificate,
                connect_timeout: Duration::from_secs(connect_timeout_secs),
                application_name: SERVICE_NAME.to_string(),
            },
            http: HttpConfig::from_env(),
        })
    }

    fn auth_mode_from_env() -> Result<SqlAuthMode, ServerError> {
        let mode = std::env::var("MSSQL_AUTH_MODE")
            .ok()
            .map(|s| s.to_lowercase());

        let client_id = std::env::var("MSSQL_AZURE_CLIENT_ID").ok();

        match mode.as_deref() {
            None | Some("auto") => Ok(SqlAuthMode::Auto { client_id }),
            Some("managed-identity") | Some("managed_identity") | Some("mi") => {
                Ok(SqlAuthMode::ManagedIdentity { client_id })
            }
            Some("service-principal") | Some("service_principal") | Some("sp") => {
                let client_id = client_id.ok_or_else(|| {
                    ServerError::config(
                        "MSSQL_AZURE_CLIENT_ID is required for service principal authentication",
                    )
                })?;
                let tenant_id = std::env::var("MSSQL_AZURE_TENANT_ID").map_err(|_| {
                    ServerError::config(
                        "MSSQL_AZURE_TENANT_ID is required for service principal authentication",
                    )
                })?;
                let client_secret = std::env::var("MSSQL_AZURE_CLIENT_SECRET").map_err(|_| {
                    ServerError::config(
                        "MSSQL_AZURE_CLIENT_SECRET is required for service principal authentication",
                    )
                })?;
                Ok(SqlAuthMode::ServicePrincipal {
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            Some(other) => Err(ServerError::config(format!(
                "Unknown MSSQL_AUTH_MODE '{other}' (expected auto, managed-identity, or service-principal)"
            ))),
        }
    }
}

impl HttpConfig {
    /// Create HTTP configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("MSSQL_HTTP_HOST") {
            config.host = host;
        }

        if let Ok(port) = std::env::var("MSSQL_HTTP_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        config.api_key = std::env::var("MSSQL_API_KEY").ok().filter(|k| !k.is_empty());
        config.api_key_principal = std::env::var("MSSQL_API_KEY_PRINCIPAL").ok();

        if let Ok(origins) = std::env::var("MSSQL_HTTP_CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(rate_limit) = std::env::var("MSSQL_HTTP_RATE_LIMIT") {
            config.rate_limit_enabled = rate_limit.to_lowercase() == "true" || rate_limit == "1";
        }

        if let Ok(max) = std::env::var("MSSQL_HTTP_RATE_LIMIT_MAX") {
            if let Ok(m) = max.parse() {
                config.rate_limit_max_requests = m;
            }
        }

        if let Ok(window) = std::env::var("MSSQL_HTTP_RATE_LIMIT_WINDOW") {
            if let Ok(w) = window.parse() {
                config.rate_limit_window = Duration::from_secs(w);
            }
        }

        config
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            api_key: None,
            api_key_principal: None,
            cors_origins: Vec::new(),
            rate_limit_enabled: false,
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "MSSQL_HOST",
            "MSSQL_PORT",
            "MSSQL_DATABASE",
            "MSSQL_AUTH_MODE",
            "MSSQL_AZURE_CLIENT_ID",
            "MSSQL_AZURE_TENANT_ID",
            "MSSQL_AZURE_CLIENT_SECRET",
            "MSSQL_ENCRYPT",
            "MSSQL_TRUST_CERT",
            "MSSQL_CONNECT_TIMEOUT",
            "MSSQL_HTTP_HOST",
            "MSSQL_HTTP_PORT",
            "MSSQL_API_KEY",
            "MSSQL_API_KEY_PRINCIPAL",
            "MSSQL_HTTP_CORS_ORIGINS",
            "MSSQL_HTTP_RATE_LIMIT",
            "MSSQL_HTTP_RATE_LIMIT_MAX",
            "MSSQL_HTTP_RATE_LIMIT_WINDOW",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_minimal_config_defaults_to_auto() {
        clear_env();
        std::env::set_var("MSSQL_HOST", "example.database.windows.net");
        std::env::set_var("MSSQL_DATABASE", "adventureworks");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database.port, 1433);
        assert!(config.database.encrypt);
        assert!(!config.database.trust_server_certificate);
        assert!(matches!(
            config.database.auth,
            SqlAuthMode::Auto { client_id: None }
        ));
        assert_eq!(config.database.connect_timeout, Duration::from_secs(30));
        assert!(config.http.api_key.is_none());
        assert!(!config.http.rate_limit_enabled);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_host_fails() {
        clear_env();
        std::env::set_var("MSSQL_DATABASE", "adventureworks");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_service_principal_requires_credentials() {
        clear_env();
        std::env::set_var("MSSQL_HOST", "example.database.windows.net");
        std::env::set_var("MSSQL_DATABASE", "adventureworks");
        std::env::set_var("MSSQL_AUTH_MODE", "service-principal");
        assert!(Config::from_env().is_err());

        std::env::set_var("MSSQL_AZURE_CLIENT_ID", "client");
        std::env::set_var("MSSQL_AZURE_TENANT_ID", "tenant");
        std::env::set_var("MSSQL_AZURE_CLIENT_SECRET", "secret");
        let config = Config::from_env().unwrap();
        assert!(matches!(
            config.database.auth,
            SqlAuthMode::ServicePrincipal { .. }
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_managed_identity_with_client_id() {
        clear_env();
        std::env::set_var("MSSQL_HOST", "example.database.windows.net");
        std::env::set_var("MSSQL_DATABASE", "adventureworks");
        std::env::set_var("MSSQL_AUTH_MODE", "managed-identity");
        std::env::set_var("MSSQL_AZURE_CLIENT_ID", "11111111-2222-3333-4444-555555555555");

        let config = Config::from_env().unwrap();
        match config.database.auth {
            SqlAuthMode::ManagedIdentity { client_id } => {
                assert_eq!(
                    client_id.as_deref(),
                    Some("11111111-2222-3333-4444-555555555555")
                );
            }
            other => panic!("unexpected auth mode: {other:?}"),
        }
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_auth_mode_rejected() {
        clear_env();
        std::env::set_var("MSSQL_HOST", "example.database.windows.net");
        std::env::set_var("MSSQL_DATABASE", "adventureworks");
        std::env::set_var("MSSQL_AUTH_MODE", "kerberos");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_http_config_from_env() {
        clear_env();
        std::env::set_var("MSSQL_HTTP_PORT", "8080");
        std::env::set_var("MSSQL_API_KEY", "s3cret");
        std::env::set_var("MSSQL_HTTP_CORS_ORIGINS", "https://a.example, https://b.example");
        std::env::set_var("MSSQL_HTTP_RATE_LIMIT", "true");
        std::env::set_var("MSSQL_HTTP_RATE_LIMIT_MAX", "5");

        let http = HttpConfig::from_env();
        assert_eq!(http.port, 8080);
        assert_eq!(http.api_key.as_deref(), Some("s3cret"));
        assert_eq!(http.cors_origins.len(), 2);
        assert!(http.rate_limit_enabled);
        assert_eq!(http.rate_limit_max_requests, 5);
        assert_eq!(http.rate_limit_window, Duration::from_secs(60));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_empty_api_key_is_ignored() {
        clear_env();
        std::env::set_var("MSSQL_API_KEY", "");
        let http = HttpConfig::from_env();
        assert!(http.api_key.is_none());
        clear_env();
    }
}
