//! Azure AD credential acquisition for SQL Server connections.
//!
//! This module provides token acquisition for the outbound database
//! connection, supporting:
//! - Managed identity (system-assigned or user-assigned)
//! - Service principal with client credentials
//! - Auto mode: managed identity first, then the operator's Azure CLI login
//!
//! The strategy is an explicit [`SqlAuthMode`] passed by value; acquisition
//! never reads or mutates process environment state, so inbound OAuth
//! configuration cannot contaminate outbound credentials.

use crate::config::SqlAuthMode;
use crate::error::ServerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

/// SQL Server resource URI for Azure AD token acquisition.
/// This is the standard resource URI for Azure SQL Database.
pub const AZURE_SQL_RESOURCE: &str = "https://database.windows.net/";

/// An Azure AD access token with its expiry.
///
/// Owned by the connection manager and replaced wholesale on refresh, never
/// mutated in place.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// The bearer token presented to SQL Server.
    pub token: String,

    /// Absolute expiry time.
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Check whether the token has more than `margin_secs` of lifetime left
    /// at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        (self.expires_on - now).num_seconds() > margin_secs
    }
}

/// Source of Azure AD access tokens for the database connection.
///
/// The connection manager depends on this seam rather than on the Azure SDK
/// directly, so refresh behavior is testable without an identity provider.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Acquire a fresh access token.
    ///
    /// Failures are fatal to the current connection attempt; no retries
    /// happen here beyond what the identity platform itself performs.
    async fn acquire(&self) -> Result<AccessToken, ServerError>;
}

/// Credential provider selecting a strategy by configuration.
pub struct CredentialProvider {
    mode: SqlAuthMode,
}

impl CredentialProvider {
    /// Create a provider for the given strategy.
    pub fn new(mode: SqlAuthMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl TokenSource for CredentialProvider {
    async fn acquire(&self) -> Result<AccessToken, ServerError> {
        match &self.mode {
            SqlAuthMode::ManagedIdentity { client_id } => {
                managed_identity_token(client_id.as_deref()).await
            }
            SqlAuthMode::ServicePrincipal {
                tenant_id,
                client_id,
                client_secret,
            } => service_principal_token(tenant_id, client_id, client_secret).await,
            SqlAuthMode::Auto { client_id } => {
                match managed_identity_token(client_id.as_deref()).await {
                    Ok(token) => Ok(token),
                    Err(e) => {
                        debug!("managed identity unavailable ({e}), falling back to Azure CLI");
                        cli_token().await
                    }
                }
            }
        }
    }
}

/// Acquire a token from the instance metadata service (managed identity).
async fn managed_identity_token(client_id: Option<&str>) -> Result<AccessToken, ServerError> {
    use azure_core::auth::TokenCredential;
    use azure_identity::ImdsManagedIdentityCredential;

    debug!(
        "Acquiring managed identity token{}",
        client_id
            .map(|id| format!(" for client_id: {}", &id[..8.min(id.len())]))
            .unwrap_or_default()
    );

    let credential = match client_id {
        Some(id) => ImdsManagedIdentityCredential::default().with_client_id(id.to_string()),
        None => ImdsManagedIdentityCredential::default(),
    };

    let token_response = credential.get_token(&[AZURE_SQL_RESOURCE]).await.map_err(|e| {
        ServerError::auth(format!("Failed to acquire managed identity token: {e}"))
    })?;

    debug!("Managed identity token acquired successfully");
    convert_token(token_response)
}

/// Acquire a token using the client credentials flow (service principal).
async fn service_principal_token(
    tenant_id: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<AccessToken, ServerError> {
    use azure_core::auth::TokenCredential;
    use azure_identity::{ClientSecretCredential, TokenCredentialOptions};

    debug!(
        "Acquiring service principal token for client_id: {}",
        &client_id[..8.min(client_id.len())]
    );

    // Validate that the tenant produces a well-formed Azure AD authority URL
    // before attempting token acquisition. The credential itself constructs
    // the endpoint from the tenant id and the public-cloud authority host.
    let _authority_host: azure_core::Url =
        format!("https://login.microsoftonline.com/{tenant_id}")
            .parse()
            .map_err(|e| ServerError::auth(format!("Invalid tenant ID URL: {e}")))?;

    let http_client = azure_core::new_http_client();

    let credential = ClientSecretCredential::new(
        http_client,
        tenant_id.to_string(),
        client_id.to_string(),
        client_secret.to_string(),
        TokenCredentialOptions::default(),
    );

    let token_response = credential.get_token(&[AZURE_SQL_RESOURCE]).await.map_err(|e| {
        ServerError::auth(format!("Failed to acquire service principal token: {e}"))
    })?;

    debug!("Service principal token acquired successfully");
    convert_token(token_response)
}

/// Acquire a token from the operator's Azure CLI login.
async fn cli_token() -> Result<AccessToken, ServerError> {
    use azure_core::auth::TokenCredential;
    use azure_identity::AzureCliCredential;

    debug!("Acquiring token from Azure CLI login");

    let credential = AzureCliCredential::new();
    let token_response = credential.get_token(&[AZURE_SQL_RESOURCE]).await.map_err(|e| {
        ServerError::auth(format!(
            "Failed to acquire token from Azure CLI (is 'az login' current?): {e}"
        ))
    })?;

    debug!("Azure CLI token acquired successfully");
    convert_token(token_response)
}

/// Convert the SDK token response into the gateway's [`AccessToken`].
fn convert_token(response: azure_core::auth::AccessToken) -> Result<AccessToken, ServerError> {
    let expires_on = DateTime::<Utc>::from_timestamp(response.expires_on.unix_timestamp(), 0)
        .ok_or_else(|| ServerError::auth("Token expiry timestamp out of range"))?;

    Ok(AccessToken {
        token: response.token.secret().to_string(),
        expires_on,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_expiring_in(secs: i64) -> AccessToken {
        AccessToken {
            token: "tok".to_string(),
            expires_on: Utc::now() + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_token_fresh_outside_margin() {
        let token = token_expiring_in(3600);
        assert!(token.is_fresh(Utc::now(), 120));
    }

    #[test]
    fn test_token_stale_within_margin() {
        let token = token_expiring_in(60);
        assert!(!token.is_fresh(Utc::now(), 120));
    }

    #[test]
    fn test_expired_token_is_stale() {
        let token = token_expiring_in(-10);
        assert!(!token.is_fresh(Utc::now(), 120));
    }

    #[test]
    fn test_margin_boundary() {
        let now = Utc::now();
        let token = AccessToken {
            token: "tok".to_string(),
            expires_on: now + Duration::seconds(120),
        };
        // Exactly at the margin is not "more than" the margin.
        assert!(!token.is_fresh(now, 120));
        assert!(token.is_fresh(now, 119));
    }
}
