// Bearer token acquisition for the source and cross-tenant contexts

use crate::config::GraphConfig;
use crate::errors::AuthError;
use crate::models::{TenantContext, TenantCredentials, TokenKey};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Token as returned by an authority, before it is cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    /// Lifetime in seconds, when the authority reports one
    pub expires_in: Option<u64>,
}

/// Source of fresh bearer tokens for a cache key
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Generate a new token for `key`.
    ///
    /// `credentials` carries the cross-tenant details of the request; it is
    /// None for the source tenant.
    async fn generate(
        &self,
        key: &TokenKey,
        credentials: Option<&TenantCredentials>,
    ) -> Result<AccessToken, AuthError>;
}

/// OAuth2 provider against a Microsoft identity style authority.
///
/// Application tokens use the client credentials grant, delegated tokens the
/// resource owner password grant.
pub struct OAuth2TokenProvider {
    client: Client,
    authority_url: String,
    scope: String,
    source: TenantCredentials,
}

impl OAuth2TokenProvider {
    /// Provider for the configured authority, with a default HTTP client
    pub fn new(config: &GraphConfig) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &GraphConfig) -> Self {
        Self {
            client,
            authority_url: config.authority_url.trim_end_matches('/').to_string(),
            scope: config.scope.clone(),
            source: TenantCredentials {
                tenant_id: config.tenant_id.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
            },
        }
    }

    fn token_url(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_url, tenant_id)
    }

    fn credentials_for<'a>(
        &'a self,
        key: &TokenKey,
        credentials: Option<&'a TenantCredentials>,
    ) -> Result<&'a TenantCredentials, AuthError> {
        match &key.tenant {
            TenantContext::Source => {
                if self.source.tenant_id.is_empty() {
                    return Err(AuthError::MissingCredentials("source".to_string()));
                }
                Ok(&self.source)
            }
            TenantContext::CrossTenant(tenant_id) => credentials
                .filter(|details| &details.tenant_id == tenant_id)
                .ok_or_else(|| AuthError::MissingCredentials(tenant_id.clone())),
        }
    }

    #[tracing::instrument(skip(self, params))]
    async fn request_token(
        &self,
        tenant_id: &str,
        params: &[(&str, &str)],
    ) -> Result<AccessToken, AuthError> {
        let response = self
            .client
            .post(self.token_url(tenant_id))
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenRequestFailed { status, body });
        }

        let token_response: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let access_token = token_response
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(AuthError::MissingAccessToken)?;

        // Some authorities report expires_in as a string
        let expires_in = token_response.get("expires_in").and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        });

        Ok(AccessToken {
            access_token,
            expires_in,
        })
    }
}

#[async_trait]
impl TokenProvider for OAuth2TokenProvider {
    #[tracing::instrument(skip(self, credentials), fields(key = %key))]
    async fn generate(
        &self,
        key: &TokenKey,
        credentials: Option<&TenantCredentials>,
    ) -> Result<AccessToken, AuthError> {
        let tenant = self.credentials_for(key, credentials)?;

        if key.delegated {
            let (username, password) = match (&tenant.username, &tenant.password) {
                (Some(username), Some(password)) => (username.as_str(), password.as_str()),
                _ => {
                    return Err(AuthError::MissingDelegatedCredentials(
                        tenant.tenant_id.clone(),
                    ))
                }
            };
            tracing::debug!(tenant_id = %tenant.tenant_id, "Requesting delegated token");
            let params = [
                ("grant_type", "password"),
                ("client_id", tenant.client_id.as_str()),
                ("client_secret", tenant.client_secret.as_str()),
                ("scope", self.scope.as_str()),
                ("username", username),
                ("password", password),
            ];
            self.request_token(&tenant.tenant_id, &params).await
        } else {
            tracing::debug!(tenant_id = %tenant.tenant_id, "Requesting application token");
            let params = [
                ("grant_type", "client_credentials"),
                ("client_id", tenant.client_id.as_str()),
                ("client_secret", tenant.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ];
            self.request_token(&tenant.tenant_id, &params).await
        }
    }
}
