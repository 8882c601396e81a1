// Per-key bearer token cache with serialized refresh

use crate::auth::TokenProvider;
use crate::errors::AuthError;
use crate::models::{TenantCredentials, Token, TokenKey};
use crate::telemetry;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct TokenSlot {
    token: Option<Token>,
    /// Survives invalidation so generations keep increasing per key
    generation: u64,
}

/// Cache of bearer tokens keyed by tenant context and delegation.
///
/// Each key owns an async mutex. Generation and refresh for one key are
/// serialized while other keys proceed independently.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    slots: RwLock<HashMap<TokenKey, Arc<Mutex<TokenSlot>>>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, key: &TokenKey) -> Arc<Mutex<TokenSlot>> {
        if let Some(slot) = self.slots.read().await.get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    async fn generate(
        &self,
        key: &TokenKey,
        credentials: Option<&TenantCredentials>,
        slot: &mut TokenSlot,
    ) -> Result<Token, AuthError> {
        let access = self.provider.generate(key, credentials).await?;
        let issued_at = Utc::now();
        // A lifetime past the calendar's range is treated as no expiry
        let expires_at = access
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime));

        slot.generation += 1;
        let token = Token {
            access_token: access.access_token,
            key: key.clone(),
            generation: slot.generation,
            issued_at,
            expires_at,
        };
        slot.token = Some(token.clone());
        Ok(token)
    }

    /// Return the cached token for `key`, generating one if absent or expired
    #[tracing::instrument(skip(self, credentials), fields(key = %key))]
    pub async fn get_or_generate(
        &self,
        key: &TokenKey,
        credentials: Option<&TenantCredentials>,
    ) -> Result<Token, AuthError> {
        let slot = self.slot(key).await;
        let mut slot = slot.lock().await;

        if let Some(token) = slot.token.as_ref() {
            if !token.is_expired(Utc::now()) {
                return Ok(token.clone());
            }
            debug!(generation = token.generation, "Cached token expired");
        }

        let token = self.generate(key, credentials, &mut slot).await?;
        debug!(generation = token.generation, "Token generated");
        Ok(token)
    }

    /// Replace the token for `key` after it was rejected.
    ///
    /// `stale_generation` is the generation the caller was rejected with. If
    /// another task already refreshed past it, the newer token is returned
    /// without contacting the provider.
    #[tracing::instrument(skip(self, credentials), fields(key = %key))]
    pub async fn refresh(
        &self,
        key: &TokenKey,
        credentials: Option<&TenantCredentials>,
        stale_generation: u64,
    ) -> Result<Token, AuthError> {
        let slot = self.slot(key).await;
        let mut slot = slot.lock().await;

        if let Some(current) = slot.token.as_ref() {
            if current.generation > stale_generation {
                debug!(
                    generation = current.generation,
                    stale_generation, "Token already refreshed by another request"
                );
                return Ok(current.clone());
            }
        }

        slot.token = None;
        let token = self.generate(key, credentials, &mut slot).await?;
        telemetry::record_token_refresh(&key.tenant.to_string(), key.delegated);
        info!(generation = token.generation, "Token refreshed");
        Ok(token)
    }

    /// Drop the cached token for `key`, returning it
    pub async fn invalidate(&self, key: &TokenKey) -> Option<Token> {
        let slot = self.slots.read().await.get(key).cloned()?;
        let mut slot = slot.lock().await;
        slot.token.take()
    }

    /// Cached token for `key` without generating or checking expiry
    pub async fn peek(&self, key: &TokenKey) -> Option<Token> {
        let slot = self.slots.read().await.get(key).cloned()?;
        let slot = slot.lock().await;
        slot.token.clone()
    }

    /// Number of keys currently holding a token
    pub async fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.read().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.token.is_some() {
                count += 1;
            }
        }
        count
    }

    /// True when no key holds a token
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
