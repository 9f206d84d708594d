use std::{fmt, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    clock::{Clock, SystemClock},
    TokenProvider,
};

/// Caches the provider's token until it expires.
///
/// The cache lock is held while a new token is fetched, so callers that find the
/// token stale at the same time share a single acquisition.
pub struct TokenManager<Provider>
where
    Provider: TokenProvider,
{
    provider: Provider,
    clock: Arc<dyn Clock>,
    cached_token: Mutex<Option<Record>>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error<RenewalError> {
    #[error("token provider: {0}")]
    Provider(#[source] RenewalError),
}

#[derive(Clone)]
pub struct Record {
    pub access_token: String,
    /// Milliseconds since the Unix epoch.
    pub expires_at: u64,
}

impl Record {
    pub fn from_expiring_token<T: super::ExpiringToken>(token: T, now: u64) -> Self {
        Self {
            access_token: token.access_token().to_owned(),
            expires_at: now.saturating_add(token.expires_in().saturating_mul(1000)),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl super::Token for Record {
    fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl<Provider> TokenManager<Provider>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Token: super::ExpiringToken,
{
    pub fn new(provider: Provider) -> Self {
        Self::with_clock(provider, Arc::new(SystemClock))
    }

    pub fn with_clock(provider: Provider, clock: Arc<dyn Clock>) -> Self {
        let cached_token = Mutex::const_new(None);
        Self {
            provider,
            clock,
            cached_token,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    async fn fetch_new_token(&self) -> Result<Record, Error<Provider::Error>> {
        let token = self
            .provider
            .get_auth_token()
            .await
            .map_err(Error::Provider)?;
        let record = Record::from_expiring_token(token, self.clock.now_millis());
        Ok(record)
    }

    pub async fn get_token(&self) -> Result<Record, Error<Provider::Error>> {
        let mut cached_token = self.cached_token.lock().await;

        if let Some(cached_token) = &*cached_token {
            if !cached_token.is_expired(self.clock.now_millis()) {
                debug!(message = "Using preexisting token", token_expires_at = cached_token.expires_at);
                return Ok(cached_token.clone());
            }
            debug!(message = "Existing token expired, refreshing", token_expires_at = cached_token.expires_at);
        }

        info!(
            message = "No active token found, about to get a new one",
            token_is_stale = cached_token.is_some(),
        );

        // A failed fetch leaves the previous record in place; it is expired anyway.
        let new_record = self.fetch_new_token().await?;
        cached_token.replace(new_record.clone());

        debug!(message = "Got new token", token_expires_at = new_record.expires_at);

        Ok(new_record)
    }

    /// Forget the cached token so the next call acquires a new one.
    pub async fn invalidate(&self) {
        self.cached_token.lock().await.take();
    }
}

#[async_trait::async_trait]
impl<Provider> super::TokenProvider for TokenManager<Provider>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Token: super::ExpiringToken,
{
    type Token = Record;
    type Error = Error<Provider::Error>;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error> {
        let token = self.get_token().await?;
        Ok(token)
    }
}
