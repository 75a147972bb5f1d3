//! Machine-to-machine token cache. One process-wide `(token, deadline)`
//! pair; readers check the deadline and refresh through the Auth0
//! client-credentials grant on expiry.

use crate::ClientError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Settings for the client-credentials grant.
#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub auth_url: String,
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
    /// How long a minted token is served from cache.
    pub cache_time: Duration,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    deadline: Instant,
}

/// Caching provider of opaque bearer tokens.
///
/// The lock is never held across the refresh request; concurrent refreshes
/// are tolerated because the token endpoint is idempotent.
pub struct TokenProvider {
    config: TokenConfig,
    http: reqwest::Client,
    cached: parking_lot::Mutex<Option<CachedToken>>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl TokenProvider {
    pub fn new(config: TokenConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            config,
            http,
            cached: parking_lot::Mutex::new(None),
        })
    }

    /// Return a valid bearer token, minting a fresh one when the cached
    /// token has passed its deadline.
    pub async fn bearer(&self) -> Result<String, ClientError> {
        if let Some(cached) = self.cached.lock().clone() {
            if Instant::now() < cached.deadline {
                return Ok(cached.token);
            }
        }

        let token = self.fetch().await?;
        *self.cached.lock() = Some(CachedToken {
            token: token.clone(),
            deadline: Instant::now() + self.config.cache_time,
        });
        Ok(token)
    }

    async fn fetch(&self) -> Result<String, ClientError> {
        debug!("Minting fresh M2M token from {}", self.config.auth_url);
        let request = TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            audience: &self.config.audience,
        };
        let response = self
            .http
            .post(&self.config.auth_url)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                endpoint: self.config.auth_url.clone(),
                status: response.status(),
            });
        }
        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }

    #[cfg(test)]
    fn prime(&self, token: &str, deadline: Instant) {
        *self.cached.lock() = Some(CachedToken {
            token: token.to_string(),
            deadline,
        });
    }
}
