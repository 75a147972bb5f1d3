//! v5 challenge lookup, keyed by the legacy contest id autopilot events
//! carry.

use crate::token::TokenProvider;
use crate::{ChallengeDirectory, ClientError};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The slice of a v5 challenge the processor consumes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    #[serde(rename = "legacyId", default)]
    pub legacy_id: Option<i64>,
    #[serde(default)]
    pub legacy: Option<ChallengeLegacy>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChallengeLegacy {
    #[serde(rename = "subTrack", default)]
    pub sub_track: Option<String>,
}

impl Challenge {
    /// Only marathon matches are rated by this processor.
    pub fn is_marathon_match(&self) -> bool {
        self.legacy
            .as_ref()
            .and_then(|legacy| legacy.sub_track.as_deref())
            .map(|track| track.eq_ignore_ascii_case("marathon_match"))
            .unwrap_or(false)
    }
}

/// Challenge API client over the v5 gateway.
pub struct ChallengeClient {
    base_url: String,
    http: reqwest::Client,
    tokens: Arc<TokenProvider>,
}

impl ChallengeClient {
    pub fn new(base_url: &str, tokens: Arc<TokenProvider>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            tokens,
        })
    }
}

#[async_trait]
impl ChallengeDirectory for ChallengeClient {
    async fn challenge_by_legacy_id(&self, legacy_id: i64) -> Result<Option<Challenge>> {
        let endpoint = format!("{}/challenges?legacyId={}", self.base_url, legacy_id);
        let token = self.tokens.bearer().await?;

        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(ClientError::Http)?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                endpoint,
                status: response.status(),
            }
            .into());
        }

        let challenges: Vec<Challenge> = response.json().await.map_err(ClientError::Http)?;
        debug!(
            "Challenge lookup for legacy id {} returned {} match(es)",
            legacy_id,
            challenges.len()
        );
        Ok(challenges.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_track_comparison_ignores_case() {
        let challenge: Challenge = serde_json::from_str(
            r#"{"id":"c-123","legacyId":30001,"legacy":{"subTrack":"MARATHON_MATCH"}}"#,
        )
        .expect("decode");
        assert!(challenge.is_marathon_match());
        assert_eq!(challenge.legacy_id, Some(30001));
    }

    #[test]
    fn missing_legacy_block_is_not_a_marathon_match() {
        let challenge: Challenge =
            serde_json::from_str(r#"{"id":"c-456"}"#).expect("decode");
        assert!(!challenge.is_marathon_match());
        assert_eq!(challenge.legacy_id, None);
    }
}
