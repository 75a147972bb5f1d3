//! v5 submission listing, reduced to the attendance facts the reconciler
//! needs: which members finished the challenge with a reviewed submission.

use crate::token::TokenProvider;
use crate::{ClientError, SubmissionCatalog};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marathon_types::CoderId;
use serde::Deserialize;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SUBMISSIONS_PER_PAGE: u32 = 500;

/// One submission row from the v5 API.
#[derive(Clone, Debug, Deserialize)]
pub struct Submission {
    #[serde(rename = "memberId")]
    pub member_id: CoderId,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Present once the submission has been through final review.
    #[serde(rename = "reviewSummation", default)]
    pub review_summation: Option<Value>,
}

impl Submission {
    pub fn has_review_summation(&self) -> bool {
        match &self.review_summation {
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

/// Submission API client over the v5 gateway.
pub struct SubmissionClient {
    base_url: String,
    http: reqwest::Client,
    tokens: Arc<TokenProvider>,
}

impl SubmissionClient {
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

    /// Fetch every submission page for a challenge, following the
    /// `x-page` / `x-total-pages` pagination headers.
    async fn submissions_for_challenge(
        &self,
        challenge_id: &str,
    ) -> Result<Vec<Submission>, ClientError> {
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let endpoint = format!(
                "{}/submissions?challengeId={}&perPage={}&page={}",
                self.base_url, challenge_id, SUBMISSIONS_PER_PAGE, page
            );
            let token = self.tokens.bearer().await?;
            let response = self.http.get(&endpoint).bearer_auth(token).send().await?;
            if !response.status().is_success() {
                return Err(ClientError::Status {
                    endpoint,
                    status: response.status(),
                });
            }

            let this_page = header_number(&response, "x-page").unwrap_or(page);
            let total_pages = header_number(&response, "x-total-pages").unwrap_or(this_page);

            let mut batch: Vec<Submission> = response.json().await?;
            all.append(&mut batch);

            if this_page >= total_pages {
                break;
            }
            page = this_page + 1;
        }

        debug!(
            "Fetched {} submission(s) for challenge {}",
            all.len(),
            challenge_id
        );
        Ok(all)
    }
}

fn header_number(response: &reqwest::Response, name: &str) -> Option<u32> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Keep the latest submission per member, then keep only reviewed ones.
fn latest_reviewed_members(submissions: Vec<Submission>) -> Vec<CoderId> {
    let mut latest: HashMap<CoderId, Submission> = HashMap::new();
    for submission in submissions {
        match latest.entry(submission.member_id) {
            Entry::Occupied(mut slot) => {
                if submission.created > slot.get().created {
                    slot.insert(submission);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(submission);
            }
        }
    }

    let mut members: Vec<CoderId> = latest
        .into_values()
        .filter(Submission::has_review_summation)
        .map(|submission| submission.member_id)
        .collect();
    members.sort_unstable();
    members
}

#[async_trait]
impl SubmissionCatalog for SubmissionClient {
    async fn reviewed_members(&self, challenge_id: &str) -> Result<Vec<CoderId>> {
        let submissions = self.submissions_for_challenge(challenge_id).await?;
        Ok(latest_reviewed_members(submissions))
    }
}
