//! HTTP collaborators of the rating processor: the M2M token cache and the
//! v5 challenge/submission APIs. The router and reconciler consume these
//! through the `ChallengeDirectory` and `SubmissionCatalog` traits so tests
//! can substitute canned catalogues.

use anyhow::Result;
use async_trait::async_trait;
use marathon_types::CoderId;

pub mod challenges;
pub mod submissions;
pub mod token;

pub use challenges::{Challenge, ChallengeClient, ChallengeLegacy};
pub use submissions::{Submission, SubmissionClient};
pub use token::{TokenConfig, TokenProvider};

/// Client errors
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {endpoint}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },
}

/// Challenge lookup by legacy contest id.
#[async_trait]
pub trait ChallengeDirectory: Send + Sync {
    async fn challenge_by_legacy_id(&self, legacy_id: i64) -> Result<Option<Challenge>>;
}

/// Submission catalogue reduced to attendance facts: the members whose
/// latest submission for a challenge carries a review summation.
#[async_trait]
pub trait SubmissionCatalog: Send + Sync {
    async fn reviewed_members(&self, challenge_id: &str) -> Result<Vec<CoderId>>;
}
