//! Event routing: classifies inbound bus records by topic and payload
//! shape, and decides which orchestrator action to invoke. Envelopes are
//! untyped JSON; a narrow decode step drops shapes missing required fields.

use crate::orchestrator::RoundOrchestrator;
use crate::warehouse::WarehouseHandoff;
use anyhow::Result;
use marathon_bus::BusRecord;
use marathon_clients::ChallengeDirectory;
use marathon_types::{CalculationOutcome, RoundId};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Producer identity rating-service events must carry to be acted on.
pub const RATING_SERVICE_ORIGINATOR: &str = "rating.calculation.service";

const REVIEW_PHASE: &str = "review";
const END_STATE: &str = "end";

/// The two topics the processor subscribes to.
#[derive(Clone, Debug)]
pub struct TopicRouting {
    pub autopilot: String,
    pub rating_service: String,
}

/// What a dispatch did, for logs, metrics, and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Calculated(CalculationOutcome),
    CodersLoadRequested(RoundId),
    RatingsLoadRequested(RoundId),
    Ignored,
}

/// Autopilot phase notification payload.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AutopilotNotice {
    #[serde(rename = "phaseTypeName")]
    phase_type_name: Option<String>,
    state: Option<String>,
    #[serde(rename = "projectId")]
    project_id: Option<i64>,
}

/// Rating-service lifecycle event payload.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RatingServiceEvent {
    originator: Option<String>,
    event: Option<String>,
    status: Option<String>,
    #[serde(rename = "roundId")]
    round_id: Option<RoundId>,
}

pub struct EventRouter {
    orchestrator: Arc<RoundOrchestrator>,
    challenges: Arc<dyn ChallengeDirectory>,
    warehouse: WarehouseHandoff,
    topics: TopicRouting,
}

impl EventRouter {
    pub fn new(
        orchestrator: Arc<RoundOrchestrator>,
        challenges: Arc<dyn ChallengeDirectory>,
        topics: TopicRouting,
    ) -> Self {
        Self {
            orchestrator,
            challenges,
            warehouse: WarehouseHandoff::new(),
            topics,
        }
    }

    /// Classify and dispatch one record. Undecodable or irrelevant messages
    /// are logged and dropped; they cannot succeed on replay. Errors that
    /// escape are transient-I/O failures of the action itself.
    pub async fn dispatch(&self, record: &BusRecord) -> Result<DispatchOutcome> {
        if record.topic == self.topics.autopilot {
            self.handle_autopilot(&record.payload).await
        } else if record.topic == self.topics.rating_service {
            self.handle_rating_service(&record.payload)
        } else {
            warn!("Message on unrecognised topic {} dropped", record.topic);
            Ok(DispatchOutcome::Ignored)
        }
    }

    async fn handle_autopilot(&self, payload: &str) -> Result<DispatchOutcome> {
        let Some(root) = decode_envelope(payload) else {
            return Ok(DispatchOutcome::Ignored);
        };
        let notice: AutopilotNotice = match serde_json::from_value(message_body(&root).clone()) {
            Ok(notice) => notice,
            Err(err) => {
                warn!("Dropping malformed autopilot notification: {}", err);
                return Ok(DispatchOutcome::Ignored);
            }
        };

        let phase_matches = notice
            .phase_type_name
            .as_deref()
            .map(|phase| phase.eq_ignore_ascii_case(REVIEW_PHASE))
            .unwrap_or(false);
        let state_matches = notice
            .state
            .as_deref()
            .map(|state| state.eq_ignore_ascii_case(END_STATE))
            .unwrap_or(false);
        if !phase_matches || !state_matches {
            debug!(
                "Autopilot notification ignored (phase {:?}, state {:?})",
                notice.phase_type_name, notice.state
            );
            return Ok(DispatchOutcome::Ignored);
        }

        let Some(project_id) = notice.project_id else {
            warn!("Review-end notification without a projectId dropped");
            return Ok(DispatchOutcome::Ignored);
        };

        // An unreachable challenge directory is a fatal input: the error
        // propagates and this round is skipped for now.
        let Some(challenge) = self.challenges.challenge_by_legacy_id(project_id).await? else {
            warn!("No challenge found for legacy id {}, message dropped", project_id);
            return Ok(DispatchOutcome::Ignored);
        };
        if !challenge.is_marathon_match() {
            debug!(
                "Challenge {} is not a marathon match, nothing to rate",
                challenge.id
            );
            return Ok(DispatchOutcome::Ignored);
        }
        let Some(legacy_id) = challenge.legacy_id else {
            warn!("Challenge {} carries no legacy id, message dropped", challenge.id);
            return Ok(DispatchOutcome::Ignored);
        };

        let outcome = self.orchestrator.calculate(&challenge.id, legacy_id).await?;
        Ok(DispatchOutcome::Calculated(outcome))
    }

    fn handle_rating_service(&self, payload: &str) -> Result<DispatchOutcome> {
        let Some(root) = decode_envelope(payload) else {
            return Ok(DispatchOutcome::Ignored);
        };
        let mut event: RatingServiceEvent =
            match serde_json::from_value(message_body(&root).clone()) {
                Ok(event) => event,
                Err(err) => {
                    warn!("Dropping malformed rating-service event: {}", err);
                    return Ok(DispatchOutcome::Ignored);
                }
            };
        // The originator may sit on the envelope rather than the payload.
        if event.originator.is_none() {
            event.originator = root
                .get("originator")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        if event.originator.as_deref() != Some(RATING_SERVICE_ORIGINATOR) {
            debug!(
                "Rating-service event from foreign originator {:?} ignored",
                event.originator
            );
            return Ok(DispatchOutcome::Ignored);
        }
        let Some(round_id) = event.round_id else {
            warn!("Rating-service event without a roundId dropped");
            return Ok(DispatchOutcome::Ignored);
        };

        match (event.event.as_deref(), event.status.as_deref()) {
            (Some("RATINGS_CALCULATION"), Some("SUCCESS")) => {
                self.warehouse.load_coders(round_id)?;
                Ok(DispatchOutcome::CodersLoadRequested(round_id))
            }
            (Some("LOAD_CODERS"), Some("SUCCESS")) => {
                self.warehouse.load_ratings(round_id)?;
                Ok(DispatchOutcome::RatingsLoadRequested(round_id))
            }
            (event_name, status) => {
                debug!(
                    "Rating-service event {:?} with status {:?} ignored",
                    event_name, status
                );
                Ok(DispatchOutcome::Ignored)
            }
        }
    }
}

fn decode_envelope(raw: &str) -> Option<Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Dropping undecodable envelope: {}", err);
            None
        }
    }
}

/// Bus envelopes may nest the interesting fields under `payload`; bare
/// payloads are accepted as-is.
fn message_body(root: &Value) -> &Value {
    match root.get("payload") {
        Some(payload) if payload.is_object() => payload,
        _ => root,
    }
}
