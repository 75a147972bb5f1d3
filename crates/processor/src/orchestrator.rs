//! Round orchestration: the only component that composes I/O and compute.
//! Resolves the round, reconciles attendance, runs the two engine passes,
//! and hands each pass to the persistor before flipping the round flag.

use crate::loader::load_participants;
use crate::persistor::persist_slate;
use crate::reconciler::reconcile_attendance;
use anyhow::Result;
use marathon_clients::SubmissionCatalog;
use marathon_engine::QubitsEngine;
use marathon_storage::Storage;
use marathon_types::{CalculationOutcome, Participant, RatedParticipant, RoundId};
use std::sync::Arc;
use tracing::info;

pub struct RoundOrchestrator {
    storage: Arc<dyn Storage>,
    submissions: Arc<dyn SubmissionCatalog>,
    engine: QubitsEngine,
}

impl RoundOrchestrator {
    pub fn new(storage: Arc<dyn Storage>, submissions: Arc<dyn SubmissionCatalog>) -> Self {
        Self {
            storage,
            submissions,
            engine: QubitsEngine::new(),
        }
    }

    /// Autopilot entry point. The round is located through its legacy
    /// contest id; when no round carries it, the legacy id doubles as the
    /// round id. Attendance reconciliation runs best-effort before rating.
    pub async fn calculate(
        &self,
        challenge_id: &str,
        legacy_id: i64,
    ) -> Result<CalculationOutcome> {
        let round_id = match self.storage.find_round_by_contest(legacy_id)? {
            Some(round) => round.round_id,
            None => legacy_id,
        };
        reconcile_attendance(
            self.storage.as_ref(),
            self.submissions.as_ref(),
            round_id,
            challenge_id,
        )
        .await?;
        self.rate_round(round_id)
    }

    /// Rating entry point when the round id is already known. No challenge
    /// context, so attendance stands as stored.
    pub fn calculate_by_round(&self, round_id: RoundId) -> Result<CalculationOutcome> {
        self.rate_round(round_id)
    }

    fn rate_round(&self, round_id: RoundId) -> Result<CalculationOutcome> {
        if let Some(round) = self.storage.get_round(round_id)? {
            if round.is_rated() {
                info!("Round {} already rated, skipping", round_id);
                return Ok(CalculationOutcome::AlreadyCalculated);
            }
        }

        let slate = load_participants(self.storage.as_ref(), round_id)?;
        if slate.is_empty() {
            info!("No unrated results for round {}, nothing to calculate", round_id);
            return Ok(CalculationOutcome::AlreadyCalculated);
        }

        // Provisional pass: first-timers are rated against the full field so
        // their initial placement is well calibrated.
        let full_field = self.engine.rate(&slate);
        let provisional: Vec<RatedParticipant> = full_field
            .into_iter()
            .filter(|p| p.num_ratings == 1)
            .collect();
        persist_slate(self.storage.as_ref(), round_id, &provisional)?;

        // Non-provisional pass: experienced coders are re-rated against the
        // experienced subfield only, so provisional entrants do not perturb
        // established ratings.
        let experienced: Vec<Participant> = slate
            .iter()
            .filter(|p| p.num_ratings > 0)
            .cloned()
            .collect();
        if !experienced.is_empty() {
            let rated = self.engine.rate(&experienced);
            persist_slate(self.storage.as_ref(), round_id, &rated)?;
        }

        self.storage.mark_round_rated(round_id)?;
        info!(
            "Round {} rated: {} provisional, {} experienced participant(s)",
            round_id,
            provisional.len(),
            experienced.len()
        );
        Ok(CalculationOutcome::Success)
    }
}
