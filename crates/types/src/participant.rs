use crate::CoderId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The unit the rating engine consumes: one attending coder together with
/// the rating tuple they entered the round with. Materialised by the loader,
/// owned by the orchestrator invocation that built it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub coder_id: CoderId,
    /// Prior rating; `(0, 0, 0)` together with `volatility` and
    /// `num_ratings` marks a first-timer.
    pub rating: i32,
    pub volatility: i32,
    pub num_ratings: i32,
    pub score: Decimal,
}

impl Participant {
    pub fn is_first_timer(&self) -> bool {
        self.num_ratings == 0
    }
}

/// Engine output for one participant: the normalised prior tuple, the
/// transient computation fields, and the new rating/volatility pair.
#[derive(Clone, Debug, PartialEq)]
pub struct RatedParticipant {
    pub coder_id: CoderId,
    pub score: Decimal,
    /// Prior rating after first-timer normalisation.
    pub rating: i32,
    pub volatility: i32,
    pub expected_rank: f64,
    pub expected_performance: f64,
    pub actual_rank: f64,
    pub actual_performance: f64,
    pub new_rating: i32,
    pub new_volatility: i32,
    /// Count including the round just rated. In-memory only; the persistor
    /// owns the stored increment.
    pub num_ratings: i32,
}

/// Outcome of a round calculation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalculationOutcome {
    Success,
    AlreadyCalculated,
}
