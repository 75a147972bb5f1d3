use crate::{CoderId, RoundId};
use serde::{Deserialize, Serialize};

/// Rating type id for marathon matches, fixed across the processor.
pub const MARATHON_RATING_TYPE: i32 = 3;

/// A coder's current rating for one algorithmic competition type, keyed by
/// `(coder_id, algo_rating_type_id)`.
///
/// Created lazily on a coder's first rated round; every later update strictly
/// increments `num_ratings`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlgoRating {
    pub coder_id: CoderId,
    pub algo_rating_type_id: i32,
    pub rating: i32,
    pub vol: i32,
    /// Number of rated rounds contributing to this rating.
    pub num_ratings: i32,
    /// Most recent rated round.
    pub round_id: RoundId,
    pub highest_rating: i32,
    pub lowest_rating: i32,
    pub first_rated_round_id: RoundId,
    pub last_rated_round_id: RoundId,
}

impl AlgoRating {
    /// Row inserted when a coder completes their first rated round.
    pub fn first(coder_id: CoderId, round_id: RoundId, rating: i32, vol: i32) -> Self {
        Self {
            coder_id,
            algo_rating_type_id: MARATHON_RATING_TYPE,
            rating,
            vol,
            num_ratings: 1,
            round_id,
            highest_rating: rating,
            lowest_rating: rating,
            first_rated_round_id: round_id,
            last_rated_round_id: round_id,
        }
    }
}
