//! Materialises the unrated slate for a round.

use anyhow::Result;
use marathon_storage::Storage;
use marathon_types::{Participant, RoundId, MARATHON_RATING_TYPE};

/// Load the participants still awaiting a rating for `round_id`: attended
/// rows with no result written, ordered by score descending, each seeded
/// from the coder's current marathon rating. Coders without a rating row
/// carry the `(0, 0, 0)` first-timer marker; the engine normalises it.
pub fn load_participants(storage: &dyn Storage, round_id: RoundId) -> Result<Vec<Participant>> {
    let rows = storage.unrated_results(round_id)?;
    let mut slate = Vec::with_capacity(rows.len());

    for row in rows {
        let prior = storage.get_algo_rating(row.coder_id, MARATHON_RATING_TYPE)?;
        let (rating, volatility, num_ratings) = match prior {
            Some(current) => (current.rating, current.vol, current.num_ratings),
            None => (0, 0, 0),
        };
        slate.push(Participant {
            coder_id: row.coder_id,
            rating,
            volatility,
            num_ratings,
            score: row.system_point_total,
        });
    }

    Ok(slate)
}
