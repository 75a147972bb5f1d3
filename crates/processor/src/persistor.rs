//! Write-back of one engine pass. The stored `num_ratings` increments here
//! and nowhere else; the engine's in-memory count only drives pass
//! selection.

use anyhow::{anyhow, Result};
use marathon_storage::Storage;
use marathon_types::{AlgoRating, RatedParticipant, RoundId, MARATHON_RATING_TYPE};
use tracing::debug;

/// Persist one pass worth of results. Per participant: snapshot the current
/// rating row into `old_rating`/`old_vol`, write the new pair onto the round
/// result, and upsert the marathon rating with refreshed extrema and round
/// markers. The caller flips the round's rated flag after the final pass.
pub fn persist_slate(
    storage: &dyn Storage,
    round_id: RoundId,
    slate: &[RatedParticipant],
) -> Result<()> {
    for participant in slate {
        let snapshot = storage.get_algo_rating(participant.coder_id, MARATHON_RATING_TYPE)?;

        let mut row = storage
            .get_result(round_id, participant.coder_id)?
            .ok_or_else(|| {
                anyhow!(
                    "missing result row for coder {} in round {}",
                    participant.coder_id,
                    round_id
                )
            })?;
        row.old_rating = snapshot.as_ref().map(|s| s.rating);
        row.old_vol = snapshot.as_ref().map(|s| s.vol);
        row.new_rating = Some(participant.new_rating);
        row.new_vol = Some(participant.new_volatility);
        row.rated_ind = 1;
        storage.put_result(row)?;

        let updated = match snapshot {
            Some(current) => AlgoRating {
                rating: participant.new_rating,
                vol: participant.new_volatility,
                num_ratings: current.num_ratings + 1,
                round_id,
                highest_rating: current.highest_rating.max(participant.new_rating),
                lowest_rating: current.lowest_rating.min(participant.new_rating),
                last_rated_round_id: round_id,
                ..current
            },
            None => AlgoRating::first(
                participant.coder_id,
                round_id,
                participant.new_rating,
                participant.new_volatility,
            ),
        };
        debug!(
            "Coder {} rated {} (vol {}) in round {}, {} rated round(s) total",
            participant.coder_id,
            participant.new_rating,
            participant.new_volatility,
            round_id,
            updated.num_ratings
        );
        storage.put_algo_rating(updated)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use marathon_storage::MemoryStorage;
    use marathon_types::{Attendance, LongCompResult};
    use rust_decimal::Decimal;

    fn rated(coder_id: i64, new_rating: i32, new_volatility: i32) -> RatedParticipant {
        RatedParticipant {
            coder_id,
            score: Decimal::new(9000, 2),
            rating: 1200,
            volatility: 515,
            expected_rank: 1.5,
            expected_performance: 0.0,
            actual_rank: 1.0,
            actual_performance: 0.5,
            new_rating,
            new_volatility,
            num_ratings: 1,
        }
    }

    fn seed_result(storage: &MemoryStorage, round_id: i64, coder_id: i64) {
        let mut row = LongCompResult::new(round_id, coder_id, Decimal::new(9000, 2));
        row.attended = Attendance::Attended;
        storage.put_result(row).expect("seed result");
    }

    #[test]
    fn first_rated_round_inserts_a_fresh_rating_row() {
        let storage = MemoryStorage::new();
        seed_result(&storage, 600, 7);

        persist_slate(&storage, 600, &[rated(7, 1240, 385)]).expect("persist");

        let row = storage.get_result(600, 7).expect("get").expect("row");
        assert_eq!(row.old_rating, None);
        assert_eq!(row.old_vol, None);
        assert_eq!(row.new_rating, Some(1240));
        assert_eq!(row.new_vol, Some(385));
        assert_eq!(row.rated_ind, 1);

        let rating = storage
            .get_algo_rating(7, MARATHON_RATING_TYPE)
            .expect("get")
            .expect("rating row");
        assert_eq!(rating.num_ratings, 1);
        assert_eq!(rating.round_id, 600);
        assert_eq!(rating.first_rated_round_id, 600);
        assert_eq!(rating.last_rated_round_id, 600);
        assert_eq!(rating.highest_rating, 1240);
        assert_eq!(rating.lowest_rating, 1240);
    }

    #[test]
    fn existing_rating_row_updates_monotonically() {
        let storage = MemoryStorage::new();
        seed_result(&storage, 700, 7);

        let mut current = AlgoRating::first(7, 600, 1240, 385);
        current.num_ratings = 3;
        current.highest_rating = 1400;
        current.lowest_rating = 1100;
        storage.put_algo_rating(current).expect("seed rating");

        persist_slate(&storage, 700, &[rated(7, 1500, 300)]).expect("persist");

        let row = storage.get_result(700, 7).expect("get").expect("row");
        assert_eq!(row.old_rating, Some(1240));
        assert_eq!(row.old_vol, Some(385));
        assert_eq!(row.new_rating, Some(1500));

        let rating = storage
            .get_algo_rating(7, MARATHON_RATING_TYPE)
            .expect("get")
            .expect("rating row");
        assert_eq!(rating.num_ratings, 4);
        assert_eq!(rating.rating, 1500);
        assert_eq!(rating.vol, 300);
        assert_eq!(rating.round_id, 700);
        assert_eq!(rating.first_rated_round_id, 600);
        assert_eq!(rating.last_rated_round_id, 700);
        // A new high refreshes the extremum; the low survives.
        assert_eq!(rating.highest_rating, 1500);
        assert_eq!(rating.lowest_rating, 1100);
    }

    #[test]
    fn lowest_rating_refreshes_on_a_new_low() {
        let storage = MemoryStorage::new();
        seed_result(&storage, 700, 7);

        let mut current = AlgoRating::first(7, 600, 1240, 385);
        current.highest_rating = 1400;
        current.lowest_rating = 1100;
        storage.put_algo_rating(current).expect("seed rating");

        persist_slate(&storage, 700, &[rated(7, 1050, 420)]).expect("persist");

        let rating = storage
            .get_algo_rating(7, MARATHON_RATING_TYPE)
            .expect("get")
            .expect("rating row");
        assert_eq!(rating.lowest_rating, 1050);
        assert_eq!(rating.highest_rating, 1400);
    }

    #[test]
    fn missing_result_row_is_a_programming_error() {
        let storage = MemoryStorage::new();
        assert!(persist_slate(&storage, 600, &[rated(7, 1240, 385)]).is_err());
    }
}
