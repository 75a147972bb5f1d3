//! The Qubits rating update: a two-pass-capable, tie-aware transformation of
//! a round slate into new rating/volatility pairs.

use marathon_types::{Participant, RatedParticipant};
use rust_decimal::Decimal;
use tracing::debug;

use crate::normal::{erf, inverse_normal_cdf};

/// Tunable constants of the Qubits update.
#[derive(Clone, Debug)]
pub struct QubitsParams {
    pub initial_weight: f64,
    pub final_weight: f64,
    /// Volatility assigned after a coder's first rated round.
    pub first_volatility: i32,
    /// Rating a first-timer competes at.
    pub first_timer_rating: i32,
    pub first_timer_volatility: i32,
}

impl Default for QubitsParams {
    fn default() -> Self {
        Self {
            initial_weight: 0.60,
            final_weight: 0.18,
            first_volatility: 385,
            first_timer_rating: 1200,
            first_timer_volatility: 515,
        }
    }
}

/// The Qubits rating engine. A pure transformation over a slate of
/// participants; performs no I/O and never mutates its input.
#[derive(Clone, Debug)]
pub struct QubitsEngine {
    params: QubitsParams,
}

impl Default for QubitsEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable working copy of one participant during a pass.
struct Contender {
    coder_id: marathon_types::CoderId,
    score: Decimal,
    rating: f64,
    volatility: f64,
    num_ratings: i32,
    expected_rank: f64,
    expected_performance: f64,
    actual_rank: f64,
    actual_performance: f64,
}

impl QubitsEngine {
    pub fn new() -> Self {
        Self::with_params(QubitsParams::default())
    }

    pub fn with_params(params: QubitsParams) -> Self {
        Self { params }
    }

    /// Rate one slate. Returns a fresh slate with the transient computation
    /// fields filled and the new rating/volatility per participant; the
    /// returned `num_ratings` includes the round just rated.
    ///
    /// An empty slate maps to an empty slate. A single-participant round is
    /// a pass-through: the (normalised) prior tuple is returned unchanged.
    pub fn rate(&self, slate: &[Participant]) -> Vec<RatedParticipant> {
        let n = slate.len();
        if n == 0 {
            return Vec::new();
        }

        // First-timer normalisation.
        let mut field: Vec<Contender> = slate
            .iter()
            .map(|p| {
                let (rating, volatility) = if p.num_ratings == 0 {
                    (
                        f64::from(self.params.first_timer_rating),
                        f64::from(self.params.first_timer_volatility),
                    )
                } else {
                    (f64::from(p.rating), f64::from(p.volatility))
                };
                Contender {
                    coder_id: p.coder_id,
                    score: p.score,
                    rating,
                    volatility,
                    num_ratings: p.num_ratings,
                    expected_rank: 0.0,
                    expected_performance: 0.0,
                    actual_rank: 0.0,
                    actual_performance: 0.0,
                }
            })
            .collect();

        // The competition factor is undefined for a field of one; the round
        // passes through untouched.
        if n == 1 {
            let c = &mut field[0];
            c.expected_rank = 1.0;
            c.actual_rank = 1.0;
            return vec![RatedParticipant {
                coder_id: c.coder_id,
                score: c.score,
                rating: c.rating as i32,
                volatility: c.volatility as i32,
                expected_rank: c.expected_rank,
                expected_performance: 0.0,
                actual_rank: c.actual_rank,
                actual_performance: 0.0,
                new_rating: c.rating as i32,
                new_volatility: c.volatility as i32,
                num_ratings: c.num_ratings + 1,
            }];
        }

        let nf = n as f64;
        let rave = field.iter().map(|c| c.rating).sum::<f64>() / nf;
        let vtemp = field.iter().map(|c| c.volatility * c.volatility).sum::<f64>();
        let rtemp = field.iter().map(|c| (c.rating - rave).powi(2)).sum::<f64>();
        let cf = (vtemp / nf + rtemp / (nf - 1.0)).sqrt();
        debug!("Rating field of {} (mean {:.1}, cf {:.2})", n, rave, cf);

        // Expected ranks: 0.5 plus the pairwise win probabilities over the
        // whole field, the self-term contributing one half.
        for i in 0..n {
            let mut erank = 0.5;
            for j in 0..n {
                erank += win_probability(
                    field[j].rating,
                    field[i].rating,
                    field[j].volatility,
                    field[i].volatility,
                );
            }
            field[i].expected_rank = erank;
            field[i].expected_performance = -inverse_normal_cdf((erank - 0.5) / nf);
        }

        assign_actual_ranks(&mut field);

        field
            .into_iter()
            .map(|c| {
                let diff = c.actual_performance - c.expected_performance;
                let performed_as = c.rating + diff * cf;

                let w_raw = (self.params.initial_weight - self.params.final_weight)
                    / (c.num_ratings as f64 + 1.0)
                    + self.params.final_weight;
                let mut weight = 1.0 / (1.0 - w_raw) - 1.0;
                // Established coders move more slowly.
                if c.rating >= 2500.0 {
                    weight *= 4.0 / 5.0;
                } else if c.rating >= 2000.0 {
                    weight *= 4.5 / 5.0;
                }

                let cap = 150.0 + 1500.0 / (c.num_ratings as f64 + 2.0);
                let tentative = (c.rating + weight * performed_as) / (1.0 + weight);
                let bounded = tentative
                    .clamp(c.rating - cap, c.rating + cap)
                    .max(1.0);
                let new_rating = bounded.round() as i32;

                let new_volatility = if c.num_ratings > 0 {
                    let drift = f64::from(new_rating) - c.rating;
                    (c.volatility * c.volatility / (1.0 + weight) + drift * drift / weight)
                        .sqrt()
                        .round() as i32
                } else {
                    self.params.first_volatility
                };

                RatedParticipant {
                    coder_id: c.coder_id,
                    score: c.score,
                    rating: c.rating as i32,
                    volatility: c.volatility as i32,
                    expected_rank: c.expected_rank,
                    expected_performance: c.expected_performance,
                    actual_rank: c.actual_rank,
                    actual_performance: c.actual_performance,
                    new_rating,
                    new_volatility,
                    num_ratings: c.num_ratings + 1,
                }
            })
            .collect()
    }
}

/// Probability that `a` beats `b` given their ratings and volatilities.
fn win_probability(rating_a: f64, rating_b: f64, vol_a: f64, vol_b: f64) -> f64 {
    let spread = (2.0 * (vol_a * vol_a + vol_b * vol_b)).sqrt();
    if spread == 0.0 {
        // Degenerate zero-volatility pair: decided by rating order alone.
        return if rating_a > rating_b {
            1.0
        } else if rating_a < rating_b {
            0.0
        } else {
            0.5
        };
    }
    (erf((rating_a - rating_b) / spread) + 1.0) / 2.0
}

/// Rank scores descending; a block of `k` tied scores occupying ranks
/// `[i+1 ..= i+k]` all receive the midpoint rank `i + 0.5 + k/2`.
fn assign_actual_ranks(field: &mut [Contender]) {
    let nf = field.len() as f64;
    let mut remaining: Vec<usize> = (0..field.len()).collect();
    let mut placed = 0usize;

    while let Some(top) = remaining.iter().map(|&i| field[i].score).max() {
        let tied: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| field[i].score == top)
            .collect();
        let k = tied.len() as f64;
        let rank = placed as f64 + 0.5 + k / 2.0;
        let performance = -inverse_normal_cdf((placed as f64 + k / 2.0) / nf);
        for &idx in &tied {
            field[idx].actual_rank = rank;
            field[idx].actual_performance = performance;
        }
        placed += tied.len();
        remaining.retain(|i| !tied.contains(i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn participant(coder_id: i64, rating: i32, vol: i32, rounds: i32, score: i64) -> Participant {
        Participant {
            coder_id,
            rating,
            volatility: vol,
            num_ratings: rounds,
            score: Decimal::new(score, 2),
        }
    }

    #[test]
    fn empty_slate_rates_to_empty_slate() {
        let engine = QubitsEngine::new();
        assert!(engine.rate(&[]).is_empty());
    }

    #[test]
    fn single_participant_round_is_a_pass_through() {
        let engine = QubitsEngine::new();
        let rated = engine.rate(&[participant(42, 1700, 300, 9, 8000)]);
        assert_eq!(rated.len(), 1);
        assert_eq!(rated[0].new_rating, 1700);
        assert_eq!(rated[0].new_volatility, 300);
        assert_eq!(rated[0].num_ratings, 10);
    }

    #[test]
    fn first_timers_compete_at_the_default_tuple() {
        let engine = QubitsEngine::new();
        let rated = engine.rate(&[
            participant(1, 0, 0, 0, 9000),
            participant(2, 0, 0, 0, 7000),
            participant(3, 0, 0, 0, 5000),
        ]);
        for p in &rated {
            assert_eq!(p.rating, 1200);
            assert_eq!(p.volatility, 515);
            assert_eq!(p.new_volatility, 385);
            assert_eq!(p.num_ratings, 1);
        }
        // Equal priors, distinct scores: new ratings follow score order.
        assert!(rated[0].new_rating > rated[1].new_rating);
        assert!(rated[1].new_rating > rated[2].new_rating);
    }

    #[test]
    fn all_tied_scores_share_the_middle_rank() {
        let engine = QubitsEngine::new();
        let slate: Vec<Participant> = (0..5)
            .map(|i| participant(i, 1400 + 10 * i as i32, 300, 4, 5000))
            .collect();
        let rated = engine.rate(&slate);
        for p in &rated {
            assert!((p.actual_rank - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn rank_sum_is_preserved_under_ties() {
        let engine = QubitsEngine::new();
        let slate = vec![
            participant(1, 1500, 400, 5, 9000),
            participant(2, 1350, 450, 3, 7000),
            participant(3, 1280, 420, 2, 7000),
            participant(4, 0, 0, 0, 7000),
            participant(5, 0, 0, 0, 1000),
            participant(6, 2200, 250, 30, 1000),
        ];
        let n = slate.len();
        let rated = engine.rate(&slate);
        let rank_sum: f64 = rated.iter().map(|p| p.actual_rank).sum();
        assert!((rank_sum - (n * (n + 1)) as f64 / 2.0).abs() < 1e-9);
    }

    #[test]
    fn expected_ranks_span_the_field() {
        let engine = QubitsEngine::new();
        let rated = engine.rate(&[
            participant(1, 2600, 200, 40, 9000),
            participant(2, 1500, 400, 5, 8000),
            participant(3, 900, 500, 1, 7000),
        ]);
        // The strongest coder expects the best (lowest) rank.
        assert!(rated[0].expected_rank < rated[1].expected_rank);
        assert!(rated[1].expected_rank < rated[2].expected_rank);
        for p in &rated {
            assert!(p.expected_rank >= 1.0 && p.expected_rank <= 3.0);
        }
    }

    #[test]
    fn rating_delta_honours_the_cap() {
        let engine = QubitsEngine::new();
        // A weak, experienced coder winning outright against a strong field.
        let rated = engine.rate(&[
            participant(1, 600, 300, 8, 9999),
            participant(2, 2800, 200, 50, 5000),
            participant(3, 2700, 200, 45, 4000),
        ]);
        let winner = &rated[0];
        let cap = 150.0 + 1500.0 / (8.0 + 2.0);
        assert!(f64::from((winner.new_rating - winner.rating).abs()) <= cap + 0.5);
    }

    #[test]
    fn ratings_never_drop_below_the_floor() {
        let engine = QubitsEngine::new();
        let rated = engine.rate(&[
            participant(1, 5, 700, 1, 100),
            participant(2, 2500, 200, 40, 9000),
        ]);
        assert!(rated[0].new_rating >= 1);
    }

    #[test]
    fn tier_attenuation_slows_high_rated_coders() {
        let engine = QubitsEngine::new();
        // Identical situations apart from the prior rating tier.
        let mid = engine.rate(&[
            participant(1, 1900, 300, 10, 9000),
            participant(2, 1900, 300, 10, 1000),
        ]);
        let high = engine.rate(&[
            participant(1, 2600, 300, 10, 9000),
            participant(2, 2600, 300, 10, 1000),
        ]);
        let mid_delta = mid[0].new_rating - mid[0].rating;
        let high_delta = high[0].new_rating - high[0].rating;
        assert!(high_delta < mid_delta);
        assert!(high_delta > 0);
    }

    #[test]
    fn input_slate_is_not_mutated() {
        let engine = QubitsEngine::new();
        let slate = vec![
            participant(1, 1500, 400, 5, 9000),
            participant(2, 0, 0, 0, 8000),
        ];
        let before = slate.clone();
        let _ = engine.rate(&slate);
        assert_eq!(slate, before);
    }

    proptest! {
        #[test]
        fn prop_rank_sum_and_bounds(
            seeds in prop::collection::vec((0i32..3000, 0i32..600, 0i32..40, 0i64..10_000), 2..24)
        ) {
            let slate: Vec<Participant> = seeds
                .iter()
                .enumerate()
                .map(|(i, &(rating, vol, rounds, score))| Participant {
                    coder_id: i as i64 + 1,
                    rating,
                    volatility: vol,
                    num_ratings: rounds,
                    score: Decimal::new(score, 2),
                })
                .collect();
            let n = slate.len();
            let rated = QubitsEngine::new().rate(&slate);

            let rank_sum: f64 = rated.iter().map(|p| p.actual_rank).sum();
            prop_assert!((rank_sum - (n * (n + 1)) as f64 / 2.0).abs() < 1e-6);

            for p in &rated {
                prop_assert!(p.new_rating >= 1);
                prop_assert!(p.new_volatility >= 0);
                let prior_rounds = f64::from(p.num_ratings - 1);
                let cap = 150.0 + 1500.0 / (prior_rounds + 2.0);
                prop_assert!(f64::from((p.new_rating - p.rating).abs()) <= cap + 0.5);
            }
        }
    }
}
