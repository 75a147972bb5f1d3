//! Persistent storage abstraction for the rating processor. Defines the
//! `Storage` trait over the round, result, and rating tables, a Sled-backed
//! node database, and an in-memory test backend shared by the loader,
//! persistor, and orchestrator tests. Values serialize deterministically as
//! JSON.

use anyhow::Result;
use marathon_types::{AlgoRating, CoderId, LongCompResult, Round, RoundId};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Abstract storage trait over the three rating tables.
///
/// `LongCompResult` rows are keyed by `(round_id, coder_id)`; `AlgoRating`
/// rows by `(coder_id, algo_rating_type_id)`. `put_*` operations upsert.
pub trait Storage: Send + Sync {
    fn put_round(&self, round: Round) -> Result<()>;
    fn get_round(&self, round_id: RoundId) -> Result<Option<Round>>;
    /// Locate a round through its legacy contest id. Linear scan; the round
    /// table is small and the lookup happens once per calculation.
    fn find_round_by_contest(&self, contest_id: i64) -> Result<Option<Round>>;
    /// Flip the round's rated flag, creating the row when the round was
    /// addressed through the legacy-id fallback and never registered.
    fn mark_round_rated(&self, round_id: RoundId) -> Result<()>;

    fn put_result(&self, result: LongCompResult) -> Result<()>;
    fn get_result(&self, round_id: RoundId, coder_id: CoderId) -> Result<Option<LongCompResult>>;
    fn results_for_round(&self, round_id: RoundId) -> Result<Vec<LongCompResult>>;
    /// The unrated slate: attended rows with no result written yet, ordered
    /// by score descending (ties by coder id for reproducibility).
    fn unrated_results(&self, round_id: RoundId) -> Result<Vec<LongCompResult>>;

    fn get_algo_rating(
        &self,
        coder_id: CoderId,
        algo_rating_type_id: i32,
    ) -> Result<Option<AlgoRating>>;
    fn put_algo_rating(&self, rating: AlgoRating) -> Result<()>;
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value).map_err(StorageError::Serialization)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes).map_err(StorageError::Serialization)?)
}

fn round_key(round_id: RoundId) -> [u8; 8] {
    round_id.to_be_bytes()
}

fn result_key(round_id: RoundId, coder_id: CoderId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&round_id.to_be_bytes());
    key[8..].copy_from_slice(&coder_id.to_be_bytes());
    key
}

fn rating_key(coder_id: CoderId, algo_rating_type_id: i32) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..8].copy_from_slice(&coder_id.to_be_bytes());
    key[8..].copy_from_slice(&algo_rating_type_id.to_be_bytes());
    key
}

fn order_by_score_desc(rows: &mut [LongCompResult]) {
    rows.sort_by(|a, b| {
        b.system_point_total
            .cmp(&a.system_point_total)
            .then(a.coder_id.cmp(&b.coder_id))
    });
}

/// Sled-backed implementation. One tree per table.
pub struct SledStorage {
    db: Db,
    rounds: Tree,
    results: Tree,
    algo_ratings: Tree,
}

impl SledStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path).map_err(StorageError::Database)?;
        let rounds = db.open_tree("rounds").map_err(StorageError::Database)?;
        let results = db
            .open_tree("long_comp_results")
            .map_err(StorageError::Database)?;
        let algo_ratings = db
            .open_tree("algo_ratings")
            .map_err(StorageError::Database)?;

        Ok(Self {
            db,
            rounds,
            results,
            algo_ratings,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(StorageError::Database)?;
        Ok(())
    }
}

impl Storage for SledStorage {
    fn put_round(&self, round: Round) -> Result<()> {
        self.rounds
            .insert(round_key(round.round_id), encode(&round)?)?;
        Ok(())
    }

    fn get_round(&self, round_id: RoundId) -> Result<Option<Round>> {
        self.rounds
            .get(round_key(round_id))?
            .map(|v| decode(&v))
            .transpose()
    }

    fn find_round_by_contest(&self, contest_id: i64) -> Result<Option<Round>> {
        for item in self.rounds.iter() {
            let (_, value) = item?;
            let round: Round = decode(&value)?;
            if round.contest_id == Some(contest_id) {
                return Ok(Some(round));
            }
        }
        Ok(None)
    }

    fn mark_round_rated(&self, round_id: RoundId) -> Result<()> {
        let mut round = self
            .get_round(round_id)?
            .unwrap_or_else(|| Round::new(round_id, None));
        round.rated_ind = 1;
        self.put_round(round)
    }

    fn put_result(&self, result: LongCompResult) -> Result<()> {
        self.results.insert(
            result_key(result.round_id, result.coder_id),
            encode(&result)?,
        )?;
        Ok(())
    }

    fn get_result(&self, round_id: RoundId, coder_id: CoderId) -> Result<Option<LongCompResult>> {
        self.results
            .get(result_key(round_id, coder_id))?
            .map(|v| decode(&v))
            .transpose()
    }

    fn results_for_round(&self, round_id: RoundId) -> Result<Vec<LongCompResult>> {
        let mut rows = Vec::new();
        for item in self.results.scan_prefix(round_key(round_id)) {
            let (_, value) = item?;
            rows.push(decode(&value)?);
        }
        Ok(rows)
    }

    fn unrated_results(&self, round_id: RoundId) -> Result<Vec<LongCompResult>> {
        let mut rows: Vec<LongCompResult> = self
            .results_for_round(round_id)?
            .into_iter()
            .filter(LongCompResult::awaiting_rating)
            .collect();
        order_by_score_desc(&mut rows);
        Ok(rows)
    }

    fn get_algo_rating(
        &self,
        coder_id: CoderId,
        algo_rating_type_id: i32,
    ) -> Result<Option<AlgoRating>> {
        self.algo_ratings
            .get(rating_key(coder_id, algo_rating_type_id))?
            .map(|v| decode(&v))
            .transpose()
    }

    fn put_algo_rating(&self, rating: AlgoRating) -> Result<()> {
        self.algo_ratings.insert(
            rating_key(rating.coder_id, rating.algo_rating_type_id),
            encode(&rating)?,
        )?;
        Ok(())
    }
}

/// In-memory backend for tests. Tracks the number of write operations so
/// idempotence tests can assert that a replay touched nothing.
pub struct MemoryStorage {
    rounds: RwLock<BTreeMap<RoundId, Round>>,
    results: RwLock<BTreeMap<(RoundId, CoderId), LongCompResult>>,
    algo_ratings: RwLock<BTreeMap<(CoderId, i32), AlgoRating>>,
    writes: AtomicUsize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            rounds: RwLock::new(BTreeMap::new()),
            results: RwLock::new(BTreeMap::new()),
            algo_ratings: RwLock::new(BTreeMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Storage for MemoryStorage {
    fn put_round(&self, round: Round) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.rounds.write().insert(round.round_id, round);
        Ok(())
    }

    fn get_round(&self, round_id: RoundId) -> Result<Option<Round>> {
        Ok(self.rounds.read().get(&round_id).cloned())
    }

    fn find_round_by_contest(&self, contest_id: i64) -> Result<Option<Round>> {
        Ok(self
            .rounds
            .read()
            .values()
            .find(|r| r.contest_id == Some(contest_id))
            .cloned())
    }

    fn mark_round_rated(&self, round_id: RoundId) -> Result<()> {
        let mut round = self
            .get_round(round_id)?
            .unwrap_or_else(|| Round::new(round_id, None));
        round.rated_ind = 1;
        self.put_round(round)
    }

    fn put_result(&self, result: LongCompResult) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.results
            .write()
            .insert((result.round_id, result.coder_id), result);
        Ok(())
    }

    fn get_result(&self, round_id: RoundId, coder_id: CoderId) -> Result<Option<LongCompResult>> {
        Ok(self.results.read().get(&(round_id, coder_id)).cloned())
    }

    fn results_for_round(&self, round_id: RoundId) -> Result<Vec<LongCompResult>> {
        Ok(self
            .results
            .read()
            .range((round_id, CoderId::MIN)..=(round_id, CoderId::MAX))
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn unrated_results(&self, round_id: RoundId) -> Result<Vec<LongCompResult>> {
        let mut rows: Vec<LongCompResult> = self
            .results_for_round(round_id)?
            .into_iter()
            .filter(LongCompResult::awaiting_rating)
            .collect();
        order_by_score_desc(&mut rows);
        Ok(rows)
    }

    fn get_algo_rating(
        &self,
        coder_id: CoderId,
        algo_rating_type_id: i32,
    ) -> Result<Option<AlgoRating>> {
        Ok(self
            .algo_ratings
            .read()
            .get(&(coder_id, algo_rating_type_id))
            .cloned())
    }

    fn put_algo_rating(&self, rating: AlgoRating) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.algo_ratings
            .write()
            .insert((rating.coder_id, rating.algo_rating_type_id), rating);
        Ok(())
    }
}
