use crate::RoundId;
use serde::{Deserialize, Serialize};

/// A single rated marathon contest instance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Round {
    pub round_id: RoundId,
    /// 0 = unrated, 1 = rated. Flipped to 1 exactly once, after every
    /// participant of the round has been written back.
    pub rated_ind: i32,
    /// Legacy contest id autopilot notifications use to locate the round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contest_id: Option<i64>,
}

impl Round {
    pub fn new(round_id: RoundId, contest_id: Option<i64>) -> Self {
        Self {
            round_id,
            rated_ind: 0,
            contest_id,
        }
    }

    pub fn is_rated(&self) -> bool {
        self.rated_ind == 1
    }
}
