use crate::{CoderId, RoundId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Attendance flag on a round result. The stored column is a single
/// character; anything other than `Y`/`N` is carried as `Unknown`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Attendance {
    Attended,
    Absent,
    Unknown,
}

impl Attendance {
    pub fn from_flag(flag: char) -> Self {
        match flag {
            'Y' | 'y' => Attendance::Attended,
            'N' | 'n' => Attendance::Absent,
            _ => Attendance::Unknown,
        }
    }

    pub fn as_flag(self) -> Option<char> {
        match self {
            Attendance::Attended => Some('Y'),
            Attendance::Absent => Some('N'),
            Attendance::Unknown => None,
        }
    }

    pub fn is_attended(self) -> bool {
        matches!(self, Attendance::Attended)
    }
}

/// One participant's outcome in one round, keyed by `(round_id, coder_id)`.
///
/// Created externally when a contestant enters; the rating pipeline mutates
/// it once, filling the old/new rating pairs and the per-row rated flag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LongCompResult {
    pub round_id: RoundId,
    pub coder_id: CoderId,
    pub attended: Attendance,
    /// Raw score, fixed-point so tied results compare exactly.
    pub system_point_total: Decimal,
    pub old_rating: Option<i32>,
    pub old_vol: Option<i32>,
    pub new_rating: Option<i32>,
    pub new_vol: Option<i32>,
    pub rated_ind: i32,
}

impl LongCompResult {
    pub fn new(round_id: RoundId, coder_id: CoderId, score: Decimal) -> Self {
        Self {
            round_id,
            coder_id,
            attended: Attendance::Unknown,
            system_point_total: score,
            old_rating: None,
            old_vol: None,
            new_rating: None,
            new_vol: None,
            rated_ind: 0,
        }
    }

    /// Rows the loader selects: attended, with no result written yet.
    pub fn awaiting_rating(&self) -> bool {
        self.attended.is_attended() && self.new_rating.is_none() && self.new_vol.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendance_flag_round_trip() {
        assert_eq!(Attendance::from_flag('Y'), Attendance::Attended);
        assert_eq!(Attendance::from_flag('y'), Attendance::Attended);
        assert_eq!(Attendance::from_flag('N'), Attendance::Absent);
        assert_eq!(Attendance::from_flag(' '), Attendance::Unknown);
        assert_eq!(Attendance::Attended.as_flag(), Some('Y'));
        assert_eq!(Attendance::Unknown.as_flag(), None);
    }

    #[test]
    fn awaiting_rating_requires_attendance_and_empty_result() {
        let mut row = LongCompResult::new(1, 7, Decimal::new(5000, 2));
        assert!(!row.awaiting_rating());

        row.attended = Attendance::Attended;
        assert!(row.awaiting_rating());

        row.new_rating = Some(1300);
        row.new_vol = Some(400);
        assert!(!row.awaiting_rating());
    }
}
