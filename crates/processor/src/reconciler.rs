//! Attendance reconciliation against the submission catalogue.

use anyhow::Result;
use marathon_clients::SubmissionCatalog;
use marathon_storage::Storage;
use marathon_types::{Attendance, RoundId};
use tracing::{info, warn};

/// Flip `attended` to `Y` for every round participant whose latest
/// submission carries a review summation. Catalogue unavailability is
/// logged and swallowed; the round proceeds with whatever attendance data
/// already exists. Store errors still propagate.
pub async fn reconcile_attendance(
    storage: &dyn Storage,
    catalog: &dyn SubmissionCatalog,
    round_id: RoundId,
    challenge_id: &str,
) -> Result<()> {
    let members = match catalog.reviewed_members(challenge_id).await {
        Ok(members) => members,
        Err(err) => {
            warn!(
                "Submission catalogue unavailable for challenge {}, keeping existing attendance: {:#}",
                challenge_id, err
            );
            return Ok(());
        }
    };

    let mut flipped = 0usize;
    for coder_id in members {
        if let Some(mut row) = storage.get_result(round_id, coder_id)? {
            if row.attended == Attendance::Absent {
                row.attended = Attendance::Attended;
                storage.put_result(row)?;
                flipped += 1;
            }
        }
    }

    if flipped > 0 {
        info!(
            "Attendance reconciled for round {}: {} coder(s) flipped to attended",
            round_id, flipped
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use marathon_storage::MemoryStorage;
    use marathon_types::{CoderId, LongCompResult};
    use rust_decimal::Decimal;

    struct StaticCatalog(Vec<CoderId>);

    #[async_trait]
    impl SubmissionCatalog for StaticCatalog {
        async fn reviewed_members(&self, _challenge_id: &str) -> Result<Vec<CoderId>> {
            Ok(self.0.clone())
        }
    }

    struct FailingCatalog;

    #[async_trait]
    impl SubmissionCatalog for FailingCatalog {
        async fn reviewed_members(&self, _challenge_id: &str) -> Result<Vec<CoderId>> {
            Err(anyhow!("submission service unreachable"))
        }
    }

    fn seed(storage: &MemoryStorage, coder_id: CoderId, attended: Attendance) {
        let mut row = LongCompResult::new(900, coder_id, Decimal::new(5000, 2));
        row.attended = attended;
        storage.put_result(row).expect("seed");
    }

    #[tokio::test]
    async fn flips_absent_rows_with_reviewed_submissions() {
        let storage = MemoryStorage::new();
        seed(&storage, 1, Attendance::Absent);
        seed(&storage, 2, Attendance::Absent);
        seed(&storage, 3, Attendance::Attended);

        // Coder 2 has no reviewed submission; coder 99 never entered.
        let catalog = StaticCatalog(vec![1, 3, 99]);
        reconcile_attendance(&storage, &catalog, 900, "c-900")
            .await
            .expect("reconcile");

        let attended = |coder: CoderId| {
            storage
                .get_result(900, coder)
                .expect("get")
                .expect("row")
                .attended
        };
        assert_eq!(attended(1), Attendance::Attended);
        assert_eq!(attended(2), Attendance::Absent);
        assert_eq!(attended(3), Attendance::Attended);
    }

    #[tokio::test]
    async fn catalogue_failure_is_swallowed() {
        let storage = MemoryStorage::new();
        seed(&storage, 1, Attendance::Absent);

        reconcile_attendance(&storage, &FailingCatalog, 900, "c-900")
            .await
            .expect("failure must be swallowed");

        let row = storage.get_result(900, 1).expect("get").expect("row");
        assert_eq!(row.attended, Attendance::Absent);
    }
}
