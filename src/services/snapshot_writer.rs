use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::domain::BalanceSnapshot;
use crate::error::AppError;
use crate::ports::SnapshotRepository;

/// Sole write path for balance snapshots.
#[derive(Clone)]
pub struct SnapshotWriter {
    snapshots: Arc<dyn SnapshotRepository>,
}

impl SnapshotWriter {
    pub fn new(snapshots: Arc<dyn SnapshotRepository>) -> Self {
        Self { snapshots }
    }

    /// Upserts `(user_id, date) -> balance`. Re-writing the same value is a no-op
    /// in effect, so retries never duplicate a row.
    pub async fn write(
        &self,
        user_id: &str,
        date: NaiveDate,
        balance: &BigDecimal,
    ) -> Result<BalanceSnapshot, AppError> {
        let snapshot = self.snapshots.upsert(user_id, date, balance).await?;
        tracing::debug!(user_id = %user_id, date = %date, balance = %balance, "Snapshot upserted");
        Ok(snapshot)
    }
}
