use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::domain::day::{next_day, start_of_day};
use crate::domain::{net_delta, BalanceSnapshot, DayWindow};
use crate::error::AppError;
use crate::ports::{SnapshotRepository, TransactionFilter, TransactionRepository};
use crate::services::locks::UserLocks;
use crate::services::snapshot_writer::SnapshotWriter;

/// Computes a user's closing balance for one day and persists it.
pub struct DailyAggregator {
    transactions: Arc<dyn TransactionRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    writer: SnapshotWriter,
    locks: UserLocks,
}

impl DailyAggregator {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        locks: UserLocks,
    ) -> Self {
        Self {
            transactions,
            writer: SnapshotWriter::new(snapshots.clone()),
            snapshots,
            locks,
        }
    }

    /// Closing balance of `user_id` at the end of `date`.
    ///
    /// Seeds from the latest snapshot before `date` (zero when there is none)
    /// and nets every COMPLETED transaction from the day after that snapshot
    /// through `date`. When the previous day is snapshotted this is exactly
    /// `snapshot(date - 1) + delta(date)`. Deterministic for an unchanged
    /// transaction set, so re-running for the same day is safe.
    pub async fn compute_daily_balance(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<BalanceSnapshot, AppError> {
        let _guard = self.locks.acquire(user_id).await;

        let seed = self.snapshots.find_latest(user_id, Some(date)).await?;
        let (seed_balance, replay_from) = match &seed {
            Some(snapshot) => (snapshot.balance.clone(), Some(start_of_day(next_day(snapshot.date)))),
            None => (BigDecimal::from(0), None),
        };

        let filter = TransactionFilter::for_user(user_id)
            .completed()
            .created_from(replay_from)
            .created_before(DayWindow::for_date(date).end);
        let completed = self.transactions.find(&filter).await?;
        let delta = net_delta(&completed);
        let balance = seed_balance + delta.clone();

        let snapshot = self.writer.write(user_id, date, &balance).await?;

        tracing::info!(
            user_id = %user_id,
            date = %date,
            seed_date = ?seed.as_ref().map(|s| s.date),
            transactions = completed.len(),
            delta = %delta,
            balance = %balance,
            "Updated daily balance"
        );

        Ok(snapshot)
    }
}
