//! Store ports consumed by the ledger services.
//! Adapters live in `crate::adapters`; services only ever see these traits.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    BalanceSnapshot, DayWindow, GameResult, GameStats, KindTotals, Transaction,
    TransactionStatus,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row that cannot be mapped onto the closed domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    OldestFirst,
    NewestFirst,
}

/// Selection over the transaction log. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub user_id: Option<String>,
    pub status: Option<TransactionStatus>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
    pub order: Option<SortOrder>,
    pub limit: Option<i64>,
}

impl TransactionFilter {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn completed(mut self) -> Self {
        self.status = Some(TransactionStatus::Completed);
        self
    }

    pub fn within(mut self, window: DayWindow) -> Self {
        self.created_from = Some(window.start);
        self.created_before = Some(window.end);
        self
    }

    pub fn created_from(mut self, from: Option<DateTime<Utc>>) -> Self {
        self.created_from = from;
        self
    }

    pub fn created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }

    pub fn ordered(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.user_id.as_deref().map_or(true, |u| tx.user_id == u)
            && self.status.map_or(true, |s| tx.status == s)
            && self.created_from.map_or(true, |from| tx.created_at >= from)
            && self.created_before.map_or(true, |before| tx.created_at < before)
    }
}

/// Append-only transaction log.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Fails with `Conflict` when `external_payment_ref` is already taken.
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn find(&self, filter: &TransactionFilter) -> RepositoryResult<Vec<Transaction>>;

    async fn find_by_external_ref(&self, reference: &str) -> RepositoryResult<Option<Transaction>>;

    /// Moves a PENDING row to `status`. Returns `None` when the row is not
    /// PENDING any more (or does not exist), leaving it untouched.
    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        webhook_received: bool,
    ) -> RepositoryResult<Option<Transaction>>;

    /// Distinct users with at least one COMPLETED transaction in `window`.
    async fn active_users(&self, window: DayWindow) -> RepositoryResult<Vec<String>>;

    /// Earliest transaction of the user in any status.
    async fn first_transaction(&self, user_id: &str) -> RepositoryResult<Option<Transaction>>;

    /// Lifetime totals per kind over COMPLETED transactions.
    async fn kind_totals(&self, user_id: &str) -> RepositoryResult<KindTotals>;

    /// Stores the game result and its balance-moving transaction atomically.
    async fn insert_game_outcome(
        &self,
        game: &GameResult,
        tx: &Transaction,
    ) -> RepositoryResult<Transaction>;

    async fn game_stats(&self, user_id: &str) -> RepositoryResult<GameStats>;

    /// The user's latest game results, newest first.
    async fn recent_games(&self, user_id: &str, limit: i64) -> RepositoryResult<Vec<GameResult>>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

/// One closing balance per `(user, date)`.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn upsert(
        &self,
        user_id: &str,
        date: NaiveDate,
        balance: &BigDecimal,
    ) -> RepositoryResult<BalanceSnapshot>;

    /// Latest snapshot strictly before `before`, or the latest overall when `None`.
    async fn find_latest(
        &self,
        user_id: &str,
        before: Option<NaiveDate>,
    ) -> RepositoryResult<Option<BalanceSnapshot>>;

    /// Snapshots dated within `[from, to]`, most recent first.
    async fn list_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<BalanceSnapshot>>;
}
