//! In-process implementation of the ledger ports.
//! Backs the test-suite and `serve --in-memory`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    BalanceSnapshot, DayWindow, GameResult, GameStats, KindTotals, Transaction,
    TransactionStatus,
};
use crate::ports::{
    RepositoryError, RepositoryResult, SnapshotRepository, SortOrder, TransactionFilter,
    TransactionRepository,
};

#[derive(Default)]
struct MemoryState {
    transactions: Vec<Transaction>,
    snapshots: BTreeMap<(String, NaiveDate), BalanceSnapshot>,
    games: Vec<GameResult>,
}

impl MemoryState {
    fn check_unique_ref(&self, tx: &Transaction) -> RepositoryResult<()> {
        if let Some(reference) = &tx.external_payment_ref {
            if self
                .transactions
                .iter()
                .any(|t| t.external_payment_ref.as_ref() == Some(reference))
            {
                return Err(RepositoryError::Conflict(format!(
                    "external payment ref '{}' already recorded",
                    reference
                )));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<MemoryState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryLedgerStore {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut state = self.state.write().await;
        state.check_unique_ref(tx)?;
        state.transactions.push(tx.clone());
        Ok(tx.clone())
    }

    async fn find(&self, filter: &TransactionFilter) -> RepositoryResult<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut rows: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect();

        match filter.order {
            Some(SortOrder::OldestFirst) => rows.sort_by_key(|tx| tx.created_at),
            Some(SortOrder::NewestFirst) => {
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at))
            }
            None => {}
        }
        if let Some(limit) = filter.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(0));
        }

        Ok(rows)
    }

    async fn find_by_external_ref(&self, reference: &str) -> RepositoryResult<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .find(|tx| tx.external_payment_ref.as_deref() == Some(reference))
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        webhook_received: bool,
    ) -> RepositoryResult<Option<Transaction>> {
        let mut state = self.state.write().await;
        let Some(tx) = state
            .transactions
            .iter_mut()
            .find(|tx| tx.id == id && tx.status == TransactionStatus::Pending)
        else {
            return Ok(None);
        };

        tx.status = status;
        tx.webhook_received = tx.webhook_received || webhook_received;
        tx.updated_at = Utc::now();
        Ok(Some(tx.clone()))
    }

    async fn active_users(&self, window: DayWindow) -> RepositoryResult<Vec<String>> {
        let state = self.state.read().await;
        let users: BTreeSet<String> = state
            .transactions
            .iter()
            .filter(|tx| tx.is_completed() && window.contains(tx.created_at))
            .map(|tx| tx.user_id.clone())
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn first_transaction(&self, user_id: &str) -> RepositoryResult<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .min_by_key(|tx| tx.created_at)
            .cloned())
    }

    async fn kind_totals(&self, user_id: &str) -> RepositoryResult<KindTotals> {
        let state = self.state.read().await;
        Ok(KindTotals::from_transactions(
            state.transactions.iter().filter(|tx| tx.user_id == user_id),
        ))
    }

    async fn insert_game_outcome(
        &self,
        game: &GameResult,
        tx: &Transaction,
    ) -> RepositoryResult<Transaction> {
        let mut state = self.state.write().await;
        state.check_unique_ref(tx)?;
        state.games.push(game.clone());
        state.transactions.push(tx.clone());
        Ok(tx.clone())
    }

    async fn game_stats(&self, user_id: &str) -> RepositoryResult<GameStats> {
        let state = self.state.read().await;
        Ok(state
            .games
            .iter()
            .filter(|game| game.user_id == user_id)
            .fold(GameStats::default(), |mut stats, game| {
                stats.games_played += 1;
                stats.total_bet_amount += game.bet_amount.clone();
                stats.total_payout += game.payout.clone();
                stats
            }))
    }

    async fn recent_games(&self, user_id: &str, limit: i64) -> RepositoryResult<Vec<GameResult>> {
        let state = self.state.read().await;
        let mut games: Vec<GameResult> = state
            .games
            .iter()
            .filter(|game| game.user_id == user_id)
            .cloned()
            .collect();
        // Later inserts win timestamp ties.
        games.reverse();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        games.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(games)
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryLedgerStore {
    async fn upsert(
        &self,
        user_id: &str,
        date: NaiveDate,
        balance: &BigDecimal,
    ) -> RepositoryResult<BalanceSnapshot> {
        let snapshot = BalanceSnapshot {
            user_id: user_id.to_string(),
            date,
            balance: balance.clone(),
            updated_at: Utc::now(),
        };
        let mut state = self.state.write().await;
        state
            .snapshots
            .insert((user_id.to_string(), date), snapshot.clone());
        Ok(snapshot)
    }

    async fn find_latest(
        &self,
        user_id: &str,
        before: Option<NaiveDate>,
    ) -> RepositoryResult<Option<BalanceSnapshot>> {
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .values()
            .filter(|s| s.user_id == user_id && before.map_or(true, |b| s.date < b))
            .max_by_key(|s| s.date)
            .cloned())
    }

    async fn list_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<BalanceSnapshot>> {
        let state = self.state.read().await;
        let mut rows: Vec<BalanceSnapshot> = state
            .snapshots
            .values()
            .filter(|s| s.user_id == user_id && s.date >= from && s.date <= to)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }
}
