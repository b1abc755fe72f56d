use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::domain::day::{next_day, start_of_day};
use crate::domain::{net_delta, DayWindow, GameResult, KindTotals, Transaction};
use crate::error::AppError;
use crate::ports::{SnapshotRepository, SortOrder, TransactionFilter, TransactionRepository};
use crate::validation::validate_history_days;

pub const RECENT_HISTORY_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub balance: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedBalance {
    pub current_balance: BigDecimal,
    pub today_transactions: usize,
    pub today_totals: KindTotals,
    pub net_change: BigDecimal,
    pub recent_history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserBalanceStats {
    pub current_balance: BigDecimal,
    pub total_deposits: BigDecimal,
    pub total_withdrawals: BigDecimal,
    pub total_wins: BigDecimal,
    pub total_losses: BigDecimal,
    pub total_bonuses: BigDecimal,
    pub total_refunds: BigDecimal,
    pub net_gambling: BigDecimal,
    pub member_since: Option<DateTime<Utc>>,
    pub games_played: i64,
    pub total_bet_amount: BigDecimal,
    pub total_payout: BigDecimal,
}

impl UserBalanceStats {
    fn empty() -> Self {
        let zero = || BigDecimal::from(0);
        Self {
            current_balance: zero(),
            total_deposits: zero(),
            total_withdrawals: zero(),
            total_wins: zero(),
            total_losses: zero(),
            total_bonuses: zero(),
            total_refunds: zero(),
            net_gambling: zero(),
            member_since: None,
            games_played: 0,
            total_bet_amount: zero(),
            total_payout: zero(),
        }
    }
}

/// Read side of the ledger. Never writes and never takes a user lock, so
/// queries run alongside aggregation without waiting on it.
pub struct BalanceResolver {
    transactions: Arc<dyn TransactionRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    clock: Arc<dyn Clock>,
}

impl BalanceResolver {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transactions,
            snapshots,
            clock,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Latest closed-day snapshot plus every COMPLETED transaction since.
    ///
    /// A snapshot dated today is not used as the base: today's transactions
    /// are added live and would otherwise be counted twice. If the base is
    /// older than yesterday the missing days are netted here without being
    /// written back.
    pub async fn current_balance(&self, user_id: &str) -> Result<BigDecimal, AppError> {
        let today = self.today();
        let base = self.snapshots.find_latest(user_id, Some(today)).await?;

        if let Some(snapshot) = &base {
            let missing_days = (today - snapshot.date).num_days() - 1;
            if missing_days > 0 {
                tracing::warn!(
                    user_id = %user_id,
                    snapshot_date = %snapshot.date,
                    missing_days,
                    "Latest snapshot is stale; netting unsnapshotted days live"
                );
            }
        }
        let replay_from = base.as_ref().map(|snapshot| next_day(snapshot.date));

        let filter = TransactionFilter::for_user(user_id)
            .completed()
            .created_from(replay_from.map(start_of_day))
            .created_before(DayWindow::for_date(today).end);
        let completed = self.transactions.find(&filter).await?;

        let base_balance = base.map(|s| s.balance).unwrap_or_else(|| BigDecimal::from(0));
        Ok(base_balance + net_delta(&completed))
    }

    /// COMPLETED transactions created today, oldest first.
    pub async fn today_transactions(&self, user_id: &str) -> Result<Vec<Transaction>, AppError> {
        let filter = TransactionFilter::for_user(user_id)
            .completed()
            .within(DayWindow::for_date(self.today()))
            .ordered(SortOrder::OldestFirst);
        Ok(self.transactions.find(&filter).await?)
    }

    /// Newest-first slice of the user's log in any status (payment history).
    pub async fn recent_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        let filter = TransactionFilter::for_user(user_id)
            .ordered(SortOrder::NewestFirst)
            .limit(limit.max(1));
        Ok(self.transactions.find(&filter).await?)
    }

    /// Newest-first slice of the user's settled dice rounds.
    pub async fn recent_games(&self, user_id: &str, limit: i64) -> Result<Vec<GameResult>, AppError> {
        Ok(self.transactions.recent_games(user_id, limit.max(1)).await?)
    }

    pub async fn detailed_balance(&self, user_id: &str) -> Result<DetailedBalance, AppError> {
        let current_balance = self.current_balance(user_id).await?;
        let today = self.today_transactions(user_id).await?;
        let history = self.balance_history(user_id, RECENT_HISTORY_DAYS).await?;

        let today_totals = KindTotals::from_transactions(&today);
        Ok(DetailedBalance {
            current_balance,
            today_transactions: today.len(),
            net_change: today_totals.net(),
            today_totals,
            recent_history: history
                .into_iter()
                .take(RECENT_HISTORY_DAYS as usize)
                .map(|s| HistoryEntry {
                    date: s.date,
                    balance: s.balance,
                })
                .collect(),
        })
    }

    /// Snapshots from the last `days` days (today included), most recent first.
    pub async fn balance_history(
        &self,
        user_id: &str,
        days: i64,
    ) -> Result<Vec<crate::domain::BalanceSnapshot>, AppError> {
        validate_history_days(days)?;
        let today = self.today();
        let from = today - Duration::days(days);
        Ok(self.snapshots.list_range(user_id, from, today).await?)
    }

    pub async fn user_stats(&self, user_id: &str) -> Result<UserBalanceStats, AppError> {
        let Some(first) = self.transactions.first_transaction(user_id).await? else {
            return Ok(UserBalanceStats::empty());
        };

        let totals = self.transactions.kind_totals(user_id).await?;
        let games = self.transactions.game_stats(user_id).await?;
        let current_balance = self.current_balance(user_id).await?;

        Ok(UserBalanceStats {
            current_balance,
            net_gambling: totals.wins.clone() - totals.losses.clone(),
            total_deposits: totals.deposits,
            total_withdrawals: totals.withdrawals,
            total_wins: totals.wins,
            total_losses: totals.losses,
            total_bonuses: totals.bonuses,
            total_refunds: totals.refunds,
            member_since: Some(first.created_at),
            games_played: games.games_played,
            total_bet_amount: games.total_bet_amount,
            total_payout: games.total_payout,
        })
    }
}
