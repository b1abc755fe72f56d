//! Postgres implementation of the ledger ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::{
    BalanceSnapshot, DayWindow, GameResult, GameStats, KindTotals, Transaction,
    TransactionKind, TransactionStatus,
};
use crate::ports::{
    RepositoryError, RepositoryResult, SnapshotRepository, SortOrder, TransactionFilter,
    TransactionRepository,
};

const TRANSACTION_COLUMNS: &str = "id, user_id, kind, amount, status, currency, \
    external_payment_ref, payment_url, description, webhook_received, created_at, updated_at";

/// Postgres-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresLedgerStore {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = insert_transaction(&self.pool, tx).await?;
        row.into_domain()
    }

    async fn find(&self, filter: &TransactionFilter) -> RepositoryResult<Vec<Transaction>> {
        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM transactions WHERE TRUE", TRANSACTION_COLUMNS));

        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.created_from {
            query.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(before) = filter.created_before {
            query.push(" AND created_at < ").push_bind(before);
        }
        match filter.order {
            Some(SortOrder::OldestFirst) => {
                query.push(" ORDER BY created_at ASC, id ASC");
            }
            Some(SortOrder::NewestFirst) => {
                query.push(" ORDER BY created_at DESC, id DESC");
            }
            None => {}
        }
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        let rows = query
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn find_by_external_ref(&self, reference: &str) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE external_payment_ref = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        webhook_received: bool,
    ) -> RepositoryResult<Option<Transaction>> {
        // The status guard makes the PENDING -> terminal move single-shot even
        // when duplicate notifications race.
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions
            SET status = $1, webhook_received = webhook_received OR $2, updated_at = NOW()
            WHERE id = $3 AND status = 'PENDING'
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(status.as_str())
        .bind(webhook_received)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn active_users(&self, window: DayWindow) -> RepositoryResult<Vec<String>> {
        let users = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT user_id FROM transactions
            WHERE status = 'COMPLETED'
            AND created_at >= $1
            AND created_at < $2
            ORDER BY user_id
            "#,
        )
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn first_transaction(&self, user_id: &str) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY created_at ASC LIMIT 1",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn kind_totals(&self, user_id: &str) -> RepositoryResult<KindTotals> {
        let rows: Vec<(String, BigDecimal)> = sqlx::query_as(
            r#"
            SELECT kind, SUM(amount) FROM transactions
            WHERE user_id = $1 AND status = 'COMPLETED'
            GROUP BY kind
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut totals = KindTotals::default();
        for (kind, sum) in rows {
            totals.add(parse_kind(&kind)?, &sum);
        }
        Ok(totals)
    }

    async fn insert_game_outcome(
        &self,
        game: &GameResult,
        tx: &Transaction,
    ) -> RepositoryResult<Transaction> {
        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO game_results (
                id, user_id, bet_amount, prediction, rolled, payout, is_win, transaction_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(game.id)
        .bind(&game.user_id)
        .bind(&game.bet_amount)
        .bind(game.prediction)
        .bind(game.rolled)
        .bind(&game.payout)
        .bind(game.is_win)
        .bind(tx.id)
        .bind(game.created_at)
        .execute(&mut *db_tx)
        .await?;

        let row = insert_transaction(&mut *db_tx, tx).await?;

        db_tx.commit().await?;
        row.into_domain()
    }

    async fn game_stats(&self, user_id: &str) -> RepositoryResult<GameStats> {
        let (games_played, total_bet_amount, total_payout): (i64, BigDecimal, BigDecimal) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*), COALESCE(SUM(bet_amount), 0), COALESCE(SUM(payout), 0)
                FROM game_results
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(GameStats {
            games_played,
            total_bet_amount,
            total_payout,
        })
    }

    async fn recent_games(&self, user_id: &str, limit: i64) -> RepositoryResult<Vec<GameResult>> {
        let rows = sqlx::query_as::<_, GameRow>(
            r#"
            SELECT id, user_id, bet_amount, prediction, rolled, payout, is_win, created_at
            FROM game_results
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(GameRow::into_domain).collect())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository for PostgresLedgerStore {
    async fn upsert(
        &self,
        user_id: &str,
        date: NaiveDate,
        balance: &BigDecimal,
    ) -> RepositoryResult<BalanceSnapshot> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            INSERT INTO balance_snapshots (user_id, date, balance, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, date)
            DO UPDATE SET balance = EXCLUDED.balance, updated_at = NOW()
            RETURNING user_id, date, balance, updated_at
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(balance)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_domain())
    }

    async fn find_latest(
        &self,
        user_id: &str,
        before: Option<NaiveDate>,
    ) -> RepositoryResult<Option<BalanceSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT user_id, date, balance, updated_at FROM balance_snapshots
            WHERE user_id = $1
            AND ($2::DATE IS NULL OR date < $2)
            ORDER BY date DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(before)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SnapshotRow::into_domain))
    }

    async fn list_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<BalanceSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT user_id, date, balance, updated_at FROM balance_snapshots
            WHERE user_id = $1 AND date >= $2 AND date <= $3
            ORDER BY date DESC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SnapshotRow::into_domain).collect())
    }
}

async fn insert_transaction<'e, E>(executor: E, tx: &Transaction) -> RepositoryResult<TransactionRow>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        INSERT INTO transactions (
            id, user_id, kind, amount, status, currency, external_payment_ref,
            payment_url, description, webhook_received, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(tx.id)
    .bind(&tx.user_id)
    .bind(tx.kind.as_str())
    .bind(&tx.amount)
    .bind(tx.status.as_str())
    .bind(&tx.currency)
    .bind(&tx.external_payment_ref)
    .bind(&tx.payment_url)
    .bind(&tx.description)
    .bind(tx.webhook_received)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

fn parse_kind(raw: &str) -> RepositoryResult<TransactionKind> {
    raw.parse()
        .map_err(|e: crate::domain::UnknownVariant| RepositoryError::Corrupt(e.to_string()))
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: String,
    kind: String,
    amount: BigDecimal,
    status: String,
    currency: Option<String>,
    external_payment_ref: Option<String>,
    payment_url: Option<String>,
    description: Option<String>,
    webhook_received: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let kind = parse_kind(&self.kind)?;
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            kind,
            amount: self.amount,
            status,
            currency: self.currency,
            external_payment_ref: self.external_payment_ref,
            payment_url: self.payment_url,
            description: self.description,
            webhook_received: self.webhook_received,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    user_id: String,
    date: NaiveDate,
    balance: BigDecimal,
    updated_at: DateTime<Utc>,
}

impl SnapshotRow {
    fn into_domain(self) -> BalanceSnapshot {
        BalanceSnapshot {
            user_id: self.user_id,
            date: self.date,
            balance: self.balance,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GameRow {
    id: Uuid,
    user_id: String,
    bet_amount: BigDecimal,
    prediction: i16,
    rolled: i16,
    payout: BigDecimal,
    is_win: bool,
    created_at: DateTime<Utc>,
}

impl GameRow {
    fn into_domain(self) -> GameResult {
        GameResult {
            id: self.id,
            user_id: self.user_id,
            bet_amount: self.bet_amount,
            prediction: self.prediction,
            rolled: self.rolled,
            payout: self.payout,
            is_win: self.is_win,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str, status: &str) -> TransactionRow {
        TransactionRow {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            kind: kind.to_string(),
            amount: BigDecimal::from(10),
            status: status.to_string(),
            currency: None,
            external_payment_ref: None,
            payment_url: None,
            description: None,
            webhook_received: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_maps_onto_domain() {
        let tx = row("GAME_LOSS", "COMPLETED").into_domain().unwrap();
        assert_eq!(tx.kind, TransactionKind::GameLoss);
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_unknown_kind_is_corrupt_not_ignored() {
        assert!(matches!(
            row("JACKPOT", "COMPLETED").into_domain(),
            Err(RepositoryError::Corrupt(_))
        ));
        assert!(matches!(
            row("DEPOSIT", "REVERSED").into_domain(),
            Err(RepositoryError::Corrupt(_))
        ));
    }
}
