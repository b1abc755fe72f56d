use balance_ledger::adapters::PostgresLedgerStore;
use balance_ledger::domain::{
    DayWindow, GameResult, Transaction, TransactionKind, TransactionStatus,
};
use balance_ledger::ports::{
    RepositoryError, SnapshotRepository, SortOrder, TransactionFilter, TransactionRepository,
};
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, TimeZone, Utc};
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

async fn setup_store() -> Option<PostgresLedgerStore> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            println!("Skipping Postgres store test: DATABASE_URL not set");
            return None;
        }
    };

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");
    let migrator = Migrator::new(Path::join(Path::new(env!("CARGO_MANIFEST_DIR")), "migrations"))
        .await
        .expect("Failed to load migrations");
    migrator.run(&pool).await.expect("Failed to run migrations");

    Some(PostgresLedgerStore::new(pool))
}

fn unique_user() -> String {
    format!("pg-test-{}", Uuid::new_v4())
}

#[tokio::test]
async fn test_transaction_round_trip_and_filters() {
    let Some(store) = setup_store().await else { return };
    let user = unique_user();
    let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();

    let mut win = Transaction::new(
        user.clone(),
        TransactionKind::GameWin,
        BigDecimal::from_str("12.34567890").unwrap(),
        Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap(),
    );
    win.status = TransactionStatus::Completed;
    store.insert(&win).await.unwrap();

    let pending = Transaction::new(
        user.clone(),
        TransactionKind::Deposit,
        BigDecimal::from(5),
        Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap(),
    )
    .with_external_ref(format!("ref-{}", Uuid::new_v4()));
    store.insert(&pending).await.unwrap();

    let completed = store
        .find(&TransactionFilter::for_user(&user).completed().within(DayWindow::for_date(day)))
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].amount, win.amount);

    let newest = store
        .find(&TransactionFilter::for_user(&user).ordered(SortOrder::NewestFirst).limit(1))
        .await
        .unwrap();
    assert_eq!(newest[0].id, pending.id);

    let users = store.active_users(DayWindow::for_date(day)).await.unwrap();
    assert!(users.contains(&user));

    let totals = store.kind_totals(&user).await.unwrap();
    assert_eq!(totals.wins, win.amount);
    assert_eq!(totals.deposits, BigDecimal::from(0));
}

#[tokio::test]
async fn test_status_update_is_guarded_on_pending() {
    let Some(store) = setup_store().await else { return };
    let reference = format!("ref-{}", Uuid::new_v4());
    let deposit = Transaction::new(unique_user(), TransactionKind::Deposit, BigDecimal::from(50), Utc::now())
        .with_external_ref(reference.clone());
    store.insert(&deposit).await.unwrap();

    let settled = store
        .update_status(deposit.id, TransactionStatus::Completed, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, TransactionStatus::Completed);
    assert!(settled.webhook_received);

    let again = store
        .update_status(deposit.id, TransactionStatus::Failed, true)
        .await
        .unwrap();
    assert!(again.is_none());

    let stored = store.find_by_external_ref(&reference).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);

    let mut duplicate = deposit.clone();
    duplicate.id = Uuid::new_v4();
    assert!(matches!(
        store.insert(&duplicate).await,
        Err(RepositoryError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_snapshot_upsert_and_queries() {
    let Some(store) = setup_store().await else { return };
    let user = unique_user();
    let d = |day| NaiveDate::from_ymd_opt(2024, 7, day).unwrap();

    store.upsert(&user, d(1), &BigDecimal::from(10)).await.unwrap();
    store.upsert(&user, d(2), &BigDecimal::from(20)).await.unwrap();
    store.upsert(&user, d(2), &BigDecimal::from(25)).await.unwrap();

    let latest = store.find_latest(&user, None).await.unwrap().unwrap();
    assert_eq!(latest.date, d(2));
    assert_eq!(latest.balance, BigDecimal::from(25));

    let before = store.find_latest(&user, Some(d(2))).await.unwrap().unwrap();
    assert_eq!(before.date, d(1));

    let range = store.list_range(&user, d(1), d(31)).await.unwrap();
    let dates: Vec<_> = range.iter().map(|s| s.date).collect();
    assert_eq!(dates, vec![d(2), d(1)]);
}

#[tokio::test]
async fn test_game_outcome_is_atomic() {
    let Some(store) = setup_store().await else { return };
    let user = unique_user();
    let now = Utc::now();
    let game = GameResult {
        id: Uuid::new_v4(),
        user_id: user.clone(),
        bet_amount: BigDecimal::from(3),
        prediction: 6,
        rolled: 6,
        payout: BigDecimal::from(15),
        is_win: true,
        created_at: now,
    };
    let tx = Transaction::new(user.clone(), TransactionKind::GameWin, BigDecimal::from(15), now);

    store.insert_game_outcome(&game, &tx).await.unwrap();

    let stats = store.game_stats(&user).await.unwrap();
    assert_eq!(stats.games_played, 1);
    assert_eq!(stats.total_payout, BigDecimal::from(15));
    assert!(store.first_transaction(&user).await.unwrap().is_some());

    let games = store.recent_games(&user, 10).await.unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].id, game.id);
    assert_eq!(games[0].payout, BigDecimal::from(15));
}
