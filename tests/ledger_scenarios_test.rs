use balance_ledger::adapters::InMemoryLedgerStore;
use balance_ledger::clock::FixedClock;
use balance_ledger::domain::{
    net_delta, SettlementNotification, SettlementOutcome, Transaction, TransactionKind,
    TransactionStatus,
};
use balance_ledger::error::AppError;
use balance_ledger::ports::{SnapshotRepository, TransactionRepository};
use balance_ledger::{AppState, LedgerOptions};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use cron::Schedule;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

struct Ledger {
    store: Arc<InMemoryLedgerStore>,
    clock: Arc<FixedClock>,
    state: AppState,
}

fn ledger_at(now: DateTime<Utc>) -> Ledger {
    let store = Arc::new(InMemoryLedgerStore::new());
    let clock = Arc::new(FixedClock::new(now));
    let state = AppState::new(
        store.clone(),
        store.clone(),
        clock.clone(),
        LedgerOptions {
            schedule: Schedule::from_str("0 5 0 * * *").unwrap(),
            batch_concurrency: 4,
            ipn_secret: None,
        },
    );
    Ledger { store, clock, state }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
}

async fn record(
    store: &InMemoryLedgerStore,
    user: &str,
    kind: TransactionKind,
    amount: &str,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
) -> Transaction {
    let mut tx = Transaction::new(
        user.to_string(),
        kind,
        BigDecimal::from_str(amount).unwrap(),
        created_at,
    );
    tx.status = status;
    store.insert(&tx).await.unwrap()
}

#[tokio::test]
async fn test_user_without_history_gets_zeroes() {
    let ledger = ledger_at(at(day(2024, 3, 1), 12));

    let balance = ledger.state.resolver.current_balance("nobody").await.unwrap();
    assert_eq!(balance, BigDecimal::from(0));

    let stats = ledger.state.resolver.user_stats("nobody").await.unwrap();
    assert_eq!(stats.total_deposits, BigDecimal::from(0));
    assert_eq!(stats.games_played, 0);
    assert!(stats.member_since.is_none());

    let detailed = ledger.state.resolver.detailed_balance("nobody").await.unwrap();
    assert_eq!(detailed.today_transactions, 0);
    assert!(detailed.recent_history.is_empty());
}

#[tokio::test]
async fn test_same_day_deposit_and_loss() {
    let today = day(2024, 3, 1);
    let ledger = ledger_at(at(today, 18));
    record(&ledger.store, "u1", TransactionKind::Deposit, "100", TransactionStatus::Completed, at(today, 9)).await;
    record(&ledger.store, "u1", TransactionKind::GameLoss, "30", TransactionStatus::Completed, at(today, 10)).await;

    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(70));

    let report = ledger.state.scheduler.trigger(None, None).await.unwrap();
    assert_eq!(report.users_processed, 1);

    let snapshot = ledger.store.find_latest("u1", None).await.unwrap().unwrap();
    assert_eq!(snapshot.date, today);
    assert_eq!(snapshot.balance, BigDecimal::from(70));

    // A mid-day snapshot for today must not be added on top of today's rows.
    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(70));

    ledger.clock.set(at(day(2024, 3, 2), 0) + Duration::minutes(5));
    let nightly = ledger.state.scheduler.run_scheduled().await.unwrap();
    assert_eq!(nightly.date, today);
    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(70));
}

#[tokio::test]
async fn test_activity_in_the_last_minute_survives_the_nightly_pass() {
    let today = day(2024, 3, 1);
    let ledger = ledger_at(at(today, 9));
    record(&ledger.store, "u1", TransactionKind::Deposit, "100", TransactionStatus::Completed, at(today, 9)).await;

    // A manual recompute late in the day snapshots an open day.
    ledger.clock.set(at(today, 23) + Duration::minutes(59));
    ledger.state.scheduler.trigger(None, None).await.unwrap();

    let late = at(today, 23) + Duration::seconds(59 * 60 + 30);
    record(&ledger.store, "u1", TransactionKind::GameWin, "500", TransactionStatus::Completed, late).await;
    ledger.clock.set(late + Duration::seconds(15));
    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(600));

    ledger.clock.set(at(day(2024, 3, 2), 0) + Duration::minutes(5));
    let report = ledger.state.scheduler.run_scheduled().await.unwrap();
    assert_eq!(report.date, today);

    let snapshot = ledger.store.find_latest("u1", None).await.unwrap().unwrap();
    assert_eq!(snapshot.date, today);
    assert_eq!(snapshot.balance, BigDecimal::from(600));

    ledger.clock.set(at(day(2024, 3, 2), 10));
    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(600));
}

#[tokio::test]
async fn test_second_day_chains_from_snapshot_and_live_read_agrees() {
    let day1 = day(2024, 3, 1);
    let day2 = day(2024, 3, 2);
    let ledger = ledger_at(at(day2, 15));
    ledger.store.upsert("u1", day1, &BigDecimal::from(70)).await.unwrap();
    record(&ledger.store, "u1", TransactionKind::GameWin, "20", TransactionStatus::Completed, at(day2, 9)).await;
    record(&ledger.store, "u1", TransactionKind::Withdrawal, "10", TransactionStatus::Completed, at(day2, 11)).await;

    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(80));

    let report = ledger.state.scheduler.trigger(Some("u1"), Some(day2)).await.unwrap();
    assert_eq!(report.balance, Some(BigDecimal::from(80)));
}

#[tokio::test]
async fn test_pending_deposit_counts_only_after_settlement_and_rerun() {
    let yesterday = day(2024, 3, 1);
    let today = day(2024, 3, 2);
    let ledger = ledger_at(at(today, 12));
    ledger.store.upsert("u1", yesterday, &BigDecimal::from(10)).await.unwrap();

    let deposit = Transaction::new("u1".into(), TransactionKind::Deposit, BigDecimal::from(50), at(today, 8))
        .with_external_ref("inv-50".to_string());
    ledger.store.insert(&deposit).await.unwrap();

    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(10));
    let before = ledger.state.scheduler.trigger(Some("u1"), Some(today)).await.unwrap();
    assert_eq!(before.balance, Some(BigDecimal::from(10)));

    ledger
        .state
        .reconciler
        .apply_settlement(SettlementNotification {
            external_ref: "inv-50".into(),
            outcome: SettlementOutcome::Success,
            raw_provider_payload: json!({"invoice_id": "inv-50", "payment_status": "finished"}),
        })
        .await
        .unwrap();

    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(60));
    let after = ledger.state.scheduler.trigger(Some("u1"), Some(today)).await.unwrap();
    assert_eq!(after.balance, Some(BigDecimal::from(60)));
}

#[tokio::test]
async fn test_history_over_365_days_is_rejected() {
    let ledger = ledger_at(at(day(2024, 3, 1), 12));
    let result = ledger.state.resolver.balance_history("u1", 400).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_settlement_is_idempotent() {
    let ledger = ledger_at(at(day(2024, 3, 1), 12));
    let deposit = Transaction::new("u1".into(), TransactionKind::Deposit, BigDecimal::from(5), at(day(2024, 3, 1), 9))
        .with_external_ref("inv-twice".to_string());
    ledger.store.insert(&deposit).await.unwrap();

    let notification = SettlementNotification {
        external_ref: "inv-twice".into(),
        outcome: SettlementOutcome::Success,
        raw_provider_payload: json!({}),
    };
    let first = ledger.state.reconciler.apply_settlement(notification.clone()).await.unwrap();
    let second = ledger.state.reconciler.apply_settlement(notification).await.unwrap();

    assert!(first.applied);
    assert!(!second.applied);
    assert_eq!(first.transaction.status, TransactionStatus::Completed);
    assert_eq!(second.transaction.status, TransactionStatus::Completed);
    assert_eq!(first.transaction.id, second.transaction.id);
}

/// Deterministic pseudo-random activity over two weeks, with PENDING and
/// FAILED rows mixed in.
async fn seed_activity(store: &InMemoryLedgerStore, first: NaiveDate, days: i64) -> Vec<Transaction> {
    const KINDS: [TransactionKind; 6] = TransactionKind::ALL;
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    let mut all = Vec::new();
    for offset in 0..days {
        let date = first + Duration::days(offset);
        for hour in 0..(next() % 5) as u32 {
            let kind = KINDS[(next() % KINDS.len() as u64) as usize];
            let status = match next() % 7 {
                0 => TransactionStatus::Pending,
                1 => TransactionStatus::Failed,
                _ => TransactionStatus::Completed,
            };
            let amount = format!("{}.{:02}", 1 + next() % 200, next() % 100);
            all.push(record(store, "u1", kind, &amount, status, at(date, hour * 4 + 1)).await);
        }
    }
    all
}

#[tokio::test]
async fn test_daily_chaining_equals_full_replay() {
    let first = day(2024, 2, 1);
    let last = day(2024, 2, 14);
    let ledger = ledger_at(at(last, 23));
    let all = seed_activity(&ledger.store, first, 14).await;

    // Additivity: chained daily closes end at the direct net of every row.
    let reports = ledger.state.scheduler.backfill(first, Some(last)).await.unwrap();
    assert!(reports.iter().all(|r| r.is_clean()));
    let chained = ledger.store.find_latest("u1", None).await.unwrap().unwrap();
    assert_eq!(chained.balance, net_delta(&all));

    // Chaining: every day's snapshot equals a replay from zero of the rows up to it.
    for snapshot in ledger.store.list_range("u1", first, last).await.unwrap() {
        let end = at(snapshot.date, 0) + Duration::days(1);
        let replay = net_delta(all.iter().filter(|tx| tx.created_at < end));
        assert_eq!(snapshot.balance, replay, "mismatch on {}", snapshot.date);
    }

    // Idempotence: a second pass over the same day changes nothing.
    let again = ledger.state.scheduler.trigger(Some("u1"), Some(last)).await.unwrap();
    assert_eq!(again.balance.unwrap().to_string(), chained.balance.to_string());
}

#[tokio::test]
async fn test_pending_rows_never_move_any_total() {
    let today = day(2024, 3, 5);
    let ledger = ledger_at(at(today, 20));
    record(&ledger.store, "u1", TransactionKind::Deposit, "40", TransactionStatus::Pending, at(today, 1)).await;
    record(&ledger.store, "u1", TransactionKind::Withdrawal, "15", TransactionStatus::Pending, at(today, 2)).await;

    let resolver = &ledger.state.resolver;
    assert_eq!(resolver.current_balance("u1").await.unwrap(), BigDecimal::from(0));
    assert!(resolver.today_transactions("u1").await.unwrap().is_empty());
    let stats = resolver.user_stats("u1").await.unwrap();
    assert_eq!(stats.total_deposits, BigDecimal::from(0));
    assert_eq!(stats.total_withdrawals, BigDecimal::from(0));
    assert!(stats.member_since.is_some());

    let report = ledger.state.scheduler.trigger(None, None).await.unwrap();
    assert_eq!(report.users_processed, 0);
}

#[tokio::test]
async fn test_live_balance_survives_missed_batch_days() {
    let ledger = ledger_at(at(day(2024, 3, 1), 12));
    record(&ledger.store, "u1", TransactionKind::Deposit, "100", TransactionStatus::Completed, at(day(2024, 3, 1), 9)).await;
    ledger.clock.set(at(day(2024, 3, 2), 0) + Duration::minutes(5));
    ledger.state.scheduler.run_scheduled().await.unwrap();

    // Scheduler down for two days.
    record(&ledger.store, "u1", TransactionKind::GameLoss, "25", TransactionStatus::Completed, at(day(2024, 3, 2), 9)).await;
    record(&ledger.store, "u1", TransactionKind::Bonus, "5", TransactionStatus::Completed, at(day(2024, 3, 3), 9)).await;
    ledger.clock.set(at(day(2024, 3, 4), 8));
    record(&ledger.store, "u1", TransactionKind::GameWin, "1", TransactionStatus::Completed, at(day(2024, 3, 4), 7)).await;

    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(81));

    // Write-side catch-up lands on the same numbers.
    ledger.state.scheduler.backfill(day(2024, 3, 2), Some(day(2024, 3, 3))).await.unwrap();
    let history = ledger.state.resolver.balance_history("u1", 7).await.unwrap();
    let closes: Vec<_> = history.iter().map(|s| (s.date, s.balance.clone())).collect();
    assert_eq!(
        closes,
        vec![
            (day(2024, 3, 3), BigDecimal::from(80)),
            (day(2024, 3, 2), BigDecimal::from(75)),
            (day(2024, 3, 1), BigDecimal::from(100)),
        ]
    );
    assert_eq!(ledger.state.resolver.current_balance("u1").await.unwrap(), BigDecimal::from(81));
}
