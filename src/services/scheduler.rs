use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use cron::Schedule;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::domain::day::days_inclusive;
use crate::domain::DayWindow;
use crate::error::AppError;
use crate::ports::TransactionRepository;
use crate::services::aggregator::DailyAggregator;
use crate::services::locks::UserLocks;
use crate::validation::{validate_not_future, validate_user_id, ValidationError, BACKFILL_MAX_DAYS};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserFailure {
    pub user_id: String,
    pub error: String,
}

/// Outcome of one aggregation pass, scheduled or manual.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerReport {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub users_processed: usize,
    pub failures: Vec<UserFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<BigDecimal>,
}

impl TriggerReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct BatchScheduler {
    aggregator: Arc<DailyAggregator>,
    transactions: Arc<dyn TransactionRepository>,
    clock: Arc<dyn Clock>,
    schedule: Schedule,
    concurrency: usize,
    locks: UserLocks,
}

impl BatchScheduler {
    pub fn new(
        aggregator: Arc<DailyAggregator>,
        transactions: Arc<dyn TransactionRepository>,
        clock: Arc<dyn Clock>,
        schedule: Schedule,
        concurrency: usize,
        locks: UserLocks,
    ) -> Self {
        Self {
            aggregator,
            transactions,
            clock,
            schedule,
            concurrency: concurrency.max(1),
            locks,
        }
    }

    /// Aggregates every user with COMPLETED activity on `date`.
    ///
    /// Users are processed with bounded parallelism. A failing user is
    /// recorded in the report and does not stop the others; only failing to
    /// enumerate the users fails the pass.
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<TriggerReport, AppError> {
        let users = self.transactions.active_users(DayWindow::for_date(date)).await?;
        tracing::info!(date = %date, users = users.len(), "Starting daily balance pass");

        let outcomes: Vec<(String, Result<(), AppError>)> = stream::iter(users)
            .map(|user_id| {
                let aggregator = self.aggregator.clone();
                async move {
                    let result = aggregator
                        .compute_daily_balance(&user_id, date)
                        .await
                        .map(|_| ());
                    (user_id, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = TriggerReport {
            date,
            user_id: None,
            users_processed: 0,
            failures: Vec::new(),
            balance: None,
        };
        for (user_id, result) in outcomes {
            match result {
                Ok(()) => report.users_processed += 1,
                Err(err) => {
                    tracing::error!(
                        user_id = %user_id,
                        date = %date,
                        retryable = err.is_retryable(),
                        error = %err,
                        "Daily balance failed for user"
                    );
                    report.failures.push(UserFailure {
                        user_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        self.locks.prune();

        tracing::info!(
            date = %date,
            users_processed = report.users_processed,
            failures = report.failures.len(),
            "Daily balance pass finished"
        );
        Ok(report)
    }

    /// The scheduled pass. It always aggregates the last day that has fully
    /// closed, so rows written late in a day are inside that day's snapshot.
    pub async fn run_scheduled(&self) -> Result<TriggerReport, AppError> {
        self.run_for_date(closed_day(self.clock.today())).await
    }

    /// Manual re-run. Without a user this is the scheduled pass for `date`
    /// (default today); with one it recomputes only that user's snapshot.
    pub async fn trigger(
        &self,
        user_id: Option<&str>,
        date: Option<NaiveDate>,
    ) -> Result<TriggerReport, AppError> {
        let today = self.clock.today();
        let date = date.unwrap_or(today);
        validate_not_future("date", date, today)?;

        let Some(user_id) = user_id else {
            return self.run_for_date(date).await;
        };
        validate_user_id(user_id)?;

        let snapshot = self.aggregator.compute_daily_balance(user_id, date).await?;
        Ok(TriggerReport {
            date,
            user_id: Some(user_id.to_string()),
            users_processed: 1,
            failures: Vec::new(),
            balance: Some(snapshot.balance),
        })
    }

    /// Runs the pass for every day in `[from, to]`, oldest first, so each day
    /// seeds from the snapshot the previous iteration just wrote.
    pub async fn backfill(
        &self,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TriggerReport>, AppError> {
        let today = self.clock.today();
        let to = to.unwrap_or(today);
        validate_not_future("to", to, today)?;
        if from > to {
            return Err(ValidationError::new("from", "must not be after 'to'").into());
        }
        let span = (to - from).num_days() + 1;
        if span > BACKFILL_MAX_DAYS {
            return Err(ValidationError::new(
                "from",
                format!("backfill covers {} days, at most {} allowed", span, BACKFILL_MAX_DAYS),
            )
            .into());
        }

        let mut reports = Vec::with_capacity(span as usize);
        for date in days_inclusive(from, to) {
            reports.push(self.run_for_date(date).await?);
        }
        Ok(reports)
    }

    /// Spawns the wall-clock loop. Each tick aggregates the day before the
    /// instant the schedule fired for.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Balance scheduler started");
            let mut last_fire = self.clock.now();
            loop {
                let now = self.clock.now();
                // A timer that wakes early must not fire the same slot twice.
                let Some(next) = self.schedule.after(&now.max(last_fire)).next() else {
                    tracing::warn!("Balance schedule has no upcoming fire time; stopping");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tracing::debug!(next = %next, "Waiting for next balance pass");
                tokio::time::sleep(wait).await;

                last_fire = next;
                if let Err(e) = self.run_for_date(closed_day(next.date_naive())).await {
                    tracing::error!(error = %e, "Daily balance pass could not start");
                }
            }
        })
    }
}

fn closed_day(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}
