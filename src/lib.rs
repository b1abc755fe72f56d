pub mod adapters;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use cron::Schedule;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::clock::Clock;
use crate::ports::{SnapshotRepository, TransactionRepository};
use crate::services::{
    BalanceResolver, BatchScheduler, DailyAggregator, SettlementReconciler, TransactionRecorder,
    UserLocks,
};

/// Knobs for wiring the ledger services.
#[derive(Clone)]
pub struct LedgerOptions {
    pub schedule: Schedule,
    pub batch_concurrency: usize,
    pub ipn_secret: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub transactions: Arc<dyn TransactionRepository>,
    pub resolver: Arc<BalanceResolver>,
    pub scheduler: Arc<BatchScheduler>,
    pub reconciler: Arc<SettlementReconciler>,
    pub recorder: Arc<TransactionRecorder>,
    pub ipn_secret: Option<String>,
    pub start_time: Instant,
}

impl AppState {
    /// Wires every service over one pair of stores. The aggregator, the
    /// scheduler and the recorder share a single set of per-user locks.
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        clock: Arc<dyn Clock>,
        options: LedgerOptions,
    ) -> Self {
        let locks = UserLocks::new();
        let resolver = Arc::new(BalanceResolver::new(
            transactions.clone(),
            snapshots.clone(),
            clock.clone(),
        ));
        let aggregator = Arc::new(DailyAggregator::new(
            transactions.clone(),
            snapshots,
            locks.clone(),
        ));
        let scheduler = Arc::new(BatchScheduler::new(
            aggregator,
            transactions.clone(),
            clock.clone(),
            options.schedule,
            options.batch_concurrency,
            locks.clone(),
        ));
        let reconciler = Arc::new(SettlementReconciler::new(transactions.clone()));
        let recorder = Arc::new(TransactionRecorder::new(
            transactions.clone(),
            resolver.clone(),
            locks,
            clock,
        ));

        Self {
            transactions,
            resolver,
            scheduler,
            reconciler,
            recorder,
            ipn_secret: options.ipn_secret,
            start_time: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState, cors_origin: Option<HeaderValue>) -> Router {
    let cors = match cors_origin {
        Some(origin) => CorsLayer::new().allow_origin(origin),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods([Method::GET, Method::POST])
    .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/balance/calculate", post(handlers::balance::calculate))
        .route("/balance/:user_id/current", get(handlers::balance::current))
        .route("/balance/:user_id/detailed", get(handlers::balance::detailed))
        .route("/balance/:user_id/history", get(handlers::balance::history))
        .route(
            "/balance/:user_id/today-transactions",
            get(handlers::balance::today_transactions),
        )
        .route("/balance/:user_id/stats", get(handlers::balance::stats))
        .route("/balance/:user_id/recalculate", post(handlers::balance::recalculate))
        .route("/balance/:user_id/credit", post(handlers::balance::credit))
        .route("/payment/create", post(handlers::payment::create))
        .route("/payment/withdraw", post(handlers::payment::withdraw))
        .route("/payment/webhook", post(handlers::payment::webhook))
        .route(
            "/payment/transactions/:user_id",
            get(handlers::payment::transactions),
        )
        .route("/game/outcome", post(handlers::game::record_outcome))
        .route("/game/history/:user_id", get(handlers::game::history))
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .layer(cors)
        .with_state(state)
}
