use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::adapters::{InMemoryLedgerStore, PostgresLedgerStore};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::services::TriggerReport;
use crate::{create_app, db, AppState, LedgerOptions};

#[derive(Parser)]
#[command(name = "balance-ledger")]
#[command(about = "Balance Ledger - daily balance snapshots over an append-only transaction log", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the daily balance scheduler (default)
    Serve {
        /// Keep all data in process memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },

    /// Recompute daily balances for a date, for one user or every active user
    Recompute {
        #[arg(long)]
        user_id: Option<String>,

        /// Day to recompute (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Run the daily pass for every day in a range, oldest first
    Backfill {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn build_state(config: &Config, in_memory: bool) -> anyhow::Result<AppState> {
    let options = LedgerOptions {
        schedule: config.schedule()?,
        batch_concurrency: config.batch_concurrency,
        ipn_secret: config.payment_ipn_secret.clone(),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if in_memory {
        tracing::warn!("Using the in-memory ledger store; data is lost on exit");
        let store = Arc::new(InMemoryLedgerStore::new());
        return Ok(AppState::new(store.clone(), store, clock, options));
    }

    let pool = db::create_pool(config).await?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(PostgresLedgerStore::new(pool));
    Ok(AppState::new(store.clone(), store, clock, options))
}

pub async fn handle_serve(config: &Config, in_memory: bool) -> anyhow::Result<()> {
    let state = build_state(config, in_memory).await?;
    let _scheduler = state.scheduler.clone().start();
    let app = create_app(state, config.cors_origin()?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub async fn handle_recompute(
    config: &Config,
    user_id: Option<String>,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let state = build_state(config, false).await?;
    let report = state.scheduler.trigger(user_id.as_deref(), date).await?;
    print_report(&report);

    if !report.is_clean() {
        anyhow::bail!("{} user(s) failed for {}", report.failures.len(), report.date);
    }
    Ok(())
}

pub async fn handle_backfill(
    config: &Config,
    from: NaiveDate,
    to: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let state = build_state(config, false).await?;
    let reports = state.scheduler.backfill(from, to).await?;

    let mut failed = 0;
    for report in &reports {
        print_report(report);
        failed += report.failures.len();
    }

    if failed > 0 {
        anyhow::bail!("Backfill finished with {} failure(s)", failed);
    }
    println!("✓ Backfill of {} day(s) completed", reports.len());
    Ok(())
}

fn print_report(report: &TriggerReport) {
    match (&report.user_id, &report.balance) {
        (Some(user_id), Some(balance)) => {
            println!("✓ {} {}: closing balance {}", report.date, user_id, balance)
        }
        _ => println!(
            "{} {}: {} user(s) processed, {} failure(s)",
            if report.is_clean() { "✓" } else { "✗" },
            report.date,
            report.users_processed,
            report.failures.len()
        ),
    }
    for failure in &report.failures {
        println!("    {}: {}", failure.user_id, failure.error);
    }
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!(
        "  Database URL: {}",
        config
            .database_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  DB Max Connections: {}", config.db_max_connections);
    println!("  Balance Cron (UTC): {}", config.balance_cron);
    println!("  Batch Concurrency: {}", config.batch_concurrency);
    println!(
        "  Payment IPN Secret: {}",
        if config.payment_ipn_secret.is_some() { "****" } else { "(not set)" }
    );
    println!(
        "  CORS Allowed Origin: {}",
        config.cors_allowed_origin.as_deref().unwrap_or("*")
    );
    println!("  Log Format: {:?}", config.log_format);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
