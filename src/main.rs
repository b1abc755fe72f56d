use balance_ledger::cli::{self, Cli, Commands, DbCommands};
use balance_ledger::config::{Config, LogFormat};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Setup logging
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()));
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    match cli.command.unwrap_or(Commands::Serve { in_memory: false }) {
        Commands::Serve { in_memory } => cli::handle_serve(&config, in_memory).await,
        Commands::Recompute { user_id, date } => cli::handle_recompute(&config, user_id, date).await,
        Commands::Backfill { from, to } => cli::handle_backfill(&config, from, to).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
    }
}
