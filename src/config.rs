use anyhow::{Context, Result};
use axum::http::HeaderValue;
use cron::Schedule;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

/// Five past midnight UTC; the pass aggregates the day that just closed.
pub const DEFAULT_BALANCE_CRON: &str = "0 5 0 * * *";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Seconds-resolution cron expression, evaluated in UTC.
    pub balance_cron: String,
    pub batch_concurrency: usize,
    pub payment_ipn_secret: Option<String>,
    pub cors_allowed_origin: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Every value is validated
    /// here so a bad deployment fails at startup, not at the first nightly pass.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server_port = non_empty("SERVER_PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid port number")?;

        let db_max_connections: u32 = non_empty("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|| "5".to_string())
            .parse()
            .context("DB_MAX_CONNECTIONS must be a positive integer")?;
        if db_max_connections == 0 {
            anyhow::bail!("DB_MAX_CONNECTIONS must be at least 1");
        }

        let batch_concurrency: usize = non_empty("BATCH_CONCURRENCY")
            .unwrap_or_else(|| "4".to_string())
            .parse()
            .context("BATCH_CONCURRENCY must be a positive integer")?;
        if batch_concurrency == 0 {
            anyhow::bail!("BATCH_CONCURRENCY must be at least 1");
        }

        let config = Config {
            server_port,
            database_url: non_empty("DATABASE_URL"),
            db_max_connections,
            balance_cron: non_empty("BALANCE_CRON").unwrap_or_else(|| DEFAULT_BALANCE_CRON.to_string()),
            batch_concurrency,
            payment_ipn_secret: non_empty("PAYMENT_IPN_SECRET"),
            cors_allowed_origin: non_empty("CORS_ALLOWED_ORIGIN"),
            log_format: non_empty("LOG_FORMAT")
                .map(|raw| raw.parse::<LogFormat>())
                .transpose()?
                .unwrap_or_default(),
        };

        config.schedule()?;
        config.cors_origin()?;
        Ok(config)
    }

    pub fn schedule(&self) -> Result<Schedule> {
        Schedule::from_str(&self.balance_cron)
            .with_context(|| format!("BALANCE_CRON '{}' is not a valid cron expression", self.balance_cron))
    }

    pub fn cors_origin(&self) -> Result<Option<HeaderValue>> {
        self.cors_allowed_origin
            .as_deref()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .with_context(|| format!("CORS_ALLOWED_ORIGIN '{}' is not a valid origin", origin))
            })
            .transpose()
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL is required (or run with --in-memory)")
    }
}
