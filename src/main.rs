// src/main.rs
use crate::config::{AppConfig, StoreConfig};
use crate::connectors::coinapi::CoinApiClient;
use crate::connectors::hyperliquid::HyperliquidClient;
use crate::core::backfill::{backfill_snapshot, import_coinapi};
use crate::core::listener::ListenerSettings;
use crate::core::supervisor::Supervisor;
use crate::storage::postgres::PostgresConnector;
use crate::storage::sqlite::SqliteConnector;
use crate::storage::{PersistenceAdapter, StoreConnector};
use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod connectors;
mod core;
mod error;
mod storage;
mod types;
mod utils;

const HOUR_MS: i64 = 60 * 60 * 1000;

#[derive(Parser)]
#[command(name = "hypewatch", version, about = "HYPE/USDC trade and candle ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Stream trades and candles into the store until Ctrl+C (default)
    Listen,
    /// Fill recent candles from the venue candle snapshot
    Backfill {
        #[arg(long, default_value_t = 48)]
        hours: u32,
    },
    /// Download CoinAPI minute bars, one file per day
    CoinapiDownload {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, default_value = "historical_data")]
        dir: PathBuf,
    },
    /// Upsert previously downloaded CoinAPI files
    CoinapiImport {
        #[arg(long, default_value = "historical_data")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing();

    let config = AppConfig::new().context("failed to load configuration")?;
    info!(deployment = ?config.deployment, symbol = %config.venue.symbol, "hypewatch starting");

    match cli.command.unwrap_or(Command::Listen) {
        Command::Listen => {
            let connector = migrated_connector(&config.store).await?;
            let supervisor =
                Supervisor::start(ListenerSettings::from_venue(&config.venue), connector);

            tokio::signal::ctrl_c()
                .await
                .context("failed to wait for Ctrl+C")?;
            info!("shutdown requested");
            supervisor.stop().await;
        }
        Command::Backfill { hours } => {
            let connector = migrated_connector(&config.store).await?;
            let mut adapter = PersistenceAdapter::new(connector);
            let client = HyperliquidClient::new(config.venue.info_url.clone());
            let end_ms = Utc::now().timestamp_millis();
            let start_ms = end_ms - i64::from(hours) * HOUR_MS;

            let report = backfill_snapshot(
                &client,
                &mut adapter,
                &config.venue.symbol,
                &config.venue.candle_interval,
                start_ms,
                end_ms,
            )
            .await
            .context("snapshot backfill failed")?;
            info!(fetched = report.fetched, stored = report.stored, failed = report.failed, "backfill report");
        }
        Command::CoinapiDownload { from, to, dir } => {
            if from > to {
                bail!("--from {from} is after --to {to}");
            }
            let key = config
                .coinapi_key
                .clone()
                .context("COINAPI_API_KEY is required for coinapi-download")?;

            let files = CoinApiClient::new(key)
                .download(from, to, &dir)
                .await
                .context("coinapi download failed")?;
            info!(files = files.len(), dir = %dir.display(), "coinapi download finished");
        }
        Command::CoinapiImport { dir } => {
            let connector = migrated_connector(&config.store).await?;
            let mut adapter = PersistenceAdapter::new(connector);

            let report = import_coinapi(
                &mut adapter,
                &dir,
                &config.venue.symbol,
                &config.venue.candle_interval,
            )
            .await
            .with_context(|| format!("coinapi import from {} failed", dir.display()))?;
            info!(fetched = report.fetched, stored = report.stored, failed = report.failed, "import report");
        }
    }

    Ok(())
}

/// stdout always; a daily rolling file as well when `LOG_DIR` is set. The
/// returned guard flushes the file writer on drop.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "hypewatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    guard
}

async fn migrated_connector(store: &StoreConfig) -> anyhow::Result<Arc<dyn StoreConnector>> {
    let connector: Arc<dyn StoreConnector> = match store {
        StoreConfig::Postgres(db) => Arc::new(PostgresConnector::new(db)),
        StoreConfig::Sqlite { path } => Arc::new(SqliteConnector::new(path)),
    };

    connector
        .migrate()
        .await
        .with_context(|| format!("migrations failed on {}", connector.describe()))?;
    info!(store = %connector.describe(), "store ready");
    Ok(connector)
}
