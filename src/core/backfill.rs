// src/core/backfill.rs
use crate::connectors::coinapi::read_history_dir;
use crate::connectors::hyperliquid::{snapshot_windows, HyperliquidClient};
use crate::error::BackfillError;
use crate::storage::PersistenceAdapter;
use crate::types::{interval_ms, Candle};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    pub fetched: usize,
    pub stored: usize,
    pub failed: usize,
}

impl BackfillReport {
    fn merge(&mut self, other: BackfillReport) {
        self.fetched += other.fetched;
        self.stored += other.stored;
        self.failed += other.failed;
    }
}

impl fmt::Display for BackfillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} stored={} failed={}",
            self.fetched, self.stored, self.failed
        )
    }
}

/// Upserts `candles` one by one. A bar the store refuses is counted and
/// skipped.
pub async fn store_candles(adapter: &mut PersistenceAdapter, candles: &[Candle]) -> BackfillReport {
    let mut report = BackfillReport {
        fetched: candles.len(),
        ..Default::default()
    };

    for (n, candle) in candles.iter().enumerate() {
        match adapter.upsert_candle(candle).await {
            Ok(()) => report.stored += 1,
            Err(e) => {
                report.failed += 1;
                warn!(t = candle.t, s = %candle.s, i = %candle.i, error = %e, "backfill bar dropped");
            }
        }
        if (n + 1) % PROGRESS_EVERY == 0 {
            info!(done = n + 1, total = candles.len(), "backfill progress");
        }
    }
    report
}

/// Pulls venue snapshots for `[start_ms, end_ms)` window by window.
pub async fn backfill_snapshot(
    client: &HyperliquidClient,
    adapter: &mut PersistenceAdapter,
    symbol: &str,
    interval: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<BackfillReport, BackfillError> {
    let step =
        interval_ms(interval).ok_or_else(|| BackfillError::Interval(interval.to_string()))?;

    let mut report = BackfillReport::default();
    for (from, to) in snapshot_windows(start_ms, end_ms, step) {
        let candles = client.fetch_candle_snapshot(symbol, interval, from, to).await?;
        info!(from, to, bars = candles.len(), "snapshot window fetched");
        report.merge(store_candles(adapter, &candles).await);
    }

    adapter.disconnect().await;
    info!(%report, "snapshot backfill finished");
    Ok(report)
}

/// Loads previously downloaded CoinAPI pages from `dir`.
pub async fn import_coinapi(
    adapter: &mut PersistenceAdapter,
    dir: &Path,
    symbol: &str,
    interval: &str,
) -> Result<BackfillReport, BackfillError> {
    let candles = read_history_dir(dir, symbol, interval).await?;
    info!(dir = %dir.display(), bars = candles.len(), "coinapi history loaded");

    let report = store_candles(adapter, &candles).await;
    adapter.disconnect().await;
    info!(%report, "coinapi import finished");
    Ok(report)
}
