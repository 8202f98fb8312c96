// src/connectors/coinapi.rs
use crate::error::BackfillError;
use crate::types::Candle;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const COINAPI_BASE_URL: &str = "https://rest.coinapi.io/v1/ohlcv";
pub const COINAPI_SYMBOL_ID: &str = "HYPERLIQUID_SPOT_HYPE_USDC";
const PERIOD_ID: &str = "1MIN";
/// One day of minute bars fits in a single page.
const PAGE_LIMIT: u32 = 10_000;

pub struct CoinApiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl CoinApiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http_client: Client::new(),
            api_key,
            base_url: COINAPI_BASE_URL.to_string(),
        }
    }

    pub fn history_url(&self, day: NaiveDate) -> String {
        let next = day.succ_opt().unwrap_or(day);
        format!(
            "{}/{}/history?period_id={}&time_start={}T00:00:00&time_end={}T00:00:00&limit={}",
            self.base_url, COINAPI_SYMBOL_ID, PERIOD_ID, day, next, PAGE_LIMIT
        )
    }

    pub async fn fetch_day(&self, day: NaiveDate) -> Result<String, BackfillError> {
        let body = self
            .http_client
            .get(self.history_url(day))
            .header("Accept", "text/plain")
            .header("X-CoinAPI-Key", &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    /// Writes one `<YYYY-MM-DD>.txt` file per day in `[from, to]`. Returns the
    /// files written.
    pub async fn download(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, BackfillError> {
        tokio::fs::create_dir_all(dir).await?;

        let mut written = Vec::new();
        let mut day = from;
        while day <= to {
            let body = self.fetch_day(day).await?;
            let path = dir.join(format!("{day}.txt"));
            tokio::fs::write(&path, body.as_bytes()).await?;
            info!(%day, path = %path.display(), bytes = body.len(), "coinapi day downloaded");
            written.push(path);

            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        Ok(written)
    }
}

/// One OHLCV record of the CoinAPI history response. Fields not listed are
/// ignored.
#[derive(Debug, Deserialize)]
pub struct CoinApiRecord {
    pub time_period_start: String,
    pub price_open: Decimal,
    pub price_high: Decimal,
    pub price_low: Decimal,
    pub price_close: Decimal,
    pub volume_traded: Decimal,
}

impl CoinApiRecord {
    pub fn into_candle(self, symbol: &str, interval: &str) -> Result<Candle, BackfillError> {
        let start = DateTime::parse_from_rfc3339(&self.time_period_start).map_err(|e| {
            BackfillError::Timestamp {
                value: self.time_period_start.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Candle {
            t: start.timestamp_millis(),
            s: symbol.to_string(),
            i: interval.to_string(),
            o: self.price_open,
            c: self.price_close,
            h: self.price_high,
            l: self.price_low,
            v: self.volume_traded,
        })
    }
}

pub fn parse_history(body: &str, symbol: &str, interval: &str) -> Result<Vec<Candle>, BackfillError> {
    let records: Vec<CoinApiRecord> = serde_json::from_str(body)?;
    records
        .into_iter()
        .map(|record| record.into_candle(symbol, interval))
        .collect()
}

/// Reads every `*.txt` file in `dir` (in name order) as a CoinAPI history
/// page.
pub async fn read_history_dir(
    dir: &Path,
    symbol: &str,
    interval: &str,
) -> Result<Vec<Candle>, BackfillError> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();

    let mut candles = Vec::new();
    for path in files {
        let body = tokio::fs::read_to_string(&path).await?;
        let page = parse_history(&body, symbol, interval)?;
        debug!(path = %path.display(), bars = page.len(), "coinapi file read");
        candles.extend(page);
    }
    Ok(candles)
}
