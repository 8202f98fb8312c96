// src/connectors/hyperliquid.rs
use crate::connectors::messages::CandleWire;
use crate::error::BackfillError;
use crate::types::Candle;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

/// Upper bound on bars returned by one `candleSnapshot` request.
pub const MAX_SNAPSHOT_BARS: i64 = 5000;

/// Client for the venue's `info` REST endpoint.
pub struct HyperliquidClient {
    http_client: Client,
    info_url: String,
}

impl HyperliquidClient {
    pub fn new(info_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            info_url: info_url.into(),
        }
    }

    /// Bars whose open time falls in `[start_ms, end_ms]`.
    pub async fn fetch_candle_snapshot(
        &self,
        coin: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, BackfillError> {
        let body = json!({
            "type": "candleSnapshot",
            "req": {
                "coin": coin,
                "interval": interval,
                "startTime": start_ms,
                "endTime": end_ms,
            }
        });

        let text = self
            .http_client
            .post(&self.info_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let candles = parse_snapshot(&text)?;
        debug!(coin, interval, start_ms, end_ms, bars = candles.len(), "candle snapshot fetched");
        Ok(candles)
    }
}

pub fn parse_snapshot(body: &str) -> Result<Vec<Candle>, BackfillError> {
    let bars: Vec<CandleWire> = serde_json::from_str(body)?;
    Ok(bars.into_iter().map(Candle::from).collect())
}

/// Splits `[start_ms, end_ms)` into request windows of at most
/// [`MAX_SNAPSHOT_BARS`] bars each.
pub fn snapshot_windows(start_ms: i64, end_ms: i64, interval_ms: i64) -> Vec<(i64, i64)> {
    if interval_ms <= 0 || end_ms <= start_ms {
        return Vec::new();
    }
    let span = interval_ms.saturating_mul(MAX_SNAPSHOT_BARS);
    let mut windows = Vec::new();
    let mut from = start_ms;
    while from < end_ms {
        let to = from.saturating_add(span).min(end_ms);
        // The snapshot end bound is inclusive.
        windows.push((from, to - 1));
        from = to;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const MINUTE: i64 = 60_000;

    #[test]
    fn parses_snapshot_with_extra_fields() {
        let body = r#"[
            {"t":1700000000000,"T":1700000059999,"s":"@107","i":"1m","o":"20.1","c":"20.4","h":"20.5","l":"20.0","v":"812.33","n":41},
            {"t":1700000060000,"T":1700000119999,"s":"@107","i":"1m","o":"20.4","c":"20.2","h":"20.4","l":"20.1","v":"95","n":7}
        ]"#;

        let candles = parse_snapshot(body).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].t, 1_700_000_000_000);
        assert_eq!(candles[0].v, Decimal::from_str("812.33").unwrap());
        assert_eq!(candles[1].c, Decimal::from_str("20.2").unwrap());
    }

    #[test]
    fn rejects_error_body() {
        assert!(parse_snapshot(r#"{"error":"bad request"}"#).is_err());
    }

    #[test]
    fn short_range_is_a_single_window() {
        assert_eq!(snapshot_windows(0, 48 * 60 * MINUTE, MINUTE), vec![(0, 48 * 60 * MINUTE - 1)]);
    }

    #[test]
    fn long_range_is_split_at_bar_limit() {
        let end = 12_000 * MINUTE;
        let windows = snapshot_windows(0, end, MINUTE);

        assert_eq!(
            windows,
            vec![
                (0, 5000 * MINUTE - 1),
                (5000 * MINUTE, 10_000 * MINUTE - 1),
                (10_000 * MINUTE, end - 1),
            ]
        );
    }

    #[test]
    fn empty_or_inverted_range_has_no_windows() {
        assert!(snapshot_windows(10, 10, MINUTE).is_empty());
        assert!(snapshot_windows(10, 0, MINUTE).is_empty());
    }
}
