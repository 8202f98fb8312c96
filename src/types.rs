// src/types.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hyperliquid reports the aggressor side as `B` (bid, buy) or `A` (ask, sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "B")]
    Buy,
    #[serde(rename = "A", alias = "S")]
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "B",
            Self::Sell => "A",
        }
    }
}

/// One executed fill. Identity is `(tid, coin, time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub coin: String,
    pub side: Side,
    pub px: Decimal,
    pub sz: Decimal,
    pub time: i64,
    pub hash: String,
    pub tid: i64,
    pub user_buyer: String,
    pub user_seller: String,
}

/// One OHLCV bar. Identity is `(t, s, i)`; the bar keeps changing until its
/// interval closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub t: i64,
    pub s: String,
    pub i: String,
    pub o: Decimal,
    pub c: Decimal,
    pub h: Decimal,
    pub l: Decimal,
    pub v: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Trades,
    Candle,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Trades, ChannelKind::Candle];

    /// Channel tag as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::Candle => "candle",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Faulted,
}

/// Candle intervals accepted by the venue, with their length in milliseconds.
pub const CANDLE_INTERVALS: [(&str, i64); 14] = [
    ("1m", 60_000),
    ("3m", 180_000),
    ("5m", 300_000),
    ("15m", 900_000),
    ("30m", 1_800_000),
    ("1h", 3_600_000),
    ("2h", 7_200_000),
    ("4h", 14_400_000),
    ("8h", 28_800_000),
    ("12h", 43_200_000),
    ("1d", 86_400_000),
    ("3d", 259_200_000),
    ("1w", 604_800_000),
    ("1M", 2_592_000_000),
];

pub fn interval_ms(label: &str) -> Option<i64> {
    CANDLE_INTERVALS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, ms)| *ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_round_trips_venue_letters() {
        let buy: Side = serde_json::from_str("\"B\"").unwrap();
        let sell: Side = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(buy, Side::Buy);
        assert_eq!(sell, Side::Sell);
        assert_eq!(Side::Sell.as_str(), "A");
        assert!(serde_json::from_str::<Side>("\"X\"").is_err());
    }

    #[test]
    fn resolves_known_intervals() {
        assert_eq!(interval_ms("1m"), Some(60_000));
        assert_eq!(interval_ms("1M"), Some(2_592_000_000));
        assert_eq!(interval_ms("7m"), None);
    }
}
