// src/connectors/messages.rs
//! Hyperliquid websocket envelope: `{"channel": ..., "data": ...}` on the
//! way in, `{"method": ...}` on the way out.

use crate::error::CodecError;
use crate::types::{Candle, ChannelKind, Side, Trade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_CANDLE_INTERVAL: &str = "1m";

/// Bare text liveness probe sent by the venue, answered with [`PONG_TEXT`].
pub const PING_TEXT: &str = "ping";
pub const PONG_TEXT: &str = "pong";

/// Fill as delivered on the `trades` channel.
/// Prices and sizes arrive as strings; unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct TradeWire {
    pub coin: String,
    pub side: Side,
    pub px: Decimal,
    pub sz: Decimal,
    pub time: i64,
    pub hash: String,
    pub tid: i64,
    /// `[buyer, seller]`
    pub users: (String, String),
}

impl From<TradeWire> for Trade {
    fn from(value: TradeWire) -> Self {
        let (user_buyer, user_seller) = value.users;
        Self {
            coin: value.coin,
            side: value.side,
            px: value.px,
            sz: value.sz,
            time: value.time,
            hash: value.hash,
            tid: value.tid,
            user_buyer,
            user_seller,
        }
    }
}

/// Bar as delivered on the `candle` channel and by the `candleSnapshot`
/// REST request (which adds `T` and `n`, ignored here).
#[derive(Debug, Deserialize)]
pub struct CandleWire {
    pub t: i64,
    pub s: String,
    pub i: String,
    pub o: Decimal,
    pub c: Decimal,
    pub h: Decimal,
    pub l: Decimal,
    pub v: Decimal,
}

impl From<CandleWire> for Candle {
    fn from(value: CandleWire) -> Self {
        Self {
            t: value.t,
            s: value.s,
            i: value.i,
            o: value.o,
            c: value.c,
            h: value.h,
            l: value.l,
            v: value.v,
        }
    }
}

// Some deliveries wrap the bar in an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CandleData {
    One(CandleWire),
    Many(Vec<CandleWire>),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Bare `"ping"` text from the venue.
    Ping,
    /// Reply to our own `{"method":"ping"}`.
    Pong,
    SubscriptionAck,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Trades(Vec<Trade>),
    /// Never empty when produced by [`decode`].
    Candles(Vec<Candle>),
    Control(Control),
    /// `{"channel":"error"}` notice, e.g. a rejected subscription.
    VenueError(String),
}

impl ParsedMessage {
    /// Data channel this message belongs to, if it carries records.
    pub fn channel(&self) -> Option<ChannelKind> {
        match self {
            Self::Trades(_) => Some(ChannelKind::Trades),
            Self::Candles(_) => Some(ChannelKind::Candle),
            Self::Control(_) | Self::VenueError(_) => None,
        }
    }
}

pub fn decode(frame: &[u8]) -> Result<ParsedMessage, CodecError> {
    let text = std::str::from_utf8(frame)?.trim();
    match text {
        PING_TEXT => return Ok(ParsedMessage::Control(Control::Ping)),
        PONG_TEXT => return Ok(ParsedMessage::Control(Control::Pong)),
        _ => {}
    }

    let envelope: Envelope = serde_json::from_str(text).map_err(CodecError::InvalidJson)?;
    let channel = envelope.channel.ok_or(CodecError::MissingChannel)?;

    match channel.as_str() {
        "trades" => {
            let wire: Vec<TradeWire> =
                serde_json::from_value(envelope.data).map_err(|source| {
                    CodecError::InvalidPayload {
                        channel: "trades",
                        source,
                    }
                })?;
            Ok(ParsedMessage::Trades(
                wire.into_iter().map(Trade::from).collect(),
            ))
        }
        "candle" => {
            let wire: CandleData =
                serde_json::from_value(envelope.data).map_err(|source| {
                    CodecError::InvalidPayload {
                        channel: "candle",
                        source,
                    }
                })?;
            let candles = match wire {
                CandleData::One(candle) => vec![candle.into()],
                CandleData::Many(candles) if candles.is_empty() => {
                    return Err(CodecError::InvalidPayload {
                        channel: "candle",
                        source: serde::de::Error::custom("empty candle array"),
                    });
                }
                CandleData::Many(candles) => candles.into_iter().map(Candle::from).collect(),
            };
            Ok(ParsedMessage::Candles(candles))
        }
        "pong" => Ok(ParsedMessage::Control(Control::Pong)),
        "subscriptionResponse" => Ok(ParsedMessage::Control(Control::SubscriptionAck)),
        "error" => Ok(ParsedMessage::VenueError(match envelope.data {
            Value::String(reason) => reason,
            other => other.to_string(),
        })),
        _ => Err(CodecError::UnknownChannel(channel)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Subscription {
    Trades { coin: String },
    Candle { coin: String, interval: String },
}

impl Subscription {
    pub fn for_channel(kind: ChannelKind, symbol: &str, interval: Option<&str>) -> Self {
        match kind {
            ChannelKind::Trades => Self::Trades {
                coin: symbol.to_string(),
            },
            ChannelKind::Candle => Self::Candle {
                coin: symbol.to_string(),
                interval: interval.unwrap_or(DEFAULT_CANDLE_INTERVAL).to_string(),
            },
        }
    }

    pub fn channel(&self) -> ChannelKind {
        match self {
            Self::Trades { .. } => ChannelKind::Trades,
            Self::Candle { .. } => ChannelKind::Candle,
        }
    }
}

pub fn encode_subscribe(subscription: &Subscription) -> String {
    json!({ "method": "subscribe", "subscription": subscription }).to_string()
}

pub fn encode_ping() -> String {
    json!({ "method": "ping" }).to_string()
}
