// src/error.rs
use std::time::Duration;
use thiserror::Error;

/// A frame that could not be turned into a message. Always recoverable:
/// the listener logs it and reads the next frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame is not valid utf-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("frame is not valid json: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame has no channel tag")]
    MissingChannel,
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("malformed {channel} payload: {source}")]
    InvalidPayload {
        channel: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("connection closed by peer")]
    Closed,
    #[error("no inbound frame for {0:?}")]
    HeartbeatTimeout(Duration),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error("store write failed: {0}")]
    Write(#[source] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown candle interval '{0}'")]
    Interval(String),
    #[error("bad timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}
