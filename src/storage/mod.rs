// src/storage/mod.rs
pub mod postgres;
pub mod sqlite;

use crate::error::StoreError;
use crate::types::{Candle, Trade};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Opens connections to one store. Shared by every adapter in the process.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn StoreConnection>, StoreError>;

    /// Creates or upgrades the schema. Run once before any listener starts.
    async fn migrate(&self) -> Result<(), StoreError>;

    /// Human-readable target for logs. Must not include credentials.
    fn describe(&self) -> String;
}

#[async_trait]
pub trait StoreConnection: Send {
    /// Insert or update keyed by `(tid, coin, time)`.
    async fn upsert_trade(&mut self, trade: &Trade) -> Result<(), StoreError>;

    /// Insert or update keyed by `(t, s, i)`.
    async fn upsert_candle(&mut self, candle: &Candle) -> Result<(), StoreError>;

    async fn close(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Clone, Copy)]
enum Record<'a> {
    Trade(&'a Trade),
    Candle(&'a Candle),
}

/// Owns at most one live store connection, opened lazily and reopened once
/// when a write fails.
pub struct PersistenceAdapter {
    connector: Arc<dyn StoreConnector>,
    connection: Option<Box<dyn StoreConnection>>,
}

impl PersistenceAdapter {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// No-op when a connection is already held.
    pub async fn connect(&mut self) -> Result<(), StoreError> {
        if self.connection.is_none() {
            self.connection = Some(open(self.connector.as_ref()).await?);
        }
        Ok(())
    }

    /// Safe to call when already disconnected.
    pub async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                warn!(error = %e, "store connection did not close cleanly");
            }
        }
    }

    pub async fn upsert_trade(&mut self, trade: &Trade) -> Result<(), StoreError> {
        self.write_with_retry(Record::Trade(trade)).await
    }

    pub async fn upsert_candle(&mut self, candle: &Candle) -> Result<(), StoreError> {
        self.write_with_retry(Record::Candle(candle)).await
    }

    async fn write_with_retry(&mut self, record: Record<'_>) -> Result<(), StoreError> {
        match self.write_once(record).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(error = %first, "store write failed, reconnecting once");
                // The failed connection may be half-open; never reuse it.
                self.disconnect().await;
                let retried = self.write_once(record).await;
                if let Err(e) = &retried {
                    error!(store = %self.connector.describe(), error = %e, "store write failed after reconnect");
                    self.disconnect().await;
                }
                retried
            }
        }
    }

    async fn write_once(&mut self, record: Record<'_>) -> Result<(), StoreError> {
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => open(self.connector.as_ref()).await?,
        };
        let result = match record {
            Record::Trade(trade) => connection.upsert_trade(trade).await,
            Record::Candle(candle) => connection.upsert_candle(candle).await,
        };
        self.connection = Some(connection);
        result
    }
}

async fn open(connector: &dyn StoreConnector) -> Result<Box<dyn StoreConnection>, StoreError> {
    let connection = connector.open().await?;
    debug!(store = %connector.describe(), "store connection opened");
    Ok(connection)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::types::Side;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn sample_trade(tid: i64, px: &str) -> Trade {
        Trade {
            coin: "HYPE".to_string(),
            side: Side::Buy,
            px: Decimal::from_str(px).unwrap(),
            sz: Decimal::from(2),
            time: 1000,
            hash: "0xabc".to_string(),
            tid,
            user_buyer: "u1".to_string(),
            user_seller: "u2".to_string(),
        }
    }

    pub fn sample_candle(t: i64, close: &str) -> Candle {
        Candle {
            t,
            s: "@107".to_string(),
            i: "1m".to_string(),
            o: Decimal::from(10),
            c: Decimal::from_str(close).unwrap(),
            h: Decimal::from(12),
            l: Decimal::from(9),
            v: Decimal::from_str("150.25").unwrap(),
        }
    }

    /// Connector whose connections fail their first `failing_writes` writes
    /// (counted across connections) and whose `open` fails `failing_opens` times.
    #[derive(Default)]
    pub struct FlakyConnector {
        pub failing_opens: AtomicUsize,
        pub failing_writes: Arc<AtomicUsize>,
        pub opens: AtomicUsize,
        pub writes: Arc<AtomicUsize>,
    }

    impl FlakyConnector {
        pub fn new(failing_opens: usize, failing_writes: usize) -> Self {
            Self {
                failing_opens: AtomicUsize::new(failing_opens),
                failing_writes: Arc::new(AtomicUsize::new(failing_writes)),
                ..Default::default()
            }
        }

        pub fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    struct FlakyConnection {
        failing_writes: Arc<AtomicUsize>,
        writes: Arc<AtomicUsize>,
    }

    impl FlakyConnection {
        fn write(&self) -> Result<(), StoreError> {
            if take_one(&self.failing_writes) {
                return Err(StoreError::Write(sqlx::Error::Protocol(
                    "simulated write failure".to_string(),
                )));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl StoreConnector for FlakyConnector {
        async fn open(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if take_one(&self.failing_opens) {
                return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
            }
            Ok(Box::new(FlakyConnection {
                failing_writes: Arc::clone(&self.failing_writes),
                writes: Arc::clone(&self.writes),
            }))
        }

        async fn migrate(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    #[async_trait]
    impl StoreConnection for FlakyConnection {
        async fn upsert_trade(&mut self, _trade: &Trade) -> Result<(), StoreError> {
            self.write()
        }

        async fn upsert_candle(&mut self, _candle: &Candle) -> Result<(), StoreError> {
            self.write()
        }

        async fn close(self: Box<Self>) -> Result<(), StoreError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn connect_is_idempotent() {
        let connector = Arc::new(FlakyConnector::new(0, 0));
        let mut adapter = PersistenceAdapter::new(connector.clone());

        adapter.connect().await.unwrap();
        adapter.connect().await.unwrap();

        assert!(adapter.is_connected());
        assert_eq!(connector.opens(), 1);
    }

    #[tokio::test]
    async fn disconnect_when_disconnected_is_a_no_op() {
        let connector = Arc::new(FlakyConnector::new(0, 0));
        let mut adapter = PersistenceAdapter::new(connector);

        adapter.disconnect().await;
        adapter.connect().await.unwrap();
        adapter.disconnect().await;
        adapter.disconnect().await;

        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn reconnects_once_after_a_failed_write() {
        let connector = Arc::new(FlakyConnector::new(0, 1));
        let mut adapter = PersistenceAdapter::new(connector.clone());

        adapter
            .upsert_trade(&sample_trade(1, "10.5"))
            .await
            .expect("second attempt should succeed");

        assert_eq!(connector.opens(), 2);
        assert_eq!(connector.writes(), 1);
        assert!(adapter.is_connected());
    }

    #[tokio::test]
    async fn surfaces_error_after_single_retry() {
        let connector = Arc::new(FlakyConnector::new(0, 5));
        let mut adapter = PersistenceAdapter::new(connector.clone());

        let result = adapter.upsert_candle(&sample_candle(0, "11")).await;

        assert!(matches!(result, Err(StoreError::Write(_))));
        assert_eq!(connector.opens(), 2);
        assert_eq!(connector.writes(), 0);
        assert!(!adapter.is_connected());

        // The adapter stays usable once the store recovers.
        connector
            .failing_writes
            .store(0, std::sync::atomic::Ordering::SeqCst);
        adapter.upsert_candle(&sample_candle(0, "11")).await.unwrap();
        assert_eq!(connector.writes(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_is_retried_then_reported() {
        let connector = Arc::new(FlakyConnector::new(2, 0));
        let mut adapter = PersistenceAdapter::new(connector.clone());

        let result = adapter.upsert_trade(&sample_trade(1, "10.5")).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(connector.opens(), 2);
    }
}
