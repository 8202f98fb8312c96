// src/storage/sqlite.rs
use crate::error::StoreError;
use crate::storage::{StoreConnection, StoreConnector};
use crate::types::{Candle, Trade};
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");

// Both listeners write to the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const UPSERT_TRADE: &str = "INSERT INTO trades (coin, side, px, sz, time, hash, tid, user_buyer, user_seller) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT (tid, coin, time) DO UPDATE SET \
       side = excluded.side, \
       px = excluded.px, \
       sz = excluded.sz, \
       hash = excluded.hash, \
       user_buyer = excluded.user_buyer, \
       user_seller = excluded.user_seller";

const UPSERT_CANDLE: &str = "INSERT INTO candles (t, s, i, o, c, h, l, v) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT (t, s, i) DO UPDATE SET \
       o = excluded.o, \
       c = excluded.c, \
       h = excluded.h, \
       l = excluded.l, \
       v = excluded.v";

pub struct SqliteConnector {
    path: PathBuf,
    options: SqliteConnectOptions,
}

impl SqliteConnector {
    pub fn new(path: &Path) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        Self {
            path: path.to_path_buf(),
            options,
        }
    }

    async fn connect_raw(&self) -> Result<SqliteConnection, StoreError> {
        SqliteConnection::connect_with(&self.options)
            .await
            .map_err(StoreError::Unavailable)
    }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
    async fn open(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let conn = self.connect_raw().await?;
        Ok(Box::new(SqliteStoreConnection { conn }))
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let mut conn = self.connect_raw().await?;
        MIGRATOR.run_direct(&mut conn).await?;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "migration connection did not close cleanly");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

struct SqliteStoreConnection {
    conn: SqliteConnection,
}

#[async_trait]
impl StoreConnection for SqliteStoreConnection {
    async fn upsert_trade(&mut self, trade: &Trade) -> Result<(), StoreError> {
        sqlx::query(UPSERT_TRADE)
            .bind(&trade.coin)
            .bind(trade.side.as_str())
            .bind(trade.px.to_string())
            .bind(trade.sz.to_string())
            .bind(trade.time)
            .bind(&trade.hash)
            .bind(trade.tid)
            .bind(&trade.user_buyer)
            .bind(&trade.user_seller)
            .execute(&mut self.conn)
            .await
            .map_err(StoreError::Write)?;
        Ok(())
    }

    async fn upsert_candle(&mut self, candle: &Candle) -> Result<(), StoreError> {
        sqlx::query(UPSERT_CANDLE)
            .bind(candle.t)
            .bind(&candle.s)
            .bind(&candle.i)
            .bind(candle.o.to_string())
            .bind(candle.c.to_string())
            .bind(candle.h.to_string())
            .bind(candle.l.to_string())
            .bind(candle.v.to_string())
            .execute(&mut self.conn)
            .await
            .map_err(StoreError::Write)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.conn.close().await.map_err(StoreError::Unavailable)
    }
}
