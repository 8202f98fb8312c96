// src/storage/postgres.rs
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::storage::{StoreConnection, StoreConnector};
use crate::types::{Candle, Trade};
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::warn;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");

const UPSERT_TRADE: &str = "INSERT INTO trades (coin, side, px, sz, time, hash, tid, user_buyer, user_seller) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
     ON CONFLICT (tid, coin, time) DO UPDATE SET \
       side = EXCLUDED.side, \
       px = EXCLUDED.px, \
       sz = EXCLUDED.sz, \
       hash = EXCLUDED.hash, \
       user_buyer = EXCLUDED.user_buyer, \
       user_seller = EXCLUDED.user_seller";

const UPSERT_CANDLE: &str = "INSERT INTO candles (t, s, i, o, c, h, l, v) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
     ON CONFLICT (t, s, i) DO UPDATE SET \
       o = EXCLUDED.o, \
       c = EXCLUDED.c, \
       h = EXCLUDED.h, \
       l = EXCLUDED.l, \
       v = EXCLUDED.v";

pub struct PostgresConnector {
    options: PgConnectOptions,
    target: String,
}

impl PostgresConnector {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        Self {
            options,
            target: format!(
                "postgres://{}@{}:{}/{}",
                config.user, config.host, config.port, config.database
            ),
        }
    }

    async fn connect_raw(&self) -> Result<PgConnection, StoreError> {
        PgConnection::connect_with(&self.options)
            .await
            .map_err(StoreError::Unavailable)
    }
}

#[async_trait]
impl StoreConnector for PostgresConnector {
    async fn open(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let conn = self.connect_raw().await?;
        Ok(Box::new(PostgresConnection { conn }))
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
        self.target.clone()
    }
}

struct PostgresConnection {
    conn: PgConnection,
}

#[async_trait]
impl StoreConnection for PostgresConnection {
    async fn upsert_trade(&mut self, trade: &Trade) -> Result<(), StoreError> {
        sqlx::query(UPSERT_TRADE)
            .bind(&trade.coin)
            .bind(trade.side.as_str())
            .bind(trade.px)
            .bind(trade.sz)
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
            .bind(candle.o)
            .bind(candle.c)
            .bind(candle.h)
            .bind(candle.l)
            .bind(candle.v)
            .execute(&mut self.conn)
            .await
            .map_err(StoreError::Write)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.conn.close().await.map_err(StoreError::Unavailable)
    }
}
