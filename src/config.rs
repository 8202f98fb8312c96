// src/config.rs

use crate::core::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use crate::error::ConfigError;
use crate::connectors::messages::DEFAULT_CANDLE_INTERVAL;
use crate::types::interval_ms;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";
pub const DEFAULT_INFO_URL: &str = "https://api.hyperliquid.xyz/info";
/// HYPE/USDC spot.
pub const DEFAULT_SYMBOL: &str = "@107";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Deployment {
    Dev,
    Prod,
    Local,
}

impl Deployment {
    fn env_prefix(self) -> &'static str {
        match self {
            Self::Dev => "DEV",
            Self::Prod => "PROD",
            Self::Local => "LOCAL",
        }
    }
}

/// Postgres parameters, read from `<ENV>_DATABASE`, `<ENV>_HOST`, ...
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub database: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres(DatabaseConfig),
    Sqlite { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct LocalStoreConfig {
    database: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VenueConfig {
    pub ws_url: String,
    pub info_url: String,
    pub symbol: String,
    pub candle_interval: String,
    pub heartbeat_secs: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl VenueConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ws = Url::parse(&self.ws_url)
            .map_err(|e| ConfigError::Invalid(format!("ws_url '{}': {e}", self.ws_url)))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid(format!(
                "ws_url must use ws or wss, got '{}'",
                ws.scheme()
            )));
        }
        Url::parse(&self.info_url)
            .map_err(|e| ConfigError::Invalid(format!("info_url '{}': {e}", self.info_url)))?;

        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty".to_string()));
        }
        if interval_ms(&self.candle_interval).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown candle_interval '{}'",
                self.candle_interval
            )));
        }
        if self.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_secs must be positive".to_string(),
            ));
        }
        if self.reconnect_base_ms == 0 || self.reconnect_max_ms < self.reconnect_base_ms {
            return Err(ConfigError::Invalid(
                "reconnect_base_ms must be positive and not exceed reconnect_max_ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub deployment: Deployment,
    pub store: StoreConfig,
    pub venue: VenueConfig,
    pub coinapi_key: Option<String>,
}

impl AppConfig {
    /// Reads the process environment (after `.env`) and the optional
    /// `Settings` file.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_env(Environment::default())
    }

    /// `env` is the unprefixed environment source; tests inject their own map.
    pub fn from_env(env: Environment) -> Result<Self, ConfigError> {
        let root = Config::builder().add_source(env.clone()).build()?;

        let deployment: Deployment = root
            .get("environment")
            .map_err(|_| ConfigError::Invalid("ENVIRONMENT must be DEV, PROD or LOCAL".to_string()))?;

        let store = match deployment {
            Deployment::Dev | Deployment::Prod => StoreConfig::Postgres(
                prefixed(&env, deployment.env_prefix())?.try_deserialize()?,
            ),
            Deployment::Local => {
                let local: LocalStoreConfig =
                    prefixed(&env, deployment.env_prefix())?.try_deserialize()?;
                StoreConfig::Sqlite {
                    path: local.database,
                }
            }
        };

        let venue: VenueConfig = Config::builder()
            .set_default("ws_url", DEFAULT_WS_URL)?
            .set_default("info_url", DEFAULT_INFO_URL)?
            .set_default("symbol", DEFAULT_SYMBOL)?
            .set_default("candle_interval", DEFAULT_CANDLE_INTERVAL)?
            .set_default("heartbeat_secs", DEFAULT_HEARTBEAT_INTERVAL.as_secs())?
            .set_default("reconnect_base_ms", 500)?
            .set_default("reconnect_max_ms", 30_000)?
            .add_source(File::with_name("Settings").required(false))
            .add_source(env.clone().prefix("VENUE").try_parsing(true))
            .build()?
            .try_deserialize()?;
        venue.validate()?;

        let coinapi_key = root
            .get_string("coinapi_api_key")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Ok(Self {
            deployment,
            store,
            venue,
            coinapi_key,
        })
    }
}

fn prefixed(env: &Environment, prefix: &str) -> Result<Config, ConfigError> {
    Ok(Config::builder()
        .add_source(env.clone().prefix(prefix).try_parsing(true))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::default().source(Some(map))
    }

    #[test]
    fn reads_postgres_parameters_for_deployment() {
        let config = AppConfig::from_env(env_of(&[
            ("ENVIRONMENT", "PROD"),
            ("PROD_DATABASE", "hypewatch"),
            ("PROD_HOST", "db.internal"),
            ("PROD_PORT", "5433"),
            ("PROD_USER", "ingest"),
            ("PROD_PASSWORD", "pw"),
            ("DEV_HOST", "ignored"),
        ]))
        .expect("complete PROD environment should load");

        assert_eq!(config.deployment, Deployment::Prod);
        let StoreConfig::Postgres(db) = config.store else {
            panic!("PROD should use postgres");
        };
        assert_eq!(db.host, "db.internal");
        assert_eq!(db.port, 5433);
        assert_eq!(config.venue.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.venue.symbol, DEFAULT_SYMBOL);
        assert_eq!(config.venue.heartbeat_interval(), Duration::from_secs(15));
        assert!(config.coinapi_key.is_none());
    }

    #[test]
    fn local_deployment_uses_sqlite_file() {
        let config = AppConfig::from_env(env_of(&[
            ("ENVIRONMENT", "LOCAL"),
            ("LOCAL_DATABASE", "/tmp/hypewatch.db"),
            ("VENUE_HEARTBEAT_SECS", "5"),
            ("COINAPI_API_KEY", "key"),
        ]))
        .unwrap();

        assert!(matches!(config.store, StoreConfig::Sqlite { ref path } if path == &PathBuf::from("/tmp/hypewatch.db")));
        assert_eq!(config.venue.heartbeat_secs, 5);
        assert_eq!(config.coinapi_key.as_deref(), Some("key"));
    }

    #[test]
    fn rejects_missing_or_unknown_environment() {
        assert!(AppConfig::from_env(env_of(&[])).is_err());
        assert!(AppConfig::from_env(env_of(&[("ENVIRONMENT", "STAGING")])).is_err());
    }

    #[test]
    fn rejects_missing_database_parameter() {
        let result = AppConfig::from_env(env_of(&[
            ("ENVIRONMENT", "DEV"),
            ("DEV_DATABASE", "hypewatch"),
            ("DEV_HOST", "localhost"),
            ("DEV_PORT", "5432"),
            ("DEV_USER", "ingest"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_invalid_venue_settings() {
        let base = [("ENVIRONMENT", "LOCAL"), ("LOCAL_DATABASE", "x.db")];

        let mut bad_url = base.to_vec();
        bad_url.push(("VENUE_WS_URL", "https://api.hyperliquid.xyz/ws"));
        assert!(AppConfig::from_env(env_of(&bad_url)).is_err());

        let mut bad_interval = base.to_vec();
        bad_interval.push(("VENUE_CANDLE_INTERVAL", "7m"));
        assert!(AppConfig::from_env(env_of(&bad_interval)).is_err());

        let mut bad_backoff = base.to_vec();
        bad_backoff.push(("VENUE_RECONNECT_BASE_MS", "60000"));
        assert!(AppConfig::from_env(env_of(&bad_backoff)).is_err());
    }
}
