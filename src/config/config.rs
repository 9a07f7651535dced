use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// ClickHouse connection and batch-insert configuration.
///
/// The writer accumulates rows per table and flushes them in size-bounded
/// batches; each batch insert carries a deduplication token so a retried
/// insert after a partial failure is a no-op on the server.
#[derive(Debug, Deserialize, Clone)]
pub struct ClickHouseSettings {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_clickhouse_database")]
    pub database: String,
    /// Flush a table buffer once it holds this many rows.
    #[serde(default = "default_max_batch_rows")]
    pub max_batch_rows: usize,
    /// Attempts per batch insert before the flush is considered fatal.
    #[serde(default = "default_insert_max_retries")]
    pub insert_max_retries: u32,
    #[serde(default = "default_insert_retry_delay_ms")]
    pub insert_retry_delay_ms: u64,
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_user() -> String {
    "default".to_string()
}

fn default_clickhouse_database() -> String {
    "omniflow".to_string()
}

fn default_max_batch_rows() -> usize {
    10_000
}

fn default_insert_max_retries() -> u32 {
    3
}

fn default_insert_retry_delay_ms() -> u64 {
    500
}

impl Default for ClickHouseSettings {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            user: default_clickhouse_user(),
            password: String::new(),
            database: default_clickhouse_database(),
            max_batch_rows: default_max_batch_rows(),
            insert_max_retries: default_insert_max_retries(),
            insert_retry_delay_ms: default_insert_retry_delay_ms(),
        }
    }
}

/// Chain-side configuration.
///
/// The RPC endpoint is handed to the block gateway; the pipeline itself
/// only needs to know which asset anchors the price graph.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    #[serde(default)]
    pub rpc_url: String,
    /// Asset id of USDT on Hydration.
    #[serde(default = "default_usdt_asset_id")]
    pub usdt_asset_id: u32,
    /// Optional JSON block dump replayed instead of a live gateway.
    #[serde(default)]
    pub blocks_file: Option<String>,
}

fn default_usdt_asset_id() -> u32 {
    10
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            usdt_asset_id: default_usdt_asset_id(),
            blocks_file: None,
        }
    }
}

/// Pipeline tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerSettings {
    /// Asset-registry rescan interval (blocks) while backfilling.
    #[serde(default = "default_registry_backfill_interval")]
    pub registry_backfill_interval: u32,
    /// Asset-registry rescan interval (blocks) once at the chain tip.
    #[serde(default = "default_registry_live_interval")]
    pub registry_live_interval: u32,
    /// A block whose timestamp is within this many seconds of wall clock
    /// is treated as live.
    #[serde(default = "default_live_lag_seconds")]
    pub live_lag_seconds: u64,
}

fn default_registry_backfill_interval() -> u32 {
    7_200
}

fn default_registry_live_interval() -> u32 {
    600
}

fn default_live_lag_seconds() -> u64 {
    60
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            registry_backfill_interval: default_registry_backfill_interval(),
            registry_live_interval: default_registry_live_interval(),
            live_lag_seconds: default_live_lag_seconds(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` (optional) merged with `OMNIFLOW__`-prefixed
/// environment variables, e.g. `OMNIFLOW__CLICKHOUSE__PASSWORD`.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub clickhouse: ClickHouseSettings,
    #[serde(default)]
    pub chain: ChainSettings,
    #[serde(default)]
    pub indexer: IndexerSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("OMNIFLOW").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
