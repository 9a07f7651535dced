mod config;

pub use config::{ChainSettings, ClickHouseSettings, IndexerSettings, Settings};
