use clickhouse::Row;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Block metadata, emitted for every block processed. The OHLC
/// materialized views join price rows against this table, so it must be
/// inserted before the block's prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Row)]
pub struct BlockRow {
    pub block_height: u32,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub block_timestamp: OffsetDateTime,
    pub spec_version: u32,
}

impl BlockRow {
    /// `timestamp_ms` is the chain timestamp in milliseconds.
    pub fn new(block_height: u32, timestamp_ms: i64, spec_version: u32) -> Self {
        let block_timestamp = OffsetDateTime::from_unix_timestamp(timestamp_ms / 1_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Self { block_height, block_timestamp, spec_version }
    }
}
