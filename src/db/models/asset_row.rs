use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// Asset metadata, emitted on first discovery and whenever symbol, name
/// or decimals change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Row)]
pub struct AssetRow {
    pub asset_id: u32,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}
