use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// Emitted when a block's runtime spec version differs from its
/// predecessor's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Row)]
pub struct RuntimeUpgradeRow {
    pub block_height: u32,
    pub spec_version: u32,
    pub prev_spec_version: u32,
}
