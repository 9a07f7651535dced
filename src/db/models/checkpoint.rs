use clickhouse::Row;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Checkpoint identity of the main pipeline.
pub const MAIN_CHECKPOINT: &str = "main";
/// Checkpoint identity of the volume-only replay pass.
pub const REPLAY_CHECKPOINT: &str = "replay";

/// Pipeline progress marker: `last_block` is the highest finalized block
/// fully flushed to the store. Hot blocks are flushed but never advance
/// the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Row)]
pub struct Checkpoint {
    pub id: String,
    pub last_block: u32,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub updated_at: OffsetDateTime,
}

impl Checkpoint {
    pub fn new(id: &str, last_block: u32) -> Self {
        Self { id: id.to_string(), last_block, updated_at: OffsetDateTime::now_utc() }
    }
}
