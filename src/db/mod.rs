pub mod clickhouse;
pub mod models;

use async_trait::async_trait;

use crate::chain::block::AssetId;
use crate::db::models::{AssetRow, BlockRow, Checkpoint, PriceRow, RuntimeUpgradeRow};

pub use clickhouse::ClickhouseClient;

/// The analytical store as the pipeline sees it: batched, token-
/// deduplicated inserts plus the few reads the core is allowed
/// (checkpoints at startup, historical prices for the replay pass).
///
/// Implemented by [`ClickhouseClient`]; tests substitute an in-memory
/// recorder.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_prices(&self, rows: &[PriceRow], token: &str) -> anyhow::Result<()>;
    async fn insert_blocks(&self, rows: &[BlockRow], token: &str) -> anyhow::Result<()>;
    async fn insert_assets(&self, rows: &[AssetRow], token: &str) -> anyhow::Result<()>;
    async fn insert_runtime_upgrades(
        &self,
        rows: &[RuntimeUpgradeRow],
        token: &str,
    ) -> anyhow::Result<()>;

    async fn read_checkpoint(&self, id: &str) -> anyhow::Result<Option<Checkpoint>>;
    async fn write_checkpoint(&self, checkpoint: &Checkpoint) -> anyhow::Result<()>;

    /// Latest known price per asset at or below `height`, for the
    /// volume-only replay pass.
    async fn price_snapshot_at(&self, height: u32) -> anyhow::Result<Vec<(AssetId, String)>>;
}
