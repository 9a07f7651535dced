//! Shared test harness: an in-memory `Store` that records inserts in
//! arrival order, plus settings tuned for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use omniflow::chain::block::AssetId;
use omniflow::config::{ChainSettings, ClickHouseSettings, IndexerSettings, Settings};
use omniflow::db::models::{AssetRow, BlockRow, Checkpoint, PriceRow, RuntimeUpgradeRow};
use omniflow::db::Store;

#[derive(Default)]
pub struct MemoryStore {
    /// Table names in insert order, to assert flush ordering.
    pub insert_order: Mutex<Vec<String>>,
    pub prices: Mutex<Vec<PriceRow>>,
    pub blocks: Mutex<Vec<BlockRow>>,
    pub assets: Mutex<Vec<AssetRow>>,
    pub upgrades: Mutex<Vec<RuntimeUpgradeRow>>,
    pub checkpoints: Mutex<Vec<Checkpoint>>,
    /// Canned response for `price_snapshot_at`, used by replay tests.
    pub snapshot: Mutex<Vec<(AssetId, String)>>,
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_prices(&self, rows: &[PriceRow], _token: &str) -> anyhow::Result<()> {
        self.insert_order.lock().unwrap().push("prices".into());
        self.prices.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn insert_blocks(&self, rows: &[BlockRow], _token: &str) -> anyhow::Result<()> {
        self.insert_order.lock().unwrap().push("blocks".into());
        self.blocks.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn insert_assets(&self, rows: &[AssetRow], _token: &str) -> anyhow::Result<()> {
        self.insert_order.lock().unwrap().push("assets".into());
        self.assets.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn insert_runtime_upgrades(
        &self,
        rows: &[RuntimeUpgradeRow],
        _token: &str,
    ) -> anyhow::Result<()> {
        self.insert_order.lock().unwrap().push("runtime_upgrades".into());
        self.upgrades.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn read_checkpoint(&self, id: &str) -> anyhow::Result<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|checkpoint| checkpoint.id == id)
            .cloned())
    }

    async fn write_checkpoint(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        self.checkpoints.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }

    async fn price_snapshot_at(&self, _height: u32) -> anyhow::Result<Vec<(AssetId, String)>> {
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

pub fn test_settings() -> Settings {
    Settings {
        clickhouse: ClickHouseSettings::default(),
        chain: ChainSettings::default(),
        indexer: IndexerSettings::default(),
    }
}
