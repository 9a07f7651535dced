//! Batched row accumulation and ordered flushing.
//!
//! Four per-table buffers fill as blocks are processed and drain in one
//! flush: blocks strictly before prices (the store's OHLC materialized
//! views join prices against blocks on insert), assets and runtime
//! upgrades concurrently afterwards. Each batch carries a deterministic
//! deduplication token derived from its key range.

use log::info;

use crate::db::models::{AssetRow, BlockRow, PriceRow, RuntimeUpgradeRow};
use crate::db::Store;

/// `{table}:{min}:{max}:{count}` over the batch's key range. Buffers
/// cover contiguous height windows, so identical retried batches map to
/// identical tokens.
fn dedup_token(table: &str, min_key: u32, max_key: u32, count: usize) -> String {
    format!("{table}:{min_key}:{max_key}:{count}")
}

fn key_range<T>(rows: &[T], key: impl Fn(&T) -> u32) -> (u32, u32) {
    let min = rows.iter().map(&key).min().unwrap_or(0);
    let max = rows.iter().map(&key).max().unwrap_or(0);
    (min, max)
}

pub struct RowBuffers {
    max_rows: usize,
    prices: Vec<PriceRow>,
    blocks: Vec<BlockRow>,
    assets: Vec<AssetRow>,
    upgrades: Vec<RuntimeUpgradeRow>,
}

impl RowBuffers {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows: max_rows.max(1),
            prices: Vec::new(),
            blocks: Vec::new(),
            assets: Vec::new(),
            upgrades: Vec::new(),
        }
    }

    pub fn push_prices(&mut self, rows: Vec<PriceRow>) {
        self.prices.extend(rows);
    }

    pub fn push_block(&mut self, row: BlockRow) {
        self.blocks.push(row);
    }

    pub fn push_assets(&mut self, rows: Vec<AssetRow>) {
        self.assets.extend(rows);
    }

    pub fn push_upgrade(&mut self, row: RuntimeUpgradeRow) {
        self.upgrades.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
            && self.blocks.is_empty()
            && self.assets.is_empty()
            && self.upgrades.is_empty()
    }

    /// Whether any buffer reached the size bound.
    pub fn should_flush(&self) -> bool {
        self.prices.len() >= self.max_rows
            || self.blocks.len() >= self.max_rows
            || self.assets.len() >= self.max_rows
            || self.upgrades.len() >= self.max_rows
    }

    /// Drain every buffer into the store. A failure here is fatal to the
    /// pipeline: the checkpoint was not advanced, so a restart replays
    /// the same window onto idempotent keys.
    pub async fn flush<S: Store + ?Sized>(&mut self, store: &S) -> anyhow::Result<()> {
        let blocks = std::mem::take(&mut self.blocks);
        if !blocks.is_empty() {
            let (min, max) = key_range(&blocks, |row| row.block_height);
            store
                .insert_blocks(&blocks, &dedup_token("blocks", min, max, blocks.len()))
                .await?;
        }

        // Blocks are inserted and acknowledged above; only now may the
        // price rows land.
        let prices = std::mem::take(&mut self.prices);
        if !prices.is_empty() {
            let (min, max) = key_range(&prices, |row| row.block_height);
            store
                .insert_prices(&prices, &dedup_token("prices", min, max, prices.len()))
                .await?;
        }

        let assets = std::mem::take(&mut self.assets);
        let upgrades = std::mem::take(&mut self.upgrades);
        let assets_fut = async {
            if assets.is_empty() {
                return Ok(());
            }
            let (min, max) = key_range(&assets, |row| row.asset_id);
            store.insert_assets(&assets, &dedup_token("assets", min, max, assets.len())).await
        };
        let upgrades_fut = async {
            if upgrades.is_empty() {
                return Ok(());
            }
            let (min, max) = key_range(&upgrades, |row| row.block_height);
            store
                .insert_runtime_upgrades(
                    &upgrades,
                    &dedup_token("runtime_upgrades", min, max, upgrades.len()),
                )
                .await
        };
        let (assets_res, upgrades_res) = tokio::join!(assets_fut, upgrades_fut);
        assets_res?;
        upgrades_res?;

        let total = blocks.len() + prices.len() + assets.len() + upgrades.len();
        if total > 0 {
            info!(
                "Committed {total} rows [Blocks:{} Prices:{} Assets:{} Upgrades:{}]",
                blocks.len(),
                prices.len(),
                assets.len(),
                upgrades.len()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::block::AssetId;
    use crate::db::models::Checkpoint;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        inserts: Mutex<Vec<(String, String, usize)>>,
    }

    impl RecordingStore {
        fn record(&self, table: &str, token: &str, count: usize) {
            self.inserts.lock().unwrap().push((table.into(), token.into(), count));
        }
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn insert_prices(&self, rows: &[PriceRow], token: &str) -> anyhow::Result<()> {
            self.record("prices", token, rows.len());
            Ok(())
        }

        async fn insert_blocks(&self, rows: &[BlockRow], token: &str) -> anyhow::Result<()> {
            self.record("blocks", token, rows.len());
            Ok(())
        }

        async fn insert_assets(&self, rows: &[AssetRow], token: &str) -> anyhow::Result<()> {
            self.record("assets", token, rows.len());
            Ok(())
        }

        async fn insert_runtime_upgrades(
            &self,
            rows: &[RuntimeUpgradeRow],
            token: &str,
        ) -> anyhow::Result<()> {
            self.record("runtime_upgrades", token, rows.len());
            Ok(())
        }

        async fn read_checkpoint(&self, _id: &str) -> anyhow::Result<Option<Checkpoint>> {
            Ok(None)
        }

        async fn write_checkpoint(&self, _checkpoint: &Checkpoint) -> anyhow::Result<()> {
            Ok(())
        }

        async fn price_snapshot_at(
            &self,
            _height: u32,
        ) -> anyhow::Result<Vec<(AssetId, String)>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn blocks_flush_before_prices() {
        let store = RecordingStore::default();
        let mut buffers = RowBuffers::new(1000);

        buffers.push_prices(vec![PriceRow::price_only(5, 11, 1)]);
        buffers.push_block(BlockRow::new(11, 1_700_000_000_000, 201));
        buffers.push_block(BlockRow::new(12, 1_700_000_012_000, 201));
        buffers.flush(&store).await.unwrap();

        let inserts = store.inserts.lock().unwrap();
        assert_eq!(inserts[0].0, "blocks");
        assert_eq!(inserts[0].1, "blocks:11:12:2");
        assert_eq!(inserts[1].0, "prices");
        assert_eq!(inserts[1].1, "prices:11:11:1");
    }

    #[tokio::test]
    async fn flush_drains_and_token_is_reproducible() {
        let store = RecordingStore::default();
        let mut buffers = RowBuffers::new(2);

        assert!(!buffers.should_flush());
        buffers.push_prices(vec![
            PriceRow::price_only(1, 7, 10),
            PriceRow::price_only(2, 7, 20),
        ]);
        assert!(buffers.should_flush());
        buffers.flush(&store).await.unwrap();
        assert!(buffers.is_empty());

        // Re-buffering the identical batch yields the identical token.
        buffers.push_prices(vec![
            PriceRow::price_only(1, 7, 10),
            PriceRow::price_only(2, 7, 20),
        ]);
        buffers.flush(&store).await.unwrap();

        let inserts = store.inserts.lock().unwrap();
        assert_eq!(inserts[0], ("prices".into(), "prices:7:7:2".into(), 2));
        assert_eq!(inserts[1], ("prices".into(), "prices:7:7:2".into(), 2));
    }

    #[tokio::test]
    async fn asset_tokens_use_the_asset_id_range() {
        let store = RecordingStore::default();
        let mut buffers = RowBuffers::new(1000);
        buffers.push_assets(vec![
            AssetRow { asset_id: 3, symbol: "A".into(), name: "A".into(), decimals: 12 },
            AssetRow { asset_id: 9, symbol: "B".into(), name: "B".into(), decimals: 6 },
        ]);
        buffers.flush(&store).await.unwrap();
        let inserts = store.inserts.lock().unwrap();
        assert_eq!(inserts[0].1, "assets:3:9:2");
    }
}
