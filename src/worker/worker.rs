//! The block-processing pipeline.
//!
//! Blocks are processed strictly in order: runtime-upgrade detection,
//! registry tick, incremental composition updates, the carry-forward
//! decision, then for price-moving blocks a batched state read, price
//! resolution, volume extraction and the row merge. Buffers flush in
//! size-bounded batches and the checkpoint advances only over finalized
//! heights.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::cache::PoolCompositionCache;
use crate::chain::block::{Block, BlockBatch};
use crate::chain::source::BlockSource;
use crate::config::Settings;
use crate::db::models::{
    BlockRow, Checkpoint, RuntimeUpgradeRow, MAIN_CHECKPOINT, REPLAY_CHECKPOINT,
};
use crate::db::Store;
use crate::detect::ChangeDetector;
use crate::math::parse_fixed12;
use crate::price::{PriceMap, PriceResolver};
use crate::registry::AssetRegistryTracker;
use crate::state::read_pool_states;
use crate::volume::{extract_volumes, merge_rows};
use crate::writer::RowBuffers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Normal operation: prices and volumes per block.
    Follow,
    /// Volume-only backfill using prices already in the store.
    ReplayVolumes,
}

pub struct Pipeline<S: Store> {
    store: Arc<S>,
    mode: PipelineMode,
    usdt_asset_id: u32,
    live_lag_seconds: u64,
    to_block: Option<u32>,

    cache: PoolCompositionCache,
    detector: ChangeDetector,
    registry: AssetRegistryTracker,
    buffers: RowBuffers,

    /// Price snapshot of the last fully processed block; carry-forward
    /// blocks keep it alive.
    last_prices: Option<PriceMap>,
    prev_spec_version: Option<u32>,

    highest_buffered: Option<u32>,
    flushed_to: Option<u32>,
    checkpointed: Option<u32>,
    finalized: Option<u32>,
}

impl<S: Store> Pipeline<S> {
    pub fn new(
        store: Arc<S>,
        settings: &Settings,
        mode: PipelineMode,
        to_block: Option<u32>,
    ) -> Self {
        Self {
            store,
            mode,
            usdt_asset_id: settings.chain.usdt_asset_id,
            live_lag_seconds: settings.indexer.live_lag_seconds,
            to_block,
            cache: PoolCompositionCache::new(),
            detector: ChangeDetector::new(),
            registry: AssetRegistryTracker::new(&settings.indexer),
            buffers: RowBuffers::new(settings.clickhouse.max_batch_rows),
            last_prices: None,
            prev_spec_version: None,
            highest_buffered: None,
            flushed_to: None,
            checkpointed: None,
            finalized: None,
        }
    }

    fn checkpoint_id(&self) -> &'static str {
        match self.mode {
            PipelineMode::Follow => MAIN_CHECKPOINT,
            PipelineMode::ReplayVolumes => REPLAY_CHECKPOINT,
        }
    }

    /// Where the block source should begin: the block after the stored
    /// checkpoint, or genesis when none exists.
    pub async fn start_height(&self) -> anyhow::Result<u32> {
        Ok(self
            .store
            .read_checkpoint(self.checkpoint_id())
            .await?
            .map(|checkpoint| checkpoint.last_block + 1)
            .unwrap_or(0))
    }

    /// Pull batches until the source is exhausted, the target block is
    /// reached, or cancellation fires; then flush and checkpoint.
    pub async fn run<Src: BlockSource>(
        &mut self,
        source: &mut Src,
        token: CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            let batch = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("shutdown requested, stopping block intake");
                    break;
                }
                batch = source.next_batch() => batch?,
            };
            let Some(batch) = batch else {
                info!("block source exhausted");
                break;
            };
            if self.process_batch(&batch, &token).await? {
                break;
            }
        }

        self.flush_and_checkpoint(true).await?;
        info!(
            "pipeline stopped (flushed to {:?}, checkpoint {:?})",
            self.flushed_to, self.checkpointed
        );
        Ok(())
    }

    /// Process one batch. Returns `true` once the pipeline should stop
    /// (`--to-block` reached or cancellation observed mid-batch).
    pub async fn process_batch(
        &mut self,
        batch: &BlockBatch,
        token: &CancellationToken,
    ) -> anyhow::Result<bool> {
        let mut done = false;
        // Parent-hash continuity is tracked inside a batch only; resets
        // here avoid false positives across batch seams.
        let mut prev: Option<(u32, String)> = None;

        for block in &batch.blocks {
            if let Some(to_block) = self.to_block {
                if block.height > to_block {
                    done = true;
                    break;
                }
            }

            if let Some((prev_height, prev_hash)) = &prev {
                if block.height <= *prev_height {
                    warn!(
                        "non-ascending block {} after {} in batch",
                        block.height, prev_height
                    );
                }
                if &block.parent_hash != prev_hash {
                    warn!(
                        "parent hash mismatch at block {}: expected {}, got {}",
                        block.height, prev_hash, block.parent_hash
                    );
                }
            }
            prev = Some((block.height, block.hash.clone()));

            match self.mode {
                PipelineMode::Follow => self.process_block(block).await?,
                PipelineMode::ReplayVolumes => self.replay_block(block).await?,
            }

            if self.to_block == Some(block.height) {
                done = true;
                break;
            }
            if token.is_cancelled() {
                // Finish the block that was in flight, nothing more.
                done = true;
                break;
            }
        }

        self.finalized = Some(
            self.finalized
                .unwrap_or(0)
                .max(batch.finalized_head.height),
        );
        // At the tip, flush every batch so consumers see fresh rows;
        // during backfill the size bound drives flushing.
        let at_tip = batch.blocks.last().map(|block| self.is_live(block)).unwrap_or(false);
        self.flush_and_checkpoint(done || at_tip).await?;
        Ok(done)
    }

    fn is_live(&self, block: &Block) -> bool {
        let now = Utc::now().timestamp();
        now.saturating_sub(block.timestamp / 1_000) < self.live_lag_seconds as i64
    }

    async fn process_block(&mut self, block: &Block) -> anyhow::Result<()> {
        // Runtime upgrade: emit the row and drop every composition cache;
        // storage migrations can reshape pool state silently.
        let mut upgraded = false;
        if let Some(prev_version) = self.prev_spec_version {
            if prev_version != block.spec_version {
                info!(
                    "runtime upgrade at block {}: spec {} -> {}",
                    block.height, prev_version, block.spec_version
                );
                self.buffers.push_upgrade(RuntimeUpgradeRow {
                    block_height: block.height,
                    spec_version: block.spec_version,
                    prev_spec_version: prev_version,
                });
                self.cache.invalidate_all();
                upgraded = true;
            }
        }
        self.prev_spec_version = Some(block.spec_version);

        let live = self.is_live(block);
        let asset_rows = self.registry.maybe_scan(block, live).await;
        if !asset_rows.is_empty() {
            info!("registry scan found {} new or changed assets", asset_rows.len());
            self.buffers.push_assets(asset_rows);
        }

        let composition_changed =
            self.cache.process_events(&block.events, block.height) || upgraded;

        // Pool-affecting sudo writes both force a full run and poison the
        // caches: re-bootstrap before reading state.
        if self.detector.pool_sudo_write(block) {
            info!("pool-affecting set_storage at block {}, invalidating caches", block.height);
            self.cache.invalidate_all();
        }

        self.buffers
            .push_block(BlockRow::new(block.height, block.timestamp, block.spec_version));

        let xyk_accounts: Vec<_> = self.cache.cached_xyk_accounts().collect();
        let stableswap_ids: Vec<_> = self.cache.cached_stableswap_ids().collect();
        let full_run = self.detector.requires_full_run(
            block,
            composition_changed,
            self.last_prices.is_some(),
            &xyk_accounts,
            &stableswap_ids,
        );

        if full_run {
            let states = read_pool_states(block, &mut self.cache).await;
            let resolver =
                PriceResolver::new(self.usdt_asset_id, self.registry.decimals_view());
            let prices = resolver.resolve(&states);
            let volumes = extract_volumes(&block.events, &prices, self.registry.decimals_view());
            let rows = merge_rows(block.height, &prices, &volumes);
            debug!(
                "block {}: {} prices, {} assets with volume",
                block.height,
                prices.len(),
                volumes.len()
            );
            self.buffers.push_prices(rows);
            self.last_prices = Some(prices);
        } else {
            debug!("block {}: carry-forward", block.height);
        }

        self.highest_buffered = Some(block.height);
        Ok(())
    }

    /// Volume-only backfill: prices come from the store instead of the
    /// resolver, and only assets with volume get rows.
    async fn replay_block(&mut self, block: &Block) -> anyhow::Result<()> {
        let live = self.is_live(block);
        let asset_rows = self.registry.maybe_scan(block, live).await;
        if !asset_rows.is_empty() {
            self.buffers.push_assets(asset_rows);
        }

        let has_swaps = block.events.iter().any(|event| {
            matches!(event.name.as_str(), "SellExecuted" | "BuyExecuted")
                && matches!(event.pallet.as_str(), "Omnipool" | "XYK" | "Stableswap")
        });
        if has_swaps {
            let mut prices = PriceMap::default();
            for (asset_id, raw) in self.store.price_snapshot_at(block.height).await? {
                match parse_fixed12(&raw) {
                    Some(price) => {
                        prices.insert(asset_id, price);
                    }
                    None => warn!("unparseable stored price {raw} for asset {asset_id}"),
                }
            }

            let volumes = extract_volumes(&block.events, &prices, self.registry.decimals_view());
            prices.retain(|asset_id, _| volumes.contains_key(asset_id));
            self.buffers.push_prices(merge_rows(block.height, &prices, &volumes));
        }

        self.highest_buffered = Some(block.height);
        Ok(())
    }

    /// Flush when a buffer hit its bound (always on `force`), then move
    /// the checkpoint up to the finalized part of what was flushed.
    async fn flush_and_checkpoint(&mut self, force: bool) -> anyhow::Result<()> {
        if self.buffers.should_flush() || (force && !self.buffers.is_empty()) {
            self.buffers.flush(self.store.as_ref()).await?;
            self.flushed_to = self.highest_buffered;
        }

        let (Some(flushed_to), Some(finalized)) = (self.flushed_to, self.finalized) else {
            return Ok(());
        };
        let target = flushed_to.min(finalized);
        if self.checkpointed.map_or(true, |current| target > current) {
            self.store
                .write_checkpoint(&Checkpoint::new(self.checkpoint_id(), target))
                .await?;
            self.checkpointed = Some(target);
        }
        Ok(())
    }
}
