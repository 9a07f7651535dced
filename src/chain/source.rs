//! Block delivery.
//!
//! The live gateway implements [`BlockSource`] out of tree and drives the
//! pipeline with ordered batches. [`FixtureSource`] replays a JSON block
//! dump with embedded storage snapshots; it backs the integration tests
//! and offline reprocessing of exported ranges.

use std::{collections::VecDeque, path::Path, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::chain::block::{
    AccountId, AssetId, Block, BlockBatch, CallRecord, EventRecord, FinalizedHead,
};
use crate::chain::storage::{
    ChainStorage, OmnipoolAssetEntry, StableswapPoolEntry, XykPoolEntry,
};
use crate::decode::parse_u128;

/// Ordered block delivery. `None` means the source is exhausted (bounded
/// replay); a live gateway never returns `None`.
#[async_trait]
pub trait BlockSource: Send {
    async fn next_batch(&mut self) -> anyhow::Result<Option<BlockBatch>>;
}

const FIXTURE_BATCH_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    height: u32,
    hash: String,
    parent_hash: String,
    timestamp: i64,
    spec_version: u32,
    #[serde(default)]
    events: Vec<EventRecord>,
    #[serde(default)]
    calls: Vec<CallRecord>,
    #[serde(default)]
    storage: RawStorage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStorage {
    omnipool_assets: Option<Vec<(AssetId, OmnipoolAssetEntry)>>,
    xyk_pools: Option<Vec<XykPoolEntry>>,
    stableswap_pools: Option<Vec<StableswapPoolEntry>>,
    /// `"0x<account>:<asset_id>" -> amount` free balances.
    #[serde(default)]
    balances: FxHashMap<String, String>,
    registry_assets: Option<Vec<(AssetId, serde_json::Value)>>,
}

/// Storage snapshot carried by a fixture block.
pub struct FixtureStorage {
    omnipool: Option<Vec<(AssetId, OmnipoolAssetEntry)>>,
    xyk: Option<Vec<XykPoolEntry>>,
    stableswap: Option<Vec<StableswapPoolEntry>>,
    balances: FxHashMap<(AccountId, AssetId), u128>,
    registry: Option<Vec<(AssetId, serde_json::Value)>>,
}

impl FixtureStorage {
    fn from_raw(raw: RawStorage) -> anyhow::Result<Self> {
        let mut balances = FxHashMap::default();
        for (key, amount) in raw.balances {
            let (account, asset) = key
                .rsplit_once(':')
                .with_context(|| format!("malformed balance key {key}"))?;
            let account = AccountId::from_hex(account)
                .with_context(|| format!("malformed account in balance key {key}"))?;
            let asset: AssetId = asset.parse()?;
            balances.insert((account, asset), parse_u128(&amount)?);
        }
        Ok(Self {
            omnipool: raw.omnipool_assets,
            xyk: raw.xyk_pools,
            stableswap: raw.stableswap_pools,
            balances,
            registry: raw.registry_assets,
        })
    }
}

#[async_trait]
impl ChainStorage for FixtureStorage {
    async fn omnipool_assets(
        &self,
    ) -> anyhow::Result<Option<Vec<(AssetId, OmnipoolAssetEntry)>>> {
        Ok(self.omnipool.clone())
    }

    async fn omnipool_asset_states(
        &self,
        assets: &[AssetId],
    ) -> anyhow::Result<Vec<Option<OmnipoolAssetEntry>>> {
        let entries = self.omnipool.as_deref().unwrap_or(&[]);
        Ok(assets
            .iter()
            .map(|id| {
                entries
                    .iter()
                    .find(|(asset, _)| asset == id)
                    .map(|(_, entry)| entry.clone())
            })
            .collect())
    }

    async fn xyk_pools(&self) -> anyhow::Result<Option<Vec<XykPoolEntry>>> {
        Ok(self.xyk.clone())
    }

    async fn stableswap_pools(&self) -> anyhow::Result<Option<Vec<StableswapPoolEntry>>> {
        Ok(self.stableswap.clone())
    }

    async fn free_balances(
        &self,
        keys: &[(AccountId, AssetId)],
    ) -> anyhow::Result<Vec<Option<u128>>> {
        Ok(keys.iter().map(|key| self.balances.get(key).copied()).collect())
    }

    async fn registry_assets(
        &self,
    ) -> anyhow::Result<Option<Vec<(AssetId, serde_json::Value)>>> {
        Ok(self.registry.clone())
    }
}

/// Replays a JSON array of blocks in fixed-size batches. Every block in a
/// dump is final, so the finalized head tracks the batch tail.
pub struct FixtureSource {
    batches: VecDeque<BlockBatch>,
}

impl FixtureSource {
    pub fn from_file(path: &Path, start_height: u32) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read blocks file {}", path.display()))?;
        Self::from_json(&raw, start_height)
    }

    pub fn from_json(raw: &str, start_height: u32) -> anyhow::Result<Self> {
        let raw_blocks: Vec<RawBlock> =
            serde_json::from_str(raw).context("malformed blocks dump")?;

        let mut blocks = Vec::with_capacity(raw_blocks.len());
        for raw_block in raw_blocks {
            if raw_block.height < start_height {
                continue;
            }
            let storage = Arc::new(FixtureStorage::from_raw(raw_block.storage)?);
            blocks.push(Block {
                height: raw_block.height,
                hash: raw_block.hash,
                parent_hash: raw_block.parent_hash,
                timestamp: raw_block.timestamp,
                spec_version: raw_block.spec_version,
                events: raw_block.events,
                calls: raw_block.calls,
                storage,
            });
        }
        blocks.sort_by_key(|block| block.height);

        let batches = blocks
            .chunks(FIXTURE_BATCH_SIZE)
            .map(|chunk| BlockBatch {
                blocks: chunk.to_vec(),
                finalized_head: FinalizedHead {
                    height: chunk.last().map(|b| b.height).unwrap_or(0),
                    hash: chunk.last().map(|b| b.hash.clone()).unwrap_or_default(),
                },
            })
            .collect();

        Ok(Self { batches })
    }
}

#[async_trait]
impl BlockSource for FixtureSource {
    async fn next_batch(&mut self) -> anyhow::Result<Option<BlockBatch>> {
        Ok(self.batches.pop_front())
    }
}
