//! Block-scoped chain storage access.
//!
//! The block source owns the version-guarded storage decoders; the
//! pipeline only sees this handle. Every method reads at the block the
//! handle was issued for. Pool scans return `None` when the pallet is
//! not present at that block yet.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::block::{AccountId, AssetId};
use crate::decode::u128_str;

/// Omnipool per-asset storage entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OmnipoolAssetEntry {
    #[serde(with = "u128_str")]
    pub hub_reserve: u128,
    #[serde(with = "u128_str")]
    pub shares: u128,
    #[serde(with = "u128_str")]
    pub protocol_shares: u128,
    #[serde(with = "u128_str")]
    pub cap: u128,
    /// Tradability bitflags as stored on chain.
    #[serde(default)]
    pub tradable: u8,
}

/// One XYK pool: sovereign account plus its asset pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XykPoolEntry {
    pub account: AccountId,
    pub asset_a: AssetId,
    pub asset_b: AssetId,
}

/// Static Stableswap pool parameters; reserves are read per block from
/// the derived sub-account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StableswapPoolEntry {
    pub pool_id: AssetId,
    pub assets: Vec<AssetId>,
    pub initial_amplification: u64,
    pub final_amplification: u64,
    pub initial_block: u32,
    pub final_block: u32,
    pub fee: u32,
}

/// Storage reads scoped to one block.
///
/// Implemented by the gateway (generated schema bindings) and by the
/// fixture source for offline replay.
#[async_trait]
pub trait ChainStorage: Send + Sync {
    /// Paged scan of every Omnipool asset state.
    async fn omnipool_assets(&self)
        -> anyhow::Result<Option<Vec<(AssetId, OmnipoolAssetEntry)>>>;

    /// Batched point reads of Omnipool asset states for known asset ids.
    /// Entries are returned in key order; a missing asset yields `None`.
    async fn omnipool_asset_states(
        &self,
        assets: &[AssetId],
    ) -> anyhow::Result<Vec<Option<OmnipoolAssetEntry>>>;

    /// Paged scan of every XYK pool.
    async fn xyk_pools(&self) -> anyhow::Result<Option<Vec<XykPoolEntry>>>;

    /// Paged scan of every Stableswap pool.
    async fn stableswap_pools(&self) -> anyhow::Result<Option<Vec<StableswapPoolEntry>>>;

    /// Batched `Tokens.Accounts` free-balance reads, in key order.
    async fn free_balances(
        &self,
        keys: &[(AccountId, AssetId)],
    ) -> anyhow::Result<Vec<Option<u128>>>;

    /// Paged scan of the asset registry. Values stay JSON so the caller
    /// can try schema versions newest to oldest.
    async fn registry_assets(
        &self,
    ) -> anyhow::Result<Option<Vec<(AssetId, serde_json::Value)>>>;
}
