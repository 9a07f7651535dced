//! Pool composition cache.
//!
//! Tracks which assets sit in the Omnipool and which XYK and Stableswap
//! pools exist at the current head. Each store bootstraps from a full
//! storage scan on first use and is then maintained incrementally from
//! lifecycle events; a runtime upgrade or pool-affecting sudo write
//! resets everything to uninitialized.

use log::{info, warn};

use crate::chain::block::{AccountId, AssetId, EventRecord};
use crate::chain::storage::{ChainStorage, StableswapPoolEntry, XykPoolEntry};
use crate::decode::lifecycle::{decode_lifecycle, PoolLifecycle};

#[derive(Default)]
pub struct PoolCompositionCache {
    omnipool: Option<Vec<AssetId>>,
    xyk: Option<Vec<XykPoolEntry>>,
    stableswap: Option<Vec<StableswapPoolEntry>>,
}

impl PoolCompositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asset ids currently in the Omnipool. `None` when the pallet is not
    /// present at this block (or its scan failed).
    pub async fn omnipool_assets(
        &mut self,
        storage: &dyn ChainStorage,
    ) -> Option<&[AssetId]> {
        if self.omnipool.is_none() {
            match storage.omnipool_assets().await {
                Ok(Some(entries)) => {
                    info!("bootstrapped omnipool composition: {} assets", entries.len());
                    self.omnipool = Some(entries.into_iter().map(|(id, _)| id).collect());
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!("omnipool composition scan failed: {e:#}");
                    return None;
                }
            }
        }
        self.omnipool.as_deref()
    }

    /// Every known XYK pool with its sovereign account and asset pair.
    pub async fn xyk_pools(&mut self, storage: &dyn ChainStorage) -> Option<&[XykPoolEntry]> {
        if self.xyk.is_none() {
            match storage.xyk_pools().await {
                Ok(Some(entries)) => {
                    info!("bootstrapped xyk composition: {} pools", entries.len());
                    self.xyk = Some(entries);
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!("xyk composition scan failed: {e:#}");
                    return None;
                }
            }
        }
        self.xyk.as_deref()
    }

    /// Every known Stableswap pool with its static parameters.
    pub async fn stableswap_pools(
        &mut self,
        storage: &dyn ChainStorage,
    ) -> Option<&[StableswapPoolEntry]> {
        if self.stableswap.is_none() {
            match storage.stableswap_pools().await {
                Ok(Some(entries)) => {
                    info!("bootstrapped stableswap composition: {} pools", entries.len());
                    self.stableswap = Some(entries);
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!("stableswap composition scan failed: {e:#}");
                    return None;
                }
            }
        }
        self.stableswap.as_deref()
    }

    /// Apply the block's lifecycle events to whichever stores are already
    /// bootstrapped. Returns whether pool composition changed, which by
    /// itself forces full processing of the block.
    pub fn process_events(&mut self, events: &[EventRecord], block_height: u32) -> bool {
        let mut changed = false;
        for event in events {
            let Some(lifecycle) = decode_lifecycle(event, block_height) else {
                continue;
            };
            changed = true;
            match lifecycle {
                PoolLifecycle::OmnipoolTokenAdded { asset_id } => {
                    if let Some(assets) = self.omnipool.as_mut() {
                        if !assets.contains(&asset_id) {
                            assets.push(asset_id);
                        }
                    }
                }
                PoolLifecycle::OmnipoolTokenRemoved { asset_id } => {
                    if let Some(assets) = self.omnipool.as_mut() {
                        assets.retain(|id| *id != asset_id);
                    }
                }
                PoolLifecycle::XykPoolCreated { pool, asset_a, asset_b } => {
                    if let Some(pools) = self.xyk.as_mut() {
                        pools.retain(|entry| entry.account != pool);
                        pools.push(XykPoolEntry { account: pool, asset_a, asset_b });
                    }
                }
                PoolLifecycle::XykPoolDestroyed { pool } => {
                    if let Some(pools) = self.xyk.as_mut() {
                        pools.retain(|entry| entry.account != pool);
                    }
                }
                PoolLifecycle::StableswapPoolCreated(entry) => {
                    if let Some(pools) = self.stableswap.as_mut() {
                        pools.retain(|existing| existing.pool_id != entry.pool_id);
                        pools.push(entry);
                    }
                }
            }
        }
        changed
    }

    /// Drop every store back to uninitialized; the next lookup re-scans.
    pub fn invalidate_all(&mut self) {
        self.omnipool = None;
        self.xyk = None;
        self.stableswap = None;
    }

    /// XYK pool accounts currently cached, without triggering a bootstrap.
    /// Used by the change detector, which only needs the composition known
    /// from the last full run.
    pub fn cached_xyk_accounts(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.xyk.iter().flatten().map(|entry| entry.account)
    }

    /// Stableswap pool ids currently cached, without triggering a bootstrap.
    pub fn cached_stableswap_ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.stableswap.iter().flatten().map(|entry| entry.pool_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::storage::OmnipoolAssetEntry;
    use async_trait::async_trait;
    use serde_json::json;

    struct ScanCounting {
        omnipool: Vec<(AssetId, OmnipoolAssetEntry)>,
        scans: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ChainStorage for ScanCounting {
        async fn omnipool_assets(
            &self,
        ) -> anyhow::Result<Option<Vec<(AssetId, OmnipoolAssetEntry)>>> {
            self.scans.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Some(self.omnipool.clone()))
        }

        async fn omnipool_asset_states(
            &self,
            assets: &[AssetId],
        ) -> anyhow::Result<Vec<Option<OmnipoolAssetEntry>>> {
            Ok(vec![None; assets.len()])
        }

        async fn xyk_pools(&self) -> anyhow::Result<Option<Vec<XykPoolEntry>>> {
            Ok(None)
        }

        async fn stableswap_pools(
            &self,
        ) -> anyhow::Result<Option<Vec<StableswapPoolEntry>>> {
            Ok(Some(Vec::new()))
        }

        async fn free_balances(
            &self,
            keys: &[(AccountId, AssetId)],
        ) -> anyhow::Result<Vec<Option<u128>>> {
            Ok(vec![None; keys.len()])
        }

        async fn registry_assets(
            &self,
        ) -> anyhow::Result<Option<Vec<(AssetId, serde_json::Value)>>> {
            Ok(None)
        }
    }

    fn entry() -> OmnipoolAssetEntry {
        OmnipoolAssetEntry {
            hub_reserve: 1,
            shares: 1,
            protocol_shares: 0,
            cap: 0,
            tradable: 0,
        }
    }

    #[tokio::test]
    async fn bootstraps_once_then_updates_incrementally() {
        let storage = ScanCounting {
            omnipool: vec![(0, entry()), (10, entry())],
            scans: Default::default(),
        };
        let mut cache = PoolCompositionCache::new();

        assert_eq!(cache.omnipool_assets(&storage).await.unwrap(), &[0, 10]);
        assert_eq!(cache.omnipool_assets(&storage).await.unwrap(), &[0, 10]);
        assert_eq!(storage.scans.load(std::sync::atomic::Ordering::SeqCst), 1);

        let added = EventRecord {
            pallet: "Omnipool".into(),
            name: "TokenAdded".into(),
            data: json!({"assetId": 16}),
        };
        assert!(cache.process_events(&[added], 5));
        assert_eq!(cache.omnipool_assets(&storage).await.unwrap(), &[0, 10, 16]);

        let removed = EventRecord {
            pallet: "Omnipool".into(),
            name: "TokenRemoved".into(),
            data: json!({"assetId": 0}),
        };
        assert!(cache.process_events(&[removed], 6));
        assert_eq!(cache.omnipool_assets(&storage).await.unwrap(), &[10, 16]);
    }

    #[tokio::test]
    async fn invalidation_forces_a_rescan_and_absent_pallet_is_none() {
        let storage = ScanCounting { omnipool: vec![(0, entry())], scans: Default::default() };
        let mut cache = PoolCompositionCache::new();

        cache.omnipool_assets(&storage).await.unwrap();
        cache.invalidate_all();
        cache.omnipool_assets(&storage).await.unwrap();
        assert_eq!(storage.scans.load(std::sync::atomic::Ordering::SeqCst), 2);

        // XYK pallet not present: lookup yields None and stays cold.
        assert!(cache.xyk_pools(&storage).await.is_none());
        assert!(cache.xyk_pools(&storage).await.is_none());
    }

    #[tokio::test]
    async fn non_lifecycle_events_do_not_change_composition() {
        let storage = ScanCounting { omnipool: vec![], scans: Default::default() };
        let mut cache = PoolCompositionCache::new();
        cache.stableswap_pools(&storage).await.unwrap();

        let liquidity = EventRecord {
            pallet: "Stableswap".into(),
            name: "LiquidityAdded".into(),
            data: json!({"poolId": 100}),
        };
        assert!(!cache.process_events(&[liquidity], 9));
    }
}
