//! Per-block pool state reads.
//!
//! Turns the cached pool composition into concrete reserves and
//! parameters for the price resolver, batching every `Tokens.Accounts`
//! lookup per pool type into a single round-trip. A failed read drops
//! the affected pools from this block's input and never poisons the
//! rest.

use log::warn;

use crate::cache::PoolCompositionCache;
use crate::chain::account::{omnipool_account, stableswap_pool_account};
use crate::chain::block::{AccountId, AssetId, Block};
use crate::chain::storage::StableswapPoolEntry;

#[derive(Debug, Clone)]
pub struct OmnipoolAssetState {
    pub asset_id: AssetId,
    pub hub_reserve: u128,
    pub reserve: u128,
}

#[derive(Debug, Clone)]
pub struct XykPoolState {
    pub account: AccountId,
    pub asset_a: AssetId,
    pub asset_b: AssetId,
    pub reserve_a: u128,
    pub reserve_b: u128,
}

#[derive(Debug, Clone)]
pub struct StableswapPoolState {
    pub pool_id: AssetId,
    pub assets: Vec<AssetId>,
    pub reserves: Vec<u128>,
    pub amplification: u128,
}

#[derive(Debug, Clone, Default)]
pub struct PoolStates {
    pub omnipool: Vec<OmnipoolAssetState>,
    pub xyk: Vec<XykPoolState>,
    pub stableswap: Vec<StableswapPoolState>,
}

/// Current amplification on the pool's linear ramp, clamped at both
/// endpoints.
pub fn amplification_at(entry: &StableswapPoolEntry, height: u32) -> u128 {
    if entry.final_block <= entry.initial_block || height >= entry.final_block {
        return entry.final_amplification as u128;
    }
    if height <= entry.initial_block {
        return entry.initial_amplification as u128;
    }

    let span = (entry.final_block - entry.initial_block) as i128;
    let elapsed = (height - entry.initial_block) as i128;
    let initial = entry.initial_amplification as i128;
    let delta = entry.final_amplification as i128 - initial;
    (initial + delta * elapsed / span) as u128
}

pub async fn read_pool_states(block: &Block, cache: &mut PoolCompositionCache) -> PoolStates {
    let mut states = PoolStates::default();
    let storage = block.storage.as_ref();

    // Omnipool: asset entries and the sovereign account's true free
    // balances are fetched concurrently; the balance batch can fall back
    // to shares as an approximate reserve.
    if let Some(assets) = cache.omnipool_assets(storage).await {
        let assets: Vec<AssetId> = assets.to_vec();
        let balance_keys: Vec<(AccountId, AssetId)> =
            assets.iter().map(|id| (omnipool_account(), *id)).collect();

        let (entries, balances) = tokio::join!(
            storage.omnipool_asset_states(&assets),
            storage.free_balances(&balance_keys),
        );

        match entries {
            Ok(entries) => {
                let balances = match balances {
                    Ok(balances) => Some(balances),
                    Err(e) => {
                        warn!("omnipool reserve batch failed, using shares: {e:#}");
                        None
                    }
                };
                for (index, (asset_id, entry)) in assets.iter().zip(entries).enumerate() {
                    let Some(entry) = entry else {
                        warn!("omnipool asset {asset_id} missing at block {}", block.height);
                        continue;
                    };
                    let reserve = balances
                        .as_ref()
                        .and_then(|b| b.get(index).copied().flatten())
                        .unwrap_or(entry.shares);
                    states.omnipool.push(OmnipoolAssetState {
                        asset_id: *asset_id,
                        hub_reserve: entry.hub_reserve,
                        reserve,
                    });
                }
            }
            Err(e) => warn!("omnipool state batch failed at block {}: {e:#}", block.height),
        }
    }

    // XYK: two balance keys per pool, one batched read overall.
    if let Some(pools) = cache.xyk_pools(storage).await {
        let pools = pools.to_vec();
        let keys: Vec<(AccountId, AssetId)> = pools
            .iter()
            .flat_map(|pool| [(pool.account, pool.asset_a), (pool.account, pool.asset_b)])
            .collect();

        match storage.free_balances(&keys).await {
            Ok(balances) => {
                for (pool, reserves) in pools.iter().zip(balances.chunks(2)) {
                    states.xyk.push(XykPoolState {
                        account: pool.account,
                        asset_a: pool.asset_a,
                        asset_b: pool.asset_b,
                        reserve_a: reserves.first().copied().flatten().unwrap_or(0),
                        reserve_b: reserves.get(1).copied().flatten().unwrap_or(0),
                    });
                }
            }
            Err(e) => warn!("xyk reserve batch failed at block {}: {e:#}", block.height),
        }
    }

    // Stableswap: reserves live on the derived sub-account; amplification
    // interpolates along the pool's ramp at this height.
    if let Some(pools) = cache.stableswap_pools(storage).await {
        let pools = pools.to_vec();
        let keys: Vec<(AccountId, AssetId)> = pools
            .iter()
            .flat_map(|pool| {
                let account = stableswap_pool_account(pool.pool_id);
                pool.assets.iter().map(move |asset| (account, *asset))
            })
            .collect();

        match storage.free_balances(&keys).await {
            Ok(balances) => {
                let mut cursor = 0usize;
                for pool in &pools {
                    let Some(slice) = balances.get(cursor..cursor + pool.assets.len()) else {
                        warn!("short stableswap balance batch at block {}", block.height);
                        break;
                    };
                    let reserves: Vec<u128> =
                        slice.iter().map(|balance| balance.unwrap_or(0)).collect();
                    cursor += pool.assets.len();
                    states.stableswap.push(StableswapPoolState {
                        pool_id: pool.pool_id,
                        assets: pool.assets.clone(),
                        reserves,
                        amplification: amplification_at(pool, block.height),
                    });
                }
            }
            Err(e) => {
                warn!("stableswap reserve batch failed at block {}: {e:#}", block.height)
            }
        }
    }

    states
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(initial: u64, final_amp: u64, from: u32, to: u32) -> StableswapPoolEntry {
        StableswapPoolEntry {
            pool_id: 100,
            assets: vec![10, 21],
            initial_amplification: initial,
            final_amplification: final_amp,
            initial_block: from,
            final_block: to,
            fee: 0,
        }
    }

    #[test]
    fn amplification_interpolates_and_clamps() {
        let entry = ramp(100, 500, 1_000, 1_400);
        assert_eq!(amplification_at(&entry, 500), 100);
        assert_eq!(amplification_at(&entry, 1_000), 100);
        assert_eq!(amplification_at(&entry, 1_200), 300);
        assert_eq!(amplification_at(&entry, 1_400), 500);
        assert_eq!(amplification_at(&entry, 9_999), 500);
    }

    #[test]
    fn amplification_ramps_down_too() {
        let entry = ramp(500, 100, 0, 100);
        assert_eq!(amplification_at(&entry, 50), 300);
        assert_eq!(amplification_at(&entry, 100), 100);
    }

    #[test]
    fn flat_ramp_is_constant() {
        let entry = ramp(320, 320, 77, 77);
        assert_eq!(amplification_at(&entry, 0), 320);
        assert_eq!(amplification_at(&entry, 1_000_000), 320);
    }
}
