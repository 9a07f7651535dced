//! Pool lifecycle, balance transfer, and sudo storage-write decoding.

use serde::Deserialize;
use serde_json::Value;

use crate::chain::block::{AccountId, AssetId, CallRecord, EventRecord};
use crate::chain::storage::StableswapPoolEntry;
use crate::decode::u128_str;

/// Composition-changing pool event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolLifecycle {
    OmnipoolTokenAdded { asset_id: AssetId },
    OmnipoolTokenRemoved { asset_id: AssetId },
    XykPoolCreated { pool: AccountId, asset_a: AssetId, asset_b: AssetId },
    XykPoolDestroyed { pool: AccountId },
    StableswapPoolCreated(StableswapPoolEntry),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OmnipoolTokenArgs {
    asset_id: AssetId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct XykPoolCreatedArgs {
    asset_a: AssetId,
    asset_b: AssetId,
    pool: AccountId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct XykPoolDestroyedArgs {
    pool: AccountId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StableswapPoolCreatedArgs {
    pool_id: AssetId,
    assets: Vec<AssetId>,
    amplification: u64,
    fee: u32,
}

/// Decode a composition-changing event. Non-lifecycle events (including
/// `LiquidityAdded` and friends) return `None`.
///
/// `block_height` stamps the amplification ramp of pools created by
/// event: a freshly created pool has a flat ramp at its initial value.
pub fn decode_lifecycle(event: &EventRecord, block_height: u32) -> Option<PoolLifecycle> {
    match (event.pallet.as_str(), event.name.as_str()) {
        ("Omnipool", "TokenAdded") => {
            let args: OmnipoolTokenArgs = serde_json::from_value(event.data.clone()).ok()?;
            Some(PoolLifecycle::OmnipoolTokenAdded { asset_id: args.asset_id })
        }
        ("Omnipool", "TokenRemoved") => {
            let args: OmnipoolTokenArgs = serde_json::from_value(event.data.clone()).ok()?;
            Some(PoolLifecycle::OmnipoolTokenRemoved { asset_id: args.asset_id })
        }
        ("XYK", "PoolCreated") => {
            let args: XykPoolCreatedArgs = serde_json::from_value(event.data.clone()).ok()?;
            Some(PoolLifecycle::XykPoolCreated {
                pool: args.pool,
                asset_a: args.asset_a,
                asset_b: args.asset_b,
            })
        }
        ("XYK", "PoolDestroyed") => {
            let args: XykPoolDestroyedArgs = serde_json::from_value(event.data.clone()).ok()?;
            Some(PoolLifecycle::XykPoolDestroyed { pool: args.pool })
        }
        ("Stableswap", "PoolCreated") => {
            let args: StableswapPoolCreatedArgs =
                serde_json::from_value(event.data.clone()).ok()?;
            Some(PoolLifecycle::StableswapPoolCreated(StableswapPoolEntry {
                pool_id: args.pool_id,
                assets: args.assets,
                initial_amplification: args.amplification,
                final_amplification: args.amplification,
                initial_block: block_height,
                final_block: block_height,
                fee: args.fee,
            }))
        }
        _ => None,
    }
}

/// A `Tokens.Transfer` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub currency_id: AssetId,
    pub from: AccountId,
    pub to: AccountId,
    #[serde(with = "u128_str")]
    pub amount: u128,
}

pub fn decode_transfer(event: &EventRecord) -> Option<TokenTransfer> {
    if !event.is("Tokens", "Transfer") {
        return None;
    }
    serde_json::from_value(event.data.clone()).ok()
}

#[derive(Deserialize)]
struct SetStorageArgs {
    items: Vec<(String, Value)>,
}

/// Raw storage keys written by a `System.set_storage` call; empty for
/// any other call or an undecodable one.
pub fn set_storage_keys(call: &CallRecord) -> Vec<Vec<u8>> {
    if !call.is("System", "set_storage") {
        return Vec::new();
    }
    let Ok(args) = serde_json::from_value::<SetStorageArgs>(call.data.clone()) else {
        return Vec::new();
    };
    args.items
        .into_iter()
        .filter_map(|(key, _)| hex::decode(key.strip_prefix("0x").unwrap_or(&key)).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_pool_lifecycle_events() {
        let added = EventRecord {
            pallet: "Omnipool".into(),
            name: "TokenAdded".into(),
            data: json!({"assetId": 16}),
        };
        assert_eq!(
            decode_lifecycle(&added, 50),
            Some(PoolLifecycle::OmnipoolTokenAdded { asset_id: 16 })
        );

        let created = EventRecord {
            pallet: "Stableswap".into(),
            name: "PoolCreated".into(),
            data: json!({"poolId": 100, "assets": [10, 21, 23], "amplification": 320, "fee": 200}),
        };
        match decode_lifecycle(&created, 77).unwrap() {
            PoolLifecycle::StableswapPoolCreated(entry) => {
                assert_eq!(entry.pool_id, 100);
                assert_eq!(entry.assets, vec![10, 21, 23]);
                assert_eq!(entry.initial_amplification, 320);
                assert_eq!(entry.final_amplification, 320);
                assert_eq!(entry.initial_block, 77);
            }
            other => panic!("unexpected decode: {other:?}"),
        }

        let liquidity = EventRecord {
            pallet: "Stableswap".into(),
            name: "LiquidityAdded".into(),
            data: json!({"poolId": 100}),
        };
        assert_eq!(decode_lifecycle(&liquidity, 77), None);
    }

    #[test]
    fn extracts_set_storage_keys() {
        let call = CallRecord {
            pallet: "System".into(),
            name: "set_storage".into(),
            data: json!({"items": [["0xdeadbeef", "0x00"], ["cafe", null]]}),
            success: true,
        };
        let keys = set_storage_keys(&call);
        assert_eq!(keys, vec![vec![0xde, 0xad, 0xbe, 0xef], vec![0xca, 0xfe]]);

        let other = CallRecord {
            pallet: "Balances".into(),
            name: "transfer".into(),
            data: json!({}),
            success: true,
        };
        assert!(set_storage_keys(&other).is_empty());
    }
}
