//! Swap volume extraction and the per-block row merge.
//!
//! Every decoded swap contributes twice: a sell record for the asset
//! leaving the trader and a buy record for the asset they receive.
//! Native amounts stay in the token's smallest unit; USDT legs are
//! converted with the block's freshly resolved prices. An absent or
//! zero price zeroes the USDT leg but keeps the native volume.

use log::{debug, warn};
use num_bigint::BigUint;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::chain::block::{AssetId, EventRecord};
use crate::db::models::PriceRow;
use crate::decode::swap::decode_swap;
use crate::math::{format_fixed12, pow10, to_u128};
use crate::price::PriceMap;

/// Per-asset volume aggregate for one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetVolume {
    pub native_buy: u128,
    pub native_sell: u128,
    pub usdt_buy: u128,
    pub usdt_sell: u128,
}

/// USDT value of a native `amount` at `price` (12-decimal scaled):
/// `amount * price / 10^decimals`, still 12-decimal scaled.
pub fn usdt_volume(amount: u128, price: u128, decimals: u8) -> u128 {
    if price == 0 || amount == 0 {
        return 0;
    }
    let value = BigUint::from(amount) * BigUint::from(price) / pow10(decimals as u32);
    to_u128(&value).unwrap_or_else(|| {
        warn!("usdt volume overflows for amount {amount}, dropping");
        0
    })
}

/// Decode every swap in the block and aggregate the bidirectional
/// contributions per asset.
pub fn extract_volumes(
    events: &[EventRecord],
    prices: &PriceMap,
    decimals: &FxHashMap<AssetId, u8>,
) -> FxHashMap<AssetId, AssetVolume> {
    let mut volumes: FxHashMap<AssetId, AssetVolume> = FxHashMap::default();

    let swap_events = events.iter().filter(|event| {
        matches!(event.name.as_str(), "SellExecuted" | "BuyExecuted")
            && matches!(event.pallet.as_str(), "Omnipool" | "XYK" | "Stableswap")
    });

    for event in swap_events {
        let Some(swap) = decode_swap(event) else {
            debug!("undecodable swap {}::{}, dropping", event.pallet, event.name);
            continue;
        };

        let price_in = prices.get(&swap.asset_in).copied().unwrap_or(0);
        let decimals_in = decimals.get(&swap.asset_in).copied().unwrap_or(12);
        let sell = volumes.entry(swap.asset_in).or_default();
        sell.native_sell = sell.native_sell.saturating_add(swap.amount_in);
        sell.usdt_sell =
            sell.usdt_sell.saturating_add(usdt_volume(swap.amount_in, price_in, decimals_in));

        let price_out = prices.get(&swap.asset_out).copied().unwrap_or(0);
        let decimals_out = decimals.get(&swap.asset_out).copied().unwrap_or(12);
        let buy = volumes.entry(swap.asset_out).or_default();
        buy.native_buy = buy.native_buy.saturating_add(swap.amount_out);
        buy.usdt_buy =
            buy.usdt_buy.saturating_add(usdt_volume(swap.amount_out, price_out, decimals_out));
    }

    volumes
}

/// Merge the block's price snapshot with its volume aggregates into the
/// final row set: at most one row per asset, sorted by asset id, with
/// the `"0"` price sentinel on volume-only rows.
pub fn merge_rows(
    block_height: u32,
    prices: &PriceMap,
    volumes: &FxHashMap<AssetId, AssetVolume>,
) -> Vec<PriceRow> {
    let assets: BTreeSet<AssetId> =
        prices.keys().chain(volumes.keys()).copied().collect();

    assets
        .into_iter()
        .map(|asset_id| {
            let volume = volumes.get(&asset_id).copied().unwrap_or_default();
            let usdt_price = match prices.get(&asset_id) {
                Some(price) => format_fixed12(*price),
                None => "0".to_string(),
            };
            PriceRow {
                asset_id,
                block_height,
                usdt_price,
                native_volume_buy: volume.native_buy.to_string(),
                native_volume_sell: volume.native_sell.to_string(),
                usdt_volume_buy: format_fixed12(volume.usdt_buy),
                usdt_volume_sell: format_fixed12(volume.usdt_sell),
            }
        })
        .collect()
}
