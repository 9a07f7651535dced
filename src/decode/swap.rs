//! Swap event decoding across runtime versions.
//!
//! Six event names (three pallets x sell/buy), each with one argument
//! struct per runtime schema version. Decoders are tried newest to
//! oldest; `deny_unknown_fields` makes the order meaningful. XYK events
//! do not carry explicit in/out amounts, so their fields are remapped:
//! `SellExecuted` supplies `(amount, salePrice)` and `BuyExecuted`
//! supplies `(buyPrice, amount)`.

use serde::Deserialize;
use serde_json::Value;

use crate::chain::block::{AssetId, EventRecord};
use crate::decode::u128_str;

/// A normalized swap: `amount_in` of `asset_in` sold for `amount_out`
/// of `asset_out`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swap {
    pub asset_in: AssetId,
    pub asset_out: AssetId,
    pub amount_in: u128,
    pub amount_out: u128,
}

// Omnipool, spec >= 201: hub and fee breakdown included.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct OmnipoolSwapV201 {
    #[allow(dead_code)]
    who: Value,
    asset_in: AssetId,
    asset_out: AssetId,
    #[serde(with = "u128_str")]
    amount_in: u128,
    #[serde(with = "u128_str")]
    amount_out: u128,
    #[serde(with = "u128_str")]
    #[allow(dead_code)]
    hub_amount_in: u128,
    #[serde(with = "u128_str")]
    #[allow(dead_code)]
    hub_amount_out: u128,
    #[serde(with = "u128_str")]
    #[allow(dead_code)]
    asset_fee_amount: u128,
    #[serde(with = "u128_str")]
    #[allow(dead_code)]
    protocol_fee_amount: u128,
}

// Omnipool, spec >= 170: fee amounts, no hub breakdown.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct OmnipoolSwapV170 {
    #[allow(dead_code)]
    who: Value,
    asset_in: AssetId,
    asset_out: AssetId,
    #[serde(with = "u128_str")]
    amount_in: u128,
    #[serde(with = "u128_str")]
    amount_out: u128,
    #[serde(with = "u128_str")]
    #[allow(dead_code)]
    asset_fee_amount: u128,
    #[serde(with = "u128_str")]
    #[allow(dead_code)]
    protocol_fee_amount: u128,
}

// Omnipool, spec >= 115: the launch shape.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct OmnipoolSwapV115 {
    #[allow(dead_code)]
    who: Value,
    asset_in: AssetId,
    asset_out: AssetId,
    #[serde(with = "u128_str")]
    amount_in: u128,
    #[serde(with = "u128_str")]
    amount_out: u128,
}

// XYK, spec >= 183.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct XykSellExecutedV183 {
    #[allow(dead_code)]
    who: Value,
    asset_in: AssetId,
    asset_out: AssetId,
    #[serde(with = "u128_str")]
    amount: u128,
    #[serde(with = "u128_str")]
    sale_price: u128,
    #[allow(dead_code)]
    fee_asset: Option<AssetId>,
    #[serde(default, with = "u128_str")]
    #[allow(dead_code)]
    fee_amount: u128,
    #[allow(dead_code)]
    pool: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct XykBuyExecutedV183 {
    #[allow(dead_code)]
    who: Value,
    asset_in: AssetId,
    asset_out: AssetId,
    #[serde(with = "u128_str")]
    amount: u128,
    #[serde(with = "u128_str")]
    buy_price: u128,
    #[allow(dead_code)]
    fee_asset: Option<AssetId>,
    #[serde(default, with = "u128_str")]
    #[allow(dead_code)]
    fee_amount: u128,
    #[allow(dead_code)]
    pool: Option<Value>,
}

// Stableswap, spec >= 183.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StableswapSwapV183 {
    #[allow(dead_code)]
    who: Value,
    #[allow(dead_code)]
    pool_id: AssetId,
    asset_in: AssetId,
    asset_out: AssetId,
    #[serde(with = "u128_str")]
    amount_in: u128,
    #[serde(with = "u128_str")]
    amount_out: u128,
    #[serde(default, with = "u128_str")]
    #[allow(dead_code)]
    fee: u128,
}

fn decode_omnipool(data: &Value) -> Option<Swap> {
    if let Ok(args) = serde_json::from_value::<OmnipoolSwapV201>(data.clone()) {
        return Some(Swap {
            asset_in: args.asset_in,
            asset_out: args.asset_out,
            amount_in: args.amount_in,
            amount_out: args.amount_out,
        });
    }
    if let Ok(args) = serde_json::from_value::<OmnipoolSwapV170>(data.clone()) {
        return Some(Swap {
            asset_in: args.asset_in,
            asset_out: args.asset_out,
            amount_in: args.amount_in,
            amount_out: args.amount_out,
        });
    }
    let args = serde_json::from_value::<OmnipoolSwapV115>(data.clone()).ok()?;
    Some(Swap {
        asset_in: args.asset_in,
        asset_out: args.asset_out,
        amount_in: args.amount_in,
        amount_out: args.amount_out,
    })
}

fn decode_xyk_sell(data: &Value) -> Option<Swap> {
    let args = serde_json::from_value::<XykSellExecutedV183>(data.clone()).ok()?;
    Some(Swap {
        asset_in: args.asset_in,
        asset_out: args.asset_out,
        amount_in: args.amount,
        amount_out: args.sale_price,
    })
}

fn decode_xyk_buy(data: &Value) -> Option<Swap> {
    let args = serde_json::from_value::<XykBuyExecutedV183>(data.clone()).ok()?;
    Some(Swap {
        asset_in: args.asset_in,
        asset_out: args.asset_out,
        amount_in: args.buy_price,
        amount_out: args.amount,
    })
}

fn decode_stableswap(data: &Value) -> Option<Swap> {
    let args = serde_json::from_value::<StableswapSwapV183>(data.clone()).ok()?;
    Some(Swap {
        asset_in: args.asset_in,
        asset_out: args.asset_out,
        amount_in: args.amount_in,
        amount_out: args.amount_out,
    })
}

/// Decode a swap event, or `None` when the event is not a swap or no
/// schema version matches (the caller logs and drops it).
pub fn decode_swap(event: &EventRecord) -> Option<Swap> {
    match (event.pallet.as_str(), event.name.as_str()) {
        ("Omnipool", "SellExecuted") | ("Omnipool", "BuyExecuted") => {
            decode_omnipool(&event.data)
        }
        ("XYK", "SellExecuted") => decode_xyk_sell(&event.data),
        ("XYK", "BuyExecuted") => decode_xyk_buy(&event.data),
        ("Stableswap", "SellExecuted") | ("Stableswap", "BuyExecuted") => {
            decode_stableswap(&event.data)
        }
        _ => None,
    }
}
