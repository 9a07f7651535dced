use clickhouse::Row;
use serde::{Deserialize, Serialize};

use crate::math::format_fixed12;

/// One `(asset, block)` output record: the USDT price snapshot and the
/// block's buy/sell volumes. The `(asset_id, block_height)` primary key
/// with block-height versioning makes reprocessing idempotent.
///
/// Prices and USDT volumes are 12-decimal strings; native volumes are
/// raw 128-bit amounts as strings. A volume-only row carries the `"0"`
/// price sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Row)]
pub struct PriceRow {
    pub asset_id: u32,
    pub block_height: u32,
    pub usdt_price: String,
    pub native_volume_buy: String,
    pub native_volume_sell: String,
    pub usdt_volume_buy: String,
    pub usdt_volume_sell: String,
}

impl PriceRow {
    pub fn price_only(asset_id: u32, block_height: u32, price: u128) -> Self {
        Self {
            asset_id,
            block_height,
            usdt_price: format_fixed12(price),
            native_volume_buy: "0".to_string(),
            native_volume_sell: "0".to_string(),
            usdt_volume_buy: format_fixed12(0),
            usdt_volume_sell: format_fixed12(0),
        }
    }
}
