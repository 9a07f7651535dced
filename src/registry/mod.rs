//! Asset registry tracker.
//!
//! Keeps an in-memory view of asset metadata (symbol, name, decimals)
//! and rescans the on-chain registry every K blocks, with a wider
//! interval while backfilling. Changed or newly discovered assets are
//! surfaced as [`AssetRow`]s; the `decimals()` view feeds the price
//! resolver and volume conversion.

use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::chain::block::{AssetId, Block};
use crate::config::IndexerSettings;
use crate::db::models::AssetRow;

const DEFAULT_DECIMALS: u8 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
struct AssetInfo {
    symbol: String,
    name: String,
    decimals: u8,
}

// Registry details with metadata merged in (spec >= 176).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RegistryEntryV3 {
    name: Option<String>,
    asset_type: Option<Value>,
    existential_deposit: Option<Value>,
    symbol: Option<String>,
    decimals: Option<u8>,
    xcm_rate_limit: Option<Value>,
    is_sufficient: Option<bool>,
}

// Launch-era details: no symbol or decimals on the entry.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RegistryEntryV2 {
    name: Option<String>,
    asset_type: Option<Value>,
    existential_deposit: Option<Value>,
    locked: Option<bool>,
}

/// Decode a raw symbol or name: UTF-8 text, possibly delivered as `0x`
/// hex bytes; empty or undecodable input falls back to the caller's
/// default.
fn decode_text(raw: Option<String>, fallback: &str) -> String {
    let Some(raw) = raw else {
        return fallback.to_string();
    };
    let text = match raw.strip_prefix("0x") {
        Some(hex_digits) => hex::decode(hex_digits)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default(),
        None => raw,
    };
    let text = text.trim_matches(char::from(0)).trim().to_string();
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

fn decode_entry(asset_id: AssetId, value: &Value) -> AssetInfo {
    let fallback = format!("Asset{asset_id}");

    if let Ok(entry) = serde_json::from_value::<RegistryEntryV3>(value.clone()) {
        return AssetInfo {
            symbol: decode_text(entry.symbol, &fallback),
            name: decode_text(entry.name, &fallback),
            decimals: entry.decimals.unwrap_or(DEFAULT_DECIMALS),
        };
    }
    if let Ok(entry) = serde_json::from_value::<RegistryEntryV2>(value.clone()) {
        return AssetInfo {
            symbol: decode_text(None, &fallback),
            name: decode_text(entry.name, &fallback),
            decimals: DEFAULT_DECIMALS,
        };
    }

    warn!("unrecognized registry entry for asset {asset_id}");
    AssetInfo { symbol: fallback.clone(), name: fallback, decimals: DEFAULT_DECIMALS }
}

pub struct AssetRegistryTracker {
    cache: FxHashMap<AssetId, AssetInfo>,
    decimals: FxHashMap<AssetId, u8>,
    last_scan: Option<u32>,
    backfill_interval: u32,
    live_interval: u32,
}

impl AssetRegistryTracker {
    pub fn new(settings: &IndexerSettings) -> Self {
        Self {
            cache: FxHashMap::default(),
            decimals: FxHashMap::default(),
            last_scan: None,
            backfill_interval: settings.registry_backfill_interval.max(1),
            live_interval: settings.registry_live_interval.max(1),
        }
    }

    /// Decimals for an asset, if the registry has been scanned and knows
    /// it.
    pub fn decimals(&self, asset_id: AssetId) -> Option<u8> {
        self.decimals.get(&asset_id).copied()
    }

    /// The full decimals view consumed by pricing and volume conversion.
    pub fn decimals_view(&self) -> &FxHashMap<AssetId, u8> {
        &self.decimals
    }

    fn due(&self, height: u32, live: bool) -> bool {
        let interval = if live { self.live_interval } else { self.backfill_interval };
        match self.last_scan {
            None => true,
            Some(last) => height.saturating_sub(last) >= interval,
        }
    }

    /// Rescan the registry if the snapshot interval elapsed. Returns rows
    /// for assets discovered or changed since the previous scan.
    pub async fn maybe_scan(&mut self, block: &Block, live: bool) -> Vec<AssetRow> {
        if !self.due(block.height, live) {
            return Vec::new();
        }

        let entries = match block.storage.registry_assets().await {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                debug!("asset registry not present at block {}", block.height);
                return Vec::new();
            }
            Err(e) => {
                warn!("asset registry scan failed at block {}: {e:#}", block.height);
                return Vec::new();
            }
        };
        self.last_scan = Some(block.height);

        let mut rows = Vec::new();
        for (asset_id, value) in entries {
            let info = decode_entry(asset_id, &value);
            let changed = self.cache.get(&asset_id) != Some(&info);
            if changed {
                rows.push(AssetRow {
                    asset_id,
                    symbol: info.symbol.clone(),
                    name: info.name.clone(),
                    decimals: info.decimals,
                });
            }
            self.decimals.insert(asset_id, info.decimals);
            self.cache.insert(asset_id, info);
        }
        rows.sort_by_key(|row| row.asset_id);
        rows
    }
}
