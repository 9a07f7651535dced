//! Carry-forward change detection.
//!
//! Prices can only move when a pool's reserves move. Reserve changes
//! surface as `Tokens.Transfer` events touching a pool sovereign
//! account, except for direct governance storage writes, which are
//! caught by matching `System.set_storage` keys against the twox128
//! prefixes of the pool-affecting pallets.

use std::hash::Hasher;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use twox_hash::XxHash64;

use crate::chain::account::{omnipool_account, stableswap_pool_account};
use crate::chain::block::{AccountId, AssetId, Block};
use crate::decode::lifecycle::{decode_transfer, set_storage_keys};

/// Substrate `twox128`: two xxhash64 passes with seeds 0 and 1.
pub fn twox128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    let mut h0 = XxHash64::with_seed(0);
    h0.write(data);
    out[..8].copy_from_slice(&h0.finish().to_le_bytes());
    let mut h1 = XxHash64::with_seed(1);
    h1.write(data);
    out[8..].copy_from_slice(&h1.finish().to_le_bytes());
    out
}

const POOL_PALLETS: [&str; 4] = ["Omnipool", "Tokens", "XYK", "Stableswap"];

/// Storage-key prefixes of every pallet whose state can move prices.
static POOL_PALLET_PREFIXES: Lazy<[[u8; 16]; 4]> =
    Lazy::new(|| POOL_PALLETS.map(|name| twox128(name.as_bytes())));

pub struct ChangeDetector {
    /// Stableswap sub-accounts are derived once per pool id.
    stableswap_accounts: FxHashMap<AssetId, AccountId>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self { stableswap_accounts: FxHashMap::default() }
    }

    /// Whether the block contains a `System.set_storage` write under a
    /// pool-affecting pallet. Callers must also invalidate the
    /// composition cache when this fires.
    pub fn pool_sudo_write(&self, block: &Block) -> bool {
        block.calls.iter().any(|call| {
            set_storage_keys(call).iter().any(|key| {
                key.len() >= 16
                    && POOL_PALLET_PREFIXES.iter().any(|prefix| &key[..16] == prefix)
            })
        })
    }

    /// Whether any `Tokens.Transfer` in the block moves funds in or out
    /// of a known pool sovereign account.
    pub fn pool_transfer(
        &mut self,
        block: &Block,
        xyk_accounts: &[AccountId],
        stableswap_ids: &[AssetId],
    ) -> bool {
        let omnipool = omnipool_account();
        block.events.iter().filter_map(decode_transfer).any(|transfer| {
            for endpoint in [transfer.from, transfer.to] {
                if endpoint == omnipool || xyk_accounts.contains(&endpoint) {
                    return true;
                }
                if stableswap_ids.iter().any(|id| {
                    *self
                        .stableswap_accounts
                        .entry(*id)
                        .or_insert_with(|| stableswap_pool_account(*id))
                        == endpoint
                }) {
                    return true;
                }
            }
            false
        })
    }

    /// The carry-forward decision: `true` means the block needs a full
    /// state read, `false` means block metadata alone suffices.
    pub fn requires_full_run(
        &mut self,
        block: &Block,
        composition_changed: bool,
        has_snapshot: bool,
        xyk_accounts: &[AccountId],
        stableswap_ids: &[AssetId],
    ) -> bool {
        if !has_snapshot || composition_changed {
            return true;
        }
        if self.pool_sudo_write(block) {
            return true;
        }
        self.pool_transfer(block, xyk_accounts, stableswap_ids)
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}
