//! Sovereign pool account derivation.
//!
//! Hydration pool accounts are module accounts built from fixed `modl`
//! pallet prefixes with no hashing, so they can be derived locally and
//! compared against `Tokens.Transfer` endpoints.

use once_cell::sync::Lazy;

use crate::chain::block::{AccountId, AssetId};

/// `modl` + pallet id `omnipool`, zero-padded to 32 bytes.
static OMNIPOOL_ACCOUNT: Lazy<AccountId> = Lazy::new(|| {
    let mut raw = [0u8; 32];
    raw[..4].copy_from_slice(b"modl");
    raw[4..12].copy_from_slice(b"omnipool");
    AccountId(raw)
});

/// The Omnipool sovereign account holding every Omnipool token reserve.
pub fn omnipool_account() -> AccountId {
    *OMNIPOOL_ACCOUNT
}

/// Per-pool Stableswap sub-account: the 12-byte `modl` + `stblpool`
/// prefix, the pool id as little-endian u32, then zero padding.
pub fn stableswap_pool_account(pool_id: AssetId) -> AccountId {
    let mut raw = [0u8; 32];
    raw[..4].copy_from_slice(b"modl");
    raw[4..12].copy_from_slice(b"stblpool");
    raw[12..16].copy_from_slice(&pool_id.to_le_bytes());
    AccountId(raw)
}
