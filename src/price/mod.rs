//! USDT price resolution.
//!
//! Anchors USDT at 1, prices LRNA from the Omnipool's USDT state (or the
//! most liquid stablecoin-backed LP token when USDT left the Omnipool),
//! prices every Omnipool asset against LRNA, then propagates through XYK
//! and Stableswap pools until a fixpoint or the round cap.
//!
//! Omnipool prices are never overwritten by propagation: the Omnipool is
//! the preferred route. Each round stages its writes and pools are
//! walked in sorted order, so the outcome does not depend on pool
//! ordering in the input.

use std::collections::BTreeMap;

use log::{debug, warn};
use num_bigint::BigUint;
use rustc_hash::FxHashMap;

use crate::chain::block::AssetId;
use crate::math::stableswap::spot_price;
use crate::math::{pow10, to_u128, PRICE_SCALE};
use crate::state::{OmnipoolAssetState, PoolStates, StableswapPoolState, XykPoolState};

const MAX_PROPAGATION_ROUNDS: usize = 10;

/// Per-block price snapshot: asset id to 12-decimal scaled USDT price.
pub type PriceMap = FxHashMap<AssetId, u128>;

pub struct PriceResolver<'a> {
    usdt_asset_id: AssetId,
    decimals: &'a FxHashMap<AssetId, u8>,
}

impl<'a> PriceResolver<'a> {
    pub fn new(usdt_asset_id: AssetId, decimals: &'a FxHashMap<AssetId, u8>) -> Self {
        Self { usdt_asset_id, decimals }
    }

    fn decimals_of(&self, asset_id: AssetId) -> Option<u8> {
        self.decimals.get(&asset_id).copied()
    }

    /// LRNA price from a dollar-denominated Omnipool state: the asset's
    /// token reserve per hub reserve, with LRNA's fixed 12 decimals.
    fn lrna_from_state(&self, state: &OmnipoolAssetState, decimals: u8) -> Option<u128> {
        if state.hub_reserve == 0 || state.reserve == 0 {
            return None;
        }
        let numerator = BigUint::from(state.reserve)
            * pow10(12)
            * BigUint::from(PRICE_SCALE);
        let denominator = BigUint::from(state.hub_reserve) * pow10(decimals as u32);
        to_u128(&(numerator / denominator))
    }

    /// Price of LRNA in USDT. Prefers USDT's own Omnipool state; falls
    /// back to the stablecoin-backed LP token with the highest hub
    /// reserve (its share token is treated as worth one USDT).
    fn lrna_price(&self, states: &PoolStates) -> Option<u128> {
        if let Some(usdt_state) =
            states.omnipool.iter().find(|state| state.asset_id == self.usdt_asset_id)
        {
            let decimals = self.decimals_of(self.usdt_asset_id)?;
            if let Some(price) = self.lrna_from_state(usdt_state, decimals) {
                return Some(price);
            }
        }

        // Walk candidates in pool-id order so ties on hub reserve break
        // deterministically towards the lower id.
        let mut candidates: Vec<&StableswapPoolState> = states
            .stableswap
            .iter()
            .filter(|pool| pool.assets.contains(&self.usdt_asset_id))
            .collect();
        candidates.sort_by_key(|pool| pool.pool_id);

        let mut best: Option<&OmnipoolAssetState> = None;
        for pool in candidates {
            let Some(lp_state) =
                states.omnipool.iter().find(|state| state.asset_id == pool.pool_id)
            else {
                continue;
            };
            if lp_state.hub_reserve == 0 || lp_state.reserve == 0 {
                continue;
            }
            if best.map_or(true, |current| lp_state.hub_reserve > current.hub_reserve) {
                best = Some(lp_state);
            }
        }

        let lp_state = best?;
        let decimals = self.decimals_of(lp_state.asset_id)?;
        debug!(
            "usdt not in omnipool, anchoring lrna via lp token {}",
            lp_state.asset_id
        );
        self.lrna_from_state(lp_state, decimals)
    }

    /// Price every Omnipool asset against the hub.
    fn omnipool_pass(&self, states: &PoolStates, lrna_price: u128, prices: &mut PriceMap) {
        for state in &states.omnipool {
            if state.hub_reserve == 0 || state.reserve == 0 {
                continue;
            }
            if prices.contains_key(&state.asset_id) {
                continue;
            }
            let Some(decimals) = self.decimals_of(state.asset_id) else {
                debug!("no decimals for omnipool asset {}, skipping", state.asset_id);
                continue;
            };

            let numerator = BigUint::from(state.hub_reserve)
                * pow10(decimals as u32)
                * BigUint::from(lrna_price);
            let denominator = BigUint::from(state.reserve) * pow10(12);
            match to_u128(&(numerator / denominator)) {
                Some(price) => {
                    prices.insert(state.asset_id, price);
                }
                None => warn!("omnipool price for asset {} overflows", state.asset_id),
            }
        }
    }

    /// Derive the unpriced side of an XYK pool from the priced one via
    /// the constant-product ratio.
    fn xyk_pass(
        &self,
        pools: &[&XykPoolState],
        prices: &PriceMap,
        staged: &mut BTreeMap<AssetId, u128>,
    ) {
        for pool in pools {
            if pool.reserve_a == 0 || pool.reserve_b == 0 {
                continue;
            }
            let priced_a = prices.contains_key(&pool.asset_a);
            let priced_b = prices.contains_key(&pool.asset_b);
            let (known, unknown, reserve_known, reserve_unknown) = match (priced_a, priced_b) {
                (true, false) => (pool.asset_a, pool.asset_b, pool.reserve_a, pool.reserve_b),
                (false, true) => (pool.asset_b, pool.asset_a, pool.reserve_b, pool.reserve_a),
                _ => continue,
            };
            if staged.contains_key(&unknown) {
                continue;
            }
            let (Some(dec_known), Some(dec_unknown)) =
                (self.decimals_of(known), self.decimals_of(unknown))
            else {
                continue;
            };

            let numerator = BigUint::from(reserve_known)
                * pow10(dec_unknown as u32)
                * BigUint::from(prices[&known]);
            let denominator = BigUint::from(reserve_unknown) * pow10(dec_known as u32);
            match to_u128(&(numerator / denominator)) {
                Some(price) => {
                    staged.insert(unknown, price);
                }
                None => warn!("xyk price for asset {unknown} overflows"),
            }
        }
    }

    /// Price unpriced Stableswap members against the pool's first priced
    /// asset using the curve spot price.
    fn stableswap_pass(
        &self,
        pools: &[&StableswapPoolState],
        prices: &PriceMap,
        staged: &mut BTreeMap<AssetId, u128>,
    ) {
        for pool in pools {
            if pool.assets.len() < 2 || pool.assets.len() != pool.reserves.len() {
                continue;
            }
            let Some(ref_idx) =
                pool.assets.iter().position(|asset| prices.contains_key(asset))
            else {
                continue;
            };
            let ref_asset = pool.assets[ref_idx];
            let ref_price = prices[&ref_asset];
            let Some(ref_decimals) = self.decimals_of(ref_asset) else {
                continue;
            };

            for (idx, asset) in pool.assets.iter().enumerate() {
                if prices.contains_key(asset) || staged.contains_key(asset) {
                    continue;
                }
                let Some(asset_decimals) = self.decimals_of(*asset) else {
                    continue;
                };
                let Some(spot) = spot_price(
                    &pool.reserves,
                    pool.amplification,
                    idx,
                    ref_idx,
                    asset_decimals,
                    ref_decimals,
                ) else {
                    continue;
                };

                let scaled =
                    BigUint::from(spot) * BigUint::from(ref_price) / BigUint::from(PRICE_SCALE);
                match to_u128(&scaled) {
                    Some(price) => {
                        staged.insert(*asset, price);
                    }
                    None => warn!("stableswap price for asset {asset} overflows"),
                }
            }
        }
    }

    /// Produce the block's price map.
    pub fn resolve(&self, states: &PoolStates) -> PriceMap {
        let mut prices = PriceMap::default();
        prices.insert(self.usdt_asset_id, PRICE_SCALE);

        match self.lrna_price(states) {
            Some(lrna_price) => self.omnipool_pass(states, lrna_price, &mut prices),
            None => debug!("no lrna anchor this block, omnipool assets stay unpriced"),
        }

        let mut xyk: Vec<&XykPoolState> = states.xyk.iter().collect();
        xyk.sort_by_key(|pool| pool.account);
        let mut stableswap: Vec<&StableswapPoolState> = states.stableswap.iter().collect();
        stableswap.sort_by_key(|pool| pool.pool_id);

        for _ in 0..MAX_PROPAGATION_ROUNDS {
            let mut staged = BTreeMap::new();
            self.xyk_pass(&xyk, &prices, &mut staged);
            self.stableswap_pass(&stableswap, &prices, &mut staged);
            if staged.is_empty() {
                break;
            }
            for (asset, price) in staged {
                prices.entry(asset).or_insert(price);
            }
        }

        prices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::format_fixed12;

    const USDT: AssetId = 10;
    const HDX: AssetId = 0;
    const DOT: AssetId = 5;
    const WBTC: AssetId = 3;
    const VDOT: AssetId = 15;

    fn decimals() -> FxHashMap<AssetId, u8> {
        let mut map = FxHashMap::default();
        map.insert(USDT, 6);
        map.insert(HDX, 12);
        map.insert(DOT, 10);
        map.insert(WBTC, 8);
        map.insert(VDOT, 10);
        map
    }

    fn omnipool(asset_id: AssetId, hub_reserve: u128, reserve: u128) -> OmnipoolAssetState {
        OmnipoolAssetState { asset_id, hub_reserve, reserve }
    }

    #[test]
    fn usdt_is_always_anchored_at_one() {
        let decimals = decimals();
        let resolver = PriceResolver::new(USDT, &decimals);
        let prices = resolver.resolve(&PoolStates::default());
        assert_eq!(format_fixed12(prices[&USDT]), "1.000000000000");
        assert_eq!(prices.len(), 1);
    }

    #[test]
    fn lrna_price_of_a_balanced_usdt_pool_is_one() {
        let decimals = decimals();
        let resolver = PriceResolver::new(USDT, &decimals);
        let states = PoolStates {
            omnipool: vec![omnipool(USDT, 1_000_000_000_000, 1_000_000)],
            ..Default::default()
        };
        let lrna = resolver.lrna_price(&states).unwrap();
        assert_eq!(format_fixed12(lrna), "1.000000000000");
    }

    #[test]
    fn omnipool_hdx_price_truncates_exactly() {
        let decimals = decimals();
        let resolver = PriceResolver::new(USDT, &decimals);
        let states = PoolStates {
            omnipool: vec![
                omnipool(USDT, 1_000_000_000_000, 1_000_000),
                omnipool(HDX, 50 * 10u128.pow(12), 100_000 * 10u128.pow(12)),
            ],
            ..Default::default()
        };
        let prices = resolver.resolve(&states);
        assert_eq!(format_fixed12(prices[&HDX]), "0.000500000000");
    }

    #[test]
    fn xyk_propagates_across_decimals() {
        let decimals = decimals();
        let resolver = PriceResolver::new(USDT, &decimals);
        // DOT anchored at 50 through the omnipool, WBTC only via XYK.
        let states = PoolStates {
            omnipool: vec![
                omnipool(USDT, 1_000_000_000_000, 1_000_000),
                omnipool(DOT, 50 * 10u128.pow(12), 10u128.pow(10)),
            ],
            xyk: vec![XykPoolState {
                account: crate::chain::account::stableswap_pool_account(1),
                asset_a: DOT,
                asset_b: WBTC,
                reserve_a: 100 * 10u128.pow(10),
                reserve_b: 10u128.pow(8),
            }],
            ..Default::default()
        };
        let prices = resolver.resolve(&states);
        assert_eq!(format_fixed12(prices[&DOT]), "50.000000000000");
        assert_eq!(format_fixed12(prices[&WBTC]), "5000.000000000000");
    }

    #[test]
    fn stableswap_prices_the_scarcer_sibling_above_reference() {
        let mut decimals = decimals();
        decimals.insert(DOT, 10);
        let resolver = PriceResolver::new(USDT, &decimals);
        let states = PoolStates {
            omnipool: vec![
                omnipool(USDT, 1_000_000_000_000, 1_000_000),
                omnipool(DOT, 5 * 10u128.pow(12), 10u128.pow(10)),
            ],
            stableswap: vec![StableswapPoolState {
                pool_id: 100,
                assets: vec![DOT, VDOT],
                reserves: vec![100 * 10u128.pow(10), 90 * 10u128.pow(10)],
                amplification: 10,
            }],
            ..Default::default()
        };
        let prices = resolver.resolve(&states);
        assert_eq!(format_fixed12(prices[&DOT]), "5.000000000000");
        let vdot = prices[&VDOT];
        assert!(vdot > 5 * PRICE_SCALE, "vDOT at {} should beat DOT", format_fixed12(vdot));
        assert_ne!(vdot, 5 * PRICE_SCALE);
    }

    #[test]
    fn omnipool_prices_are_not_overwritten_by_propagation() {
        let decimals = decimals();
        let resolver = PriceResolver::new(USDT, &decimals);
        // A skewed XYK pool would reprice DOT at 100 if it were allowed.
        let states = PoolStates {
            omnipool: vec![
                omnipool(USDT, 1_000_000_000_000, 1_000_000),
                omnipool(DOT, 50 * 10u128.pow(12), 10u128.pow(10)),
            ],
            xyk: vec![XykPoolState {
                account: crate::chain::account::stableswap_pool_account(2),
                asset_a: USDT,
                asset_b: DOT,
                reserve_a: 100 * 10u128.pow(6),
                reserve_b: 10u128.pow(10),
            }],
            ..Default::default()
        };
        let prices = resolver.resolve(&states);
        assert_eq!(format_fixed12(prices[&DOT]), "50.000000000000");
    }

    #[test]
    fn propagation_is_pool_order_independent() {
        let decimals = decimals();
        let resolver = PriceResolver::new(USDT, &decimals);
        let pool = |account, a, b, ra, rb| XykPoolState {
            account: crate::chain::account::stableswap_pool_account(account),
            asset_a: a,
            asset_b: b,
            reserve_a: ra,
            reserve_b: rb,
        };
        let mut states = PoolStates {
            omnipool: vec![
                omnipool(USDT, 1_000_000_000_000, 1_000_000),
                omnipool(DOT, 50 * 10u128.pow(12), 10u128.pow(10)),
            ],
            xyk: vec![
                pool(1, DOT, WBTC, 100 * 10u128.pow(10), 10u128.pow(8)),
                pool(2, WBTC, VDOT, 10u128.pow(8), 1_000 * 10u128.pow(10)),
            ],
            ..Default::default()
        };
        let forward = resolver.resolve(&states);
        states.xyk.reverse();
        let reversed = resolver.resolve(&states);
        assert_eq!(forward, reversed);
        assert!(forward.contains_key(&VDOT));
    }

    #[test]
    fn lrna_falls_back_to_the_most_liquid_stable_lp() {
        let decimals = {
            let mut map = decimals();
            map.insert(100, 12);
            map.insert(101, 12);
            map
        };
        let resolver = PriceResolver::new(USDT, &decimals);
        // USDT is not in the omnipool; two stable pools wrap it and both
        // LP tokens are omnipool assets. Pool 101 has the deeper hub.
        let states = PoolStates {
            omnipool: vec![
                omnipool(100, 10u128.pow(12), 2 * 10u128.pow(12)),
                omnipool(101, 5 * 10u128.pow(12), 5 * 10u128.pow(12)),
            ],
            stableswap: vec![
                StableswapPoolState {
                    pool_id: 100,
                    assets: vec![USDT, 21],
                    reserves: vec![10u128.pow(6), 10u128.pow(6)],
                    amplification: 100,
                },
                StableswapPoolState {
                    pool_id: 101,
                    assets: vec![USDT, 23],
                    reserves: vec![10u128.pow(6), 10u128.pow(6)],
                    amplification: 100,
                },
            ],
            ..Default::default()
        };
        // Pool 101: reserve == hub with 12 decimals -> lrna = 1.
        let lrna = resolver.lrna_price(&states).unwrap();
        assert_eq!(format_fixed12(lrna), "1.000000000000");
    }

    #[test]
    fn propagation_stops_after_ten_rounds() {
        // A 12-hop chain of XYK pools off USDT: each round reaches one
        // hop further, so assets 11 hops out stay unpriced.
        let mut decimals = FxHashMap::default();
        decimals.insert(USDT, 6u8);
        for asset in 1_000..1_013u32 {
            decimals.insert(asset, 12u8);
        }
        let resolver = PriceResolver::new(USDT, &decimals);

        let mut xyk = Vec::new();
        let mut prev = USDT;
        for (hop, asset) in (1_000..1_012u32).enumerate() {
            xyk.push(XykPoolState {
                account: crate::chain::account::stableswap_pool_account(hop as u32),
                asset_a: prev,
                asset_b: asset,
                reserve_a: if prev == USDT { 10u128.pow(6) } else { 10u128.pow(12) },
                reserve_b: 10u128.pow(12),
            });
            prev = asset;
        }
        let states = PoolStates { xyk, ..Default::default() };
        let prices = resolver.resolve(&states);

        // Hops 1..=10 are reachable, hops 11 and 12 are not.
        assert!(prices.contains_key(&1_009));
        assert!(!prices.contains_key(&1_010));
        assert!(!prices.contains_key(&1_011));
    }

    #[test]
    fn division_by_zero_skips_the_pool_not_the_block() {
        let decimals = decimals();
        let resolver = PriceResolver::new(USDT, &decimals);
        let states = PoolStates {
            omnipool: vec![
                omnipool(USDT, 1_000_000_000_000, 1_000_000),
                omnipool(HDX, 10u128.pow(12), 0),
            ],
            xyk: vec![XykPoolState {
                account: crate::chain::account::stableswap_pool_account(9),
                asset_a: USDT,
                asset_b: DOT,
                reserve_a: 10u128.pow(6),
                reserve_b: 0,
            }],
            ..Default::default()
        };
        let prices = resolver.resolve(&states);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[&USDT], PRICE_SCALE);
    }
}
