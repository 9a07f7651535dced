//! Curve-style invariant math.
//!
//! Newton's method solvers for the Stableswap invariant `D` and the
//! single-asset balance `Y`, plus the spot-price probe used by the price
//! resolver. All arithmetic is integer; convergence threshold is 1 in
//! the smallest unit.

use num_bigint::BigUint;
use num_traits::{CheckedSub, One, Zero};

use crate::math::fixed::{pow10, to_u128, PRICE_SCALE};

const MAX_D_ITERATIONS: usize = 64;
const MAX_Y_ITERATIONS: usize = 128;

/// Probe size for spot pricing: 0.01% of the input reserve.
const SPOT_PROBE_DIVISOR: u128 = 10_000;

fn converged(a: &BigUint, b: &BigUint) -> bool {
    let diff = if a > b { a - b } else { b - a };
    diff <= BigUint::one()
}

/// Solve the invariant `D` for the given reserves and amplification.
/// Returns zero when any reserve is zero (the pool is unpriceable).
pub fn calculate_d(reserves: &[u128], amplification: u128) -> BigUint {
    let n = reserves.len() as u128;
    if n < 2 || reserves.iter().any(|r| *r == 0) {
        return BigUint::zero();
    }

    let ann = BigUint::from(amplification) * BigUint::from(n).pow(n as u32);
    let sum: BigUint = reserves.iter().map(|r| BigUint::from(*r)).sum();
    let n_big = BigUint::from(n);

    let mut d = sum.clone();
    for _ in 0..MAX_D_ITERATIONS {
        // Rolling product D * prod(D / (reserve_i * n)) with integer division.
        let mut d_prod = d.clone();
        for reserve in reserves {
            d_prod = d_prod * &d / (BigUint::from(*reserve) * &n_big);
        }

        let numerator = (&ann * &sum + &d_prod * &n_big) * &d;
        let denominator = (&ann - BigUint::one()) * &d + (&n_big + BigUint::one()) * &d_prod;
        if denominator.is_zero() {
            return BigUint::zero();
        }
        let d_next = numerator / denominator;

        if converged(&d_next, &d) {
            return d_next;
        }
        d = d_next;
    }

    d
}

/// Solve for the reserve of `target` that preserves `d` given every other
/// reserve. `None` when the iteration degenerates.
pub fn calculate_y(
    reserves: &[u128],
    amplification: u128,
    target: usize,
    d: &BigUint,
) -> Option<BigUint> {
    let n = reserves.len() as u128;
    if n < 2 || target >= reserves.len() || d.is_zero() {
        return None;
    }

    let ann = BigUint::from(amplification) * BigUint::from(n).pow(n as u32);
    if ann.is_zero() {
        return None;
    }
    let n_big = BigUint::from(n);

    // c = D^(n+1) / (n^n * prod(other reserves) * Ann), folded iteratively.
    let mut c = d.clone();
    let mut sum_other = BigUint::zero();
    for (index, reserve) in reserves.iter().enumerate() {
        if index == target {
            continue;
        }
        if *reserve == 0 {
            return None;
        }
        c = c * d / (BigUint::from(*reserve) * &n_big);
        sum_other += BigUint::from(*reserve);
    }
    c = c * d / (&ann * &n_big);

    let b = sum_other + d / &ann;

    let mut y = d.clone();
    for _ in 0..MAX_Y_ITERATIONS {
        let denominator = (BigUint::from(2u32) * &y + &b).checked_sub(d)?;
        if denominator.is_zero() {
            return None;
        }
        let y_next = (&y * &y + &c) / denominator;
        if converged(&y_next, &y) {
            return Some(y_next);
        }
        y = y_next;
    }

    Some(y)
}

/// Marginal exchange rate of asset `idx_in` expressed in asset `idx_out`,
/// at the 12-decimal price scale, approximated by a 0.01% probe swap.
pub fn spot_price(
    reserves: &[u128],
    amplification: u128,
    idx_in: usize,
    idx_out: usize,
    decimals_in: u8,
    decimals_out: u8,
) -> Option<u128> {
    if idx_in == idx_out || idx_in >= reserves.len() || idx_out >= reserves.len() {
        return None;
    }

    let d = calculate_d(reserves, amplification);
    if d.is_zero() {
        return None;
    }

    let probe = reserves[idx_in] / SPOT_PROBE_DIVISOR;
    if probe == 0 {
        return None;
    }

    let mut shifted = reserves.to_vec();
    shifted[idx_in] = shifted[idx_in].checked_add(probe)?;

    let y = calculate_y(&shifted, amplification, idx_out, &d)?;
    let y = to_u128(&y)?;
    let received = reserves[idx_out].checked_sub(y)?;
    if received == 0 {
        return None;
    }

    let numerator =
        BigUint::from(received) * pow10(decimals_in as u32) * BigUint::from(PRICE_SCALE);
    let denominator = BigUint::from(probe) * pow10(decimals_out as u32);
    to_u128(&(numerator / denominator))
}
