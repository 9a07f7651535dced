//! Exact 12-decimal fixed-point arithmetic.
//!
//! Prices and USDT volumes are `u128` integers scaled by `10^12` and only
//! become strings at the row boundary. Intermediate products routinely
//! exceed 128 bits (`reserve * 10^decimals * 10^12`), so every formula
//! folds through `BigUint` and narrows once at the end.

use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// One whole unit at the 12-decimal price scale.
pub const PRICE_SCALE: u128 = 1_000_000_000_000;

const FRACTION_DIGITS: usize = 12;

/// `10^exp` as a big integer.
pub fn pow10(exp: u32) -> BigUint {
    BigUint::from(10u32).pow(exp)
}

/// Narrow a big integer back to `u128`. `None` means the value does not
/// fit, which the price path treats as a data absurdity and skips.
pub fn to_u128(value: &BigUint) -> Option<u128> {
    value.to_u128()
}

/// Render a scaled integer as a `Decimal(12)` string, e.g.
/// `1_500_000_000_000 -> "1.500000000000"`.
pub fn format_fixed12(value: u128) -> String {
    format!(
        "{}.{:0width$}",
        value / PRICE_SCALE,
        value % PRICE_SCALE,
        width = FRACTION_DIGITS
    )
}

/// Parse a decimal string back to the scaled integer, truncating extra
/// fractional digits. Accepts plain integers and the `"0"` sentinel.
pub fn parse_fixed12(raw: &str) -> Option<u128> {
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (raw, ""),
    };
    let int_part: u128 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };

    let mut frac_digits: String = frac_part.chars().take(FRACTION_DIGITS).collect();
    if !frac_digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    while frac_digits.len() < FRACTION_DIGITS {
        frac_digits.push('0');
    }
    let frac: u128 = if frac_digits.is_empty() { 0 } else { frac_digits.parse().ok()? };

    int_part
        .checked_mul(PRICE_SCALE)
        .and_then(|scaled| scaled.checked_add(frac))
}
