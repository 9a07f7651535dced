pub mod fixed;
pub mod stableswap;

pub use fixed::{format_fixed12, parse_fixed12, pow10, to_u128, PRICE_SCALE};
