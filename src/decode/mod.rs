pub mod lifecycle;
pub mod swap;

use anyhow::Context;

/// Parse a JSON-delivered big integer (decimal string, optionally `0x`
/// hex, or a plain number).
pub fn parse_u128(raw: &str) -> anyhow::Result<u128> {
    if let Some(hex_digits) = raw.strip_prefix("0x") {
        return u128::from_str_radix(hex_digits, 16)
            .with_context(|| format!("invalid hex amount {raw}"));
    }
    raw.parse().with_context(|| format!("invalid amount {raw}"))
}

/// Serde adapter for `u128` fields delivered as JSON strings (the source
/// serializes chain bigints as strings) or plain numbers.
pub mod u128_str {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => super::parse_u128(&s).map_err(de::Error::custom),
            Raw::Number(n) => Ok(n as u128),
        }
    }
}
