use std::{fmt, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::chain::storage::ChainStorage;

/// On-chain asset identifier.
pub type AssetId = u32;

/// 32-byte account identifier, rendered as `0x…` hex at every boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn from_hex(s: &str) -> Option<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).ok()?;
        let raw: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    pub fn to_hex(self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AccountId::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid account id: {s}")))
    }
}

/// A decoded runtime event as delivered by the block source: pallet and
/// event name plus the JSON-decoded arguments (camelCase keys, big
/// integers as strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub pallet: String,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventRecord {
    pub fn is(&self, pallet: &str, name: &str) -> bool {
        self.pallet == pallet && self.name == name
    }
}

/// A decoded extrinsic call, same delivery shape as [`EventRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub pallet: String,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Whether the call executed successfully.
    #[serde(default = "default_true")]
    pub success: bool,
}

fn default_true() -> bool {
    true
}

impl CallRecord {
    pub fn is(&self, pallet: &str, name: &str) -> bool {
        self.pallet == pallet && self.name == name
    }
}

/// One block as delivered by the source, together with a storage handle
/// scoped to this block's state root.
#[derive(Clone)]
pub struct Block {
    pub height: u32,
    pub hash: String,
    pub parent_hash: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    pub spec_version: u32,
    pub events: Vec<EventRecord>,
    pub calls: Vec<CallRecord>,
    pub storage: Arc<dyn ChainStorage>,
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("height", &self.height)
            .field("hash", &self.hash)
            .field("spec_version", &self.spec_version)
            .field("events", &self.events.len())
            .field("calls", &self.calls.len())
            .finish()
    }
}

/// Highest block the source asserts is irreversible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedHead {
    pub height: u32,
    pub hash: String,
}

/// A batch of consecutive blocks plus the finalization watermark at the
/// time the batch was assembled.
#[derive(Debug, Clone)]
pub struct BlockBatch {
    pub blocks: Vec<Block>,
    pub finalized_head: FinalizedHead,
}
