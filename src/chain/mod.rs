pub mod account;
pub mod block;
pub mod source;
pub mod storage;

pub use account::{omnipool_account, stableswap_pool_account};
pub use block::{AccountId, AssetId, Block, BlockBatch, CallRecord, EventRecord, FinalizedHead};
pub use source::{BlockSource, FixtureSource};
pub use storage::{
    ChainStorage, OmnipoolAssetEntry, StableswapPoolEntry, XykPoolEntry,
};
