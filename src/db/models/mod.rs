mod asset_row;
mod block_row;
mod checkpoint;
mod price_row;
mod runtime_upgrade;

pub use asset_row::AssetRow;
pub use block_row::BlockRow;
pub use checkpoint::{Checkpoint, MAIN_CHECKPOINT, REPLAY_CHECKPOINT};
pub use price_row::PriceRow;
pub use runtime_upgrade::RuntimeUpgradeRow;
