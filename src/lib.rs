pub mod cache;
pub mod chain;
pub mod config;
pub mod db;
pub mod decode;
pub mod detect;
pub mod math;
pub mod price;
pub mod registry;
pub mod state;
pub mod volume;
pub mod worker;
pub mod writer;

pub use config::Settings;
pub use db::{ClickhouseClient, Store};
pub use worker::{Pipeline, PipelineMode};
