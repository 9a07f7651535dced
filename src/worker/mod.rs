mod worker;

pub use worker::{Pipeline, PipelineMode};
