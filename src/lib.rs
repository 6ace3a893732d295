pub mod actuator;
pub mod bot;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod telegram;

pub use error::{Error, Result};
pub use models::{CandidateSet, FusionOutcome, ResiNumber, ScanReport};
pub use pipeline::{DebugConfig, Pipeline, PipelineContext};
