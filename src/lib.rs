pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TomlConfig;

pub use adapters::{HttpFetcher, SystemRunner};
pub use core::{engine::PipelineEngine, pipeline::ContainerPipeline};
pub use utils::error::{PipelineError, Result};
