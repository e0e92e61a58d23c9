pub mod assembler;
pub mod builder;
pub mod bundle;
pub mod engine;
pub mod lockfile;
pub mod pipeline;
pub mod preflight;
pub mod probe;
pub mod provision;
pub mod serve;
pub mod surface;

pub use crate::domain::model::{AssetBundle, PipelineReport, RuntimeImage, ServingConfiguration};
pub use crate::domain::ports::{CommandRunner, CommandSpec, ConfigProvider, Pipeline};
pub use crate::utils::error::Result;
