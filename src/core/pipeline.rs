use crate::adapters::http::HttpFetcher;
use crate::core::assembler::ImageAssembler;
use crate::core::builder::AssetBuilder;
use crate::core::{AssetBundle, CommandRunner, ConfigProvider, Pipeline, RuntimeImage};
use crate::utils::error::Result;

/// Both stages wired to one command runner and one configuration.
pub struct ContainerPipeline<R: CommandRunner + Clone> {
    builder: AssetBuilder<R>,
    assembler: ImageAssembler<R>,
}

impl<R: CommandRunner + Clone> ContainerPipeline<R> {
    pub fn new<C: ConfigProvider>(runner: R, config: &C) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.request_timeout())?;
        Ok(Self {
            builder: AssetBuilder::new(runner.clone(), config.source_inputs(), config.build_options()),
            assembler: ImageAssembler::new(
                runner,
                fetcher,
                config.image_root(),
                config.provision_plan(),
            ),
        })
    }

    pub fn builder(&self) -> &AssetBuilder<R> {
        &self.builder
    }

    pub fn assembler(&self) -> &ImageAssembler<R> {
        &self.assembler
    }

    pub async fn preflight_build(&self) -> Result<()> {
        self.builder.preflight().await
    }

    pub fn preflight_assemble(&self) -> Result<()> {
        self.assembler.preflight()
    }
}

#[async_trait::async_trait]
impl<R: CommandRunner + Clone> Pipeline for ContainerPipeline<R> {
    async fn build(&self) -> Result<AssetBundle> {
        self.builder.build().await
    }

    async fn assemble(&self, bundle: AssetBundle) -> Result<RuntimeImage> {
        self.assembler.assemble(bundle).await
    }
}
