//! Serving Image Assembler: provisions the file server into the runtime
//! base and re-roots the asset bundle at the fixed serve path.

use crate::adapters::http::HttpFetcher;
use crate::core::provision::Provisioner;
use crate::core::{bundle, preflight, surface};
use crate::domain::model::{AssetBundle, ProvisionPlan, RuntimeImage, ServingConfiguration};
use crate::domain::ports::CommandRunner;
use crate::utils::error::{PipelineError, Result};
use std::path::{Path, PathBuf};

pub struct ImageAssembler<R: CommandRunner> {
    provisioner: Provisioner<R>,
    image_root: PathBuf,
    serving: ServingConfiguration,
}

impl<R: CommandRunner> ImageAssembler<R> {
    pub fn new(runner: R, fetcher: HttpFetcher, image_root: PathBuf, plan: ProvisionPlan) -> Self {
        Self {
            provisioner: Provisioner::new(runner, fetcher, image_root.clone(), plan),
            image_root,
            serving: ServingConfiguration::fixed(),
        }
    }

    pub fn image_root(&self) -> &Path {
        &self.image_root
    }

    pub fn serve_root(&self) -> PathBuf {
        self.serving.root_within(&self.image_root)
    }

    pub fn provisioner(&self) -> &Provisioner<R> {
        &self.provisioner
    }

    pub fn preflight(&self) -> Result<()> {
        preflight::check_assemble_tools(&self.image_root)
    }

    fn check_disjoint(&self, bundle: &AssetBundle, serve_root: &Path) -> Result<()> {
        if bundle.root().starts_with(serve_root) || serve_root.starts_with(bundle.root()) {
            return Err(PipelineError::ConfigError {
                message: format!(
                    "bundle {} overlaps the serve root {}",
                    bundle.root().display(),
                    serve_root.display()
                ),
            });
        }
        Ok(())
    }

    /// Clear, copy, verify and rescan the serve root.
    fn populate_serve_root(&self, bundle: &AssetBundle, serve_root: &Path) -> Result<AssetBundle> {
        let removed = bundle::clear_dir(serve_root)?;
        if removed > 0 {
            tracing::warn!(
                "Removed {} stale entries from {}",
                removed,
                serve_root.display()
            );
        }
        bundle::copy_bundle(bundle, serve_root)?;
        tracing::info!(
            "📁 Copied {} files into {}",
            bundle.file_count(),
            serve_root.display()
        );

        surface::verify(&self.image_root, serve_root, bundle)?;
        bundle::scan(serve_root, bundle.entry_file())
    }

    pub async fn assemble(&self, bundle: AssetBundle) -> Result<RuntimeImage> {
        let serve_root = self.serve_root();
        self.check_disjoint(&bundle, &serve_root)?;

        // 基底若含建置工具鏈，任何佈建都不會產生合格的映像
        let offenders = surface::toolchain_leftovers(&self.image_root);
        if !offenders.is_empty() {
            return Err(PipelineError::SurfaceViolation { offenders });
        }

        let provisioning = self.provisioner.provision().await?;

        let served = match self.populate_serve_root(&bundle, &serve_root) {
            Ok(served) => served,
            Err(e) => {
                if let Err(cleanup) = bundle::clear_dir(&serve_root) {
                    tracing::warn!(
                        "Failed to clear {} after error: {}",
                        serve_root.display(),
                        cleanup
                    );
                }
                return Err(e);
            }
        };

        Ok(RuntimeImage {
            root: self.image_root.clone(),
            serve_root,
            bundle: served,
            serving: self.serving.clone(),
            server_binary: self.provisioner.plan().binary_in_image(),
            provisioning,
        })
    }
}
