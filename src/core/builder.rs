//! Asset Builder: turns the build context into an [`AssetBundle`] by running
//! the external bundler in locked mode.

use crate::core::{bundle, lockfile, preflight};
use crate::domain::model::{AssetBundle, BuildOptions, SourceInputs};
use crate::domain::ports::{CommandRunner, CommandSpec};
use crate::utils::error::{PipelineError, Result};
use crate::utils::validation;
use std::path::{Path, PathBuf};

pub struct AssetBuilder<R: CommandRunner> {
    runner: R,
    inputs: SourceInputs,
    options: BuildOptions,
}

impl<R: CommandRunner> AssetBuilder<R> {
    pub fn new(runner: R, inputs: SourceInputs, options: BuildOptions) -> Self {
        Self {
            runner,
            inputs,
            options,
        }
    }

    pub fn inputs(&self) -> &SourceInputs {
        &self.inputs
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Output directory of the bundler.
    pub fn dist_path(&self) -> PathBuf {
        if self.options.dist_dir.is_absolute() {
            self.options.dist_dir.clone()
        } else {
            self.inputs.context_root.join(&self.options.dist_dir)
        }
    }

    /// [`Self::dist_path`] resolved against the working directory. The
    /// output is wiped before every build, so it must not be the context,
    /// one of its ancestors, or overlap the sources and input files.
    pub fn checked_dist_path(&self) -> Result<PathBuf> {
        let resolve = |path: &Path| -> Result<PathBuf> {
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()?.join(path)
            };
            Ok(validation::normalize_path(&absolute))
        };

        let dist = resolve(&self.dist_path())?;
        let context = resolve(&self.inputs.context_root)?;
        let source = resolve(&self.inputs.source_dir_path())?;
        let files = [
            resolve(&self.inputs.lock_file_path())?,
            resolve(&self.inputs.manifest_path())?,
            resolve(&self.inputs.entry_file_path())?,
        ];

        let overlaps = context.starts_with(&dist)
            || dist.starts_with(&source)
            || source.starts_with(&dist)
            || files.iter().any(|file| file.starts_with(&dist));
        if overlaps {
            return Err(PipelineError::InvalidConfigValueError {
                field: "build.dist_dir".to_string(),
                value: self.options.dist_dir.display().to_string(),
                reason: format!(
                    "{} overlaps the build context {}",
                    dist.display(),
                    context.display()
                ),
            });
        }
        Ok(dist)
    }

    /// The bundler invocation. `--locked` is unconditional.
    pub fn command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.options.bundler).arg("build");
        if self.options.release {
            spec = spec.arg("--release");
        }
        spec.arg("--locked")
            .arg("--dist")
            .arg(self.dist_path().display().to_string())
            .current_dir(&self.inputs.context_root)
    }

    pub async fn preflight(&self) -> Result<()> {
        preflight::check_required_tools(&preflight::build_tools(&self.options.bundler))?;
        preflight::check_wasm_target(&self.runner, &self.options.wasm_target).await
    }

    /// Checks that need no external tool: inputs present, sources non-empty,
    /// lock file pins every declared dependency.
    pub fn validate_inputs(&self) -> Result<lockfile::LockCheck> {
        let required = [
            ("lock file", self.inputs.lock_file_path(), false),
            ("project descriptor", self.inputs.manifest_path(), false),
            ("entry markup file", self.inputs.entry_file_path(), false),
            ("source directory", self.inputs.source_dir_path(), true),
        ];
        for (kind, path, is_dir) in required {
            let present = if is_dir { path.is_dir() } else { path.is_file() };
            if !present {
                return Err(PipelineError::MissingInput { kind, path });
            }
        }

        let source_dir = self.inputs.source_dir_path();
        if !bundle::has_files(&source_dir)? {
            return Err(PipelineError::EmptySource { path: source_dir });
        }

        lockfile::verify_locked(&self.inputs.manifest_path(), &self.inputs.lock_file_path())
    }

    pub async fn build(&self) -> Result<AssetBundle> {
        let lock = self.validate_inputs()?;
        tracing::info!(
            "🔒 Lock file pins all {} declared dependencies ({} packages)",
            lock.declared,
            lock.locked_packages
        );

        let dist = self.checked_dist_path()?;
        if dist.exists() {
            tracing::debug!("Removing stale output {}", dist.display());
            std::fs::remove_dir_all(&dist)?;
        }

        let output = self.runner.run(&self.command()).await?;
        if !output.success() {
            discard_output(&dist);
            return Err(PipelineError::BuildToolFailed {
                tool: self.options.bundler.clone(),
                code: output.code,
            });
        }

        match bundle::scan(&dist, &self.inputs.entry_file_name()) {
            Ok(bundle) => {
                tracing::info!(
                    "📦 Bundle ready: {} files, {} bytes at {}",
                    bundle.file_count(),
                    bundle.total_bytes(),
                    bundle.root().display()
                );
                Ok(bundle)
            }
            Err(e) => {
                discard_output(&dist);
                Err(e)
            }
        }
    }
}

/// Partial output must never reach the Assembler.
fn discard_output(dist: &Path) {
    if dist.exists() {
        if let Err(e) = std::fs::remove_dir_all(dist) {
            tracing::warn!("Failed to remove partial output {}: {}", dist.display(), e);
        }
    }
}
