//! Idempotent installation of the static file server into the runtime base.
//!
//! The chain is trust key -> package source -> index refresh -> package.
//! Every step checks whether its effect is already present and skips itself
//! if so, which makes a rerun after a partial failure safe. A failing step
//! stops the chain; nothing is retried here.

use crate::adapters::http::HttpFetcher;
use crate::domain::model::{ProvisionPlan, ProvisionStep, StepOutcome, StepStatus};
use crate::domain::ports::{CommandRunner, CommandSpec};
use crate::utils::error::{PipelineError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const ARMOR_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
pub const ARMOR_FOOTER: &str = "-----END PGP PUBLIC KEY BLOCK-----";

/// Accept only an ASCII-armored public key block, optionally pinned by digest.
pub fn validate_key(key: &[u8], expected_sha256: Option<&str>) -> Result<()> {
    let text = std::str::from_utf8(key).map_err(|_| PipelineError::InvalidTrustKey {
        reason: "key is not ASCII armored".to_string(),
    })?;
    let text = text.trim();
    if !text.starts_with(ARMOR_HEADER) || !text.ends_with(ARMOR_FOOTER) {
        return Err(PipelineError::InvalidTrustKey {
            reason: "missing PGP public key block armor".to_string(),
        });
    }

    if let Some(expected) = expected_sha256 {
        let actual = format!("{:x}", Sha256::digest(key));
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(PipelineError::InvalidTrustKey {
                reason: format!("sha256 mismatch: expected {}, got {}", expected, actual),
            });
        }
    }

    Ok(())
}

pub struct Provisioner<R: CommandRunner> {
    runner: R,
    fetcher: HttpFetcher,
    image_root: PathBuf,
    plan: ProvisionPlan,
}

impl<R: CommandRunner> Provisioner<R> {
    pub fn new(runner: R, fetcher: HttpFetcher, image_root: PathBuf, plan: ProvisionPlan) -> Self {
        Self {
            runner,
            fetcher,
            image_root,
            plan,
        }
    }

    pub fn plan(&self) -> &ProvisionPlan {
        &self.plan
    }

    fn in_image(&self, relative: &Path) -> PathBuf {
        self.image_root.join(relative)
    }

    /// Package-manager commands run inside the runtime base; for a staged
    /// root that means through `chroot`.
    fn package_command<I, S>(&self, program: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = if self.image_root == Path::new("/") {
            CommandSpec::new(program)
        } else {
            CommandSpec::new("chroot")
                .arg(self.image_root.display().to_string())
                .arg(program)
        };
        spec.args(args).env("DEBIAN_FRONTEND", "noninteractive")
    }

    pub fn status_query(&self) -> CommandSpec {
        self.package_command(
            "dpkg-query",
            ["-W", "-f=${Status}", self.plan.package.as_str()],
        )
    }

    pub fn refresh_command(&self) -> CommandSpec {
        self.package_command("apt-get", ["update"])
    }

    pub fn install_command(&self) -> CommandSpec {
        self.package_command(
            "apt-get",
            ["install", "-y", "--no-install-recommends", self.plan.package.as_str()],
        )
    }

    pub async fn install_trust_key(&self) -> Result<StepStatus> {
        let keyring = self.in_image(&self.plan.keyring_path);
        if keyring.is_file() {
            let existing = fs::read(&keyring)?;
            if validate_key(&existing, self.plan.key_sha256.as_deref()).is_ok() {
                tracing::info!("⏭️  Trust key already installed at {}", keyring.display());
                return Ok(StepStatus::Skipped);
            }
            tracing::warn!("Replacing invalid trust key at {}", keyring.display());
        }

        let key = self.fetcher.fetch(&self.plan.key_url).await?;
        validate_key(&key, self.plan.key_sha256.as_deref())?;

        if let Some(parent) = keyring.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&keyring, &key)?;
        tracing::info!("🔑 Trust key installed at {}", keyring.display());
        Ok(StepStatus::Applied)
    }

    pub fn register_source(&self) -> Result<StepStatus> {
        let list = self.in_image(&self.plan.source_list_path);
        let entry = self.plan.source_entry();

        if list.is_file() && fs::read_to_string(&list)? == entry {
            tracing::info!("⏭️  Package source already registered at {}", list.display());
            return Ok(StepStatus::Skipped);
        }

        if let Some(parent) = list.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&list, &entry)?;
        tracing::info!("📝 Package source registered at {}", list.display());
        Ok(StepStatus::Applied)
    }

    pub async fn package_installed(&self) -> Result<bool> {
        let output = self.runner.run(&self.status_query()).await?;
        Ok(output.success() && output.stdout.contains("install ok installed"))
    }

    async fn run_step(&self, step: ProvisionStep, spec: &CommandSpec) -> Result<()> {
        let output = self.runner.run(spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(PipelineError::ProvisionFailed {
                step: step.name().to_string(),
                message: format!("'{}' exited with {:?}", spec, output.code),
            })
        }
    }

    pub async fn refresh_index(&self, installed: bool) -> Result<StepStatus> {
        if installed {
            tracing::info!("⏭️  {} installed, index refresh not needed", self.plan.package);
            return Ok(StepStatus::Skipped);
        }
        self.run_step(ProvisionStep::RefreshIndex, &self.refresh_command())
            .await?;
        Ok(StepStatus::Applied)
    }

    pub async fn install_package(&self, installed: bool) -> Result<StepStatus> {
        if !installed {
            self.run_step(ProvisionStep::InstallPackage, &self.install_command())
                .await?;
        }

        let binary = self.in_image(&self.plan.binary);
        if !binary.is_file() {
            return Err(PipelineError::ProvisionFailed {
                step: ProvisionStep::InstallPackage.name().to_string(),
                message: format!("server binary not found at {}", binary.display()),
            });
        }

        if installed {
            tracing::info!("⏭️  {} already installed", self.plan.package);
            Ok(StepStatus::Skipped)
        } else {
            tracing::info!("✅ {} installed", self.plan.package);
            Ok(StepStatus::Applied)
        }
    }

    /// Run the full chain in order.
    pub async fn provision(&self) -> Result<Vec<StepOutcome>> {
        let mut outcomes = Vec::with_capacity(ProvisionStep::ALL.len());

        let status = self.install_trust_key().await?;
        outcomes.push(StepOutcome {
            step: ProvisionStep::InstallTrustKey,
            status,
        });

        let status = self.register_source()?;
        outcomes.push(StepOutcome {
            step: ProvisionStep::RegisterSource,
            status,
        });

        let installed = self.package_installed().await?;

        let status = self.refresh_index(installed).await?;
        outcomes.push(StepOutcome {
            step: ProvisionStep::RefreshIndex,
            status,
        });

        let status = self.install_package(installed).await?;
        outcomes.push(StepOutcome {
            step: ProvisionStep::InstallPackage,
            status,
        });

        Ok(outcomes)
    }
}
