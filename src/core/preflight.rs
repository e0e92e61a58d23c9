//! Preflight checks: confirm the external tools each stage shells out to
//! are present before any work starts.

use crate::domain::ports::{CommandRunner, CommandSpec};
use crate::utils::error::{PipelineError, Result};
use std::path::Path;

/// Check if a command exists on the host `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Each tuple is (command_name, install_hint).
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, hint)| format!("{} (install: {})", tool, hint))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::PreflightFailed { missing })
    }
}

/// Tools the Asset Builder needs for the given bundler.
pub fn build_tools(bundler: &str) -> Vec<(&str, &'static str)> {
    vec![
        (bundler, "cargo install --locked trunk"),
        ("cargo", "https://rustup.rs"),
    ]
}

/// Verify that the WASM target is installed. Hosts without `rustup`
/// (distribution toolchains) are let through with a warning; the bundler
/// reports a missing target itself.
pub async fn check_wasm_target<R: CommandRunner>(runner: &R, target: &str) -> Result<()> {
    if !command_exists("rustup") {
        tracing::warn!("⚠️  rustup not found, cannot verify that {} is installed", target);
        return Ok(());
    }

    let output = runner
        .run(&CommandSpec::new("rustup").args(["target", "list", "--installed"]))
        .await?;
    if !output.success() {
        tracing::warn!("⚠️  rustup target list failed, skipping target check");
        return Ok(());
    }

    if output.stdout.lines().any(|line| line.trim() == target) {
        tracing::debug!("Target {} installed", target);
        Ok(())
    } else {
        Err(PipelineError::PreflightFailed {
            missing: vec![format!("{} (install: rustup target add {})", target, target)],
        })
    }
}

/// Tools the Serving Image Assembler needs in (or for) the runtime base.
pub fn check_assemble_tools(image_root: &Path) -> Result<()> {
    let mut missing = Vec::new();

    if image_root != Path::new("/") && !command_exists("chroot") {
        missing.push("chroot (install: coreutils)".to_string());
    }

    for tool in ["usr/bin/apt-get", "usr/bin/dpkg-query"] {
        if !image_root.join(tool).exists() {
            missing.push(format!(
                "/{} in {} (runtime base must be Debian based)",
                tool,
                image_root.display()
            ));
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::PreflightFailed { missing })
    }
}
