//! Minimal-surface verification of an assembled runtime image.

use crate::core::bundle;
use crate::domain::model::AssetBundle;
use crate::utils::error::{PipelineError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Build-stage leftovers that must never appear in the runtime image,
/// relative to the image root.
pub const FORBIDDEN_PATHS: &[&str] = &[
    "Cargo.lock",
    "Cargo.toml",
    "Trunk.toml",
    "src",
    "target",
    "usr/local/cargo",
    "usr/local/rustup",
    "usr/local/bin/cargo",
    "usr/local/bin/rustc",
    "usr/local/bin/trunk",
    "usr/bin/cargo",
    "usr/bin/rustc",
    "root/.cargo",
    "root/.rustup",
];

pub fn toolchain_leftovers(image_root: &Path) -> Vec<String> {
    FORBIDDEN_PATHS
        .iter()
        .filter(|relative| image_root.join(relative).symlink_metadata().is_ok())
        .map(|relative| format!("/{}", relative))
        .collect()
}

/// Files in `serve_root` that differ from `bundle`: extra, missing, or with
/// different content.
pub fn serve_root_mismatches(serve_root: &Path, bundle: &AssetBundle) -> Result<Vec<String>> {
    let served = match bundle::scan(serve_root, bundle.entry_file()) {
        Ok(served) => served,
        Err(PipelineError::InvalidBundle { reason, .. }) => {
            return Ok(vec![format!("{} ({})", serve_root.display(), reason)]);
        }
        Err(e) => return Err(e),
    };

    if served.digest() == bundle.digest() {
        return Ok(Vec::new());
    }

    let expected: BTreeSet<&PathBuf> = bundle.files().iter().map(|f| &f.path).collect();
    let actual: BTreeSet<&PathBuf> = served.files().iter().map(|f| &f.path).collect();

    let mut mismatches: Vec<String> = actual
        .difference(&expected)
        .map(|p| format!("unexpected {}", serve_root.join(p).display()))
        .chain(
            expected
                .difference(&actual)
                .map(|p| format!("missing {}", serve_root.join(p).display())),
        )
        .collect();

    if mismatches.is_empty() {
        mismatches.push(format!("content of {} differs from bundle", serve_root.display()));
    }
    Ok(mismatches)
}

/// The image must contain the bundle verbatim and nothing from the build stage.
pub fn verify(image_root: &Path, serve_root: &Path, bundle: &AssetBundle) -> Result<()> {
    let mut offenders = toolchain_leftovers(image_root);
    offenders.extend(serve_root_mismatches(serve_root, bundle)?);

    if offenders.is_empty() {
        tracing::info!("🧹 Minimal surface verified for {}", image_root.display());
        Ok(())
    } else {
        Err(PipelineError::SurfaceViolation { offenders })
    }
}
