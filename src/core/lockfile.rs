//! Locked-mode pre-validation: every dependency the project descriptor
//! declares must be pinned by the lock file before the bundler is started.

use crate::utils::error::{PipelineError, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use toml::{Table, Value};

const DEPENDENCY_TABLES: [&str; 3] = ["dependencies", "build-dependencies", "dev-dependencies"];

#[derive(Debug, Deserialize)]
struct LockFile {
    #[serde(default)]
    package: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: String,
}

/// Summary of a successful lock check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockCheck {
    pub declared: usize,
    pub locked_packages: usize,
}

fn collect_table(table: &Table, names: &mut BTreeSet<String>) {
    for (key, spec) in table {
        // `foo = { package = "bar" }` renames the crate
        let name = spec
            .get("package")
            .and_then(Value::as_str)
            .unwrap_or(key);
        names.insert(name.to_string());
    }
}

/// Crate names declared by a `Cargo.toml`, including target-specific tables.
pub fn declared_dependencies(manifest: &Table) -> BTreeSet<String> {
    let mut names = BTreeSet::new();

    for section in DEPENDENCY_TABLES {
        if let Some(table) = manifest.get(section).and_then(Value::as_table) {
            collect_table(table, &mut names);
        }
    }

    if let Some(targets) = manifest.get("target").and_then(Value::as_table) {
        for target in targets.values().filter_map(Value::as_table) {
            for section in DEPENDENCY_TABLES {
                if let Some(table) = target.get(section).and_then(Value::as_table) {
                    collect_table(table, &mut names);
                }
            }
        }
    }

    if let Some(package) = manifest
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
    {
        names.insert(package.to_string());
    }

    names
}

/// Check manifest text against lock file text.
pub fn check(manifest: &str, lock: &str) -> std::result::Result<LockCheck, LockProblem> {
    let manifest: Table = toml::from_str(manifest).map_err(|e| LockProblem::Manifest(e.to_string()))?;
    let lock: LockFile = toml::from_str(lock).map_err(|e| LockProblem::Lock(e.to_string()))?;

    let locked: BTreeSet<&str> = lock.package.iter().map(|p| p.name.as_str()).collect();
    let declared = declared_dependencies(&manifest);

    if let Some(missing) = declared.iter().find(|name| !locked.contains(name.as_str())) {
        return Err(LockProblem::Unpinned(missing.clone()));
    }

    Ok(LockCheck {
        declared: declared.len(),
        locked_packages: lock.package.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockProblem {
    Manifest(String),
    Lock(String),
    Unpinned(String),
}

/// File-level wrapper around [`check`] that maps problems to build errors.
pub fn verify_locked(manifest_path: &Path, lock_path: &Path) -> Result<LockCheck> {
    let manifest = std::fs::read_to_string(manifest_path)?;
    let lock = std::fs::read_to_string(lock_path)?;

    check(&manifest, &lock).map_err(|problem| match problem {
        LockProblem::Manifest(reason) => PipelineError::MalformedInput {
            path: manifest_path.to_path_buf(),
            reason,
        },
        LockProblem::Lock(reason) => PipelineError::MalformedInput {
            path: lock_path.to_path_buf(),
            reason,
        },
        LockProblem::Unpinned(dependency) => PipelineError::LockMismatch { dependency },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[package]
name = "terminal-site"
version = "0.1.0"
edition = "2021"

[dependencies]
ratzilla = "0.1"
web-time = { version = "1" }
rand = { package = "rand", version = "0.8" }

[target.'cfg(target_arch = "wasm32")'.dependencies]
getrandom = { version = "0.2", features = ["js"] }
"#;

    fn lock_with(names: &[&str]) -> String {
        let mut lock = String::from("version = 4\n");
        for name in names {
            lock.push_str(&format!(
                "\n[[package]]\nname = \"{}\"\nversion = \"1.0.0\"\n",
                name
            ));
        }
        lock
    }

    #[test]
    fn test_fully_pinned_lock_passes() {
        let lock = lock_with(&["terminal-site", "ratzilla", "web-time", "rand", "getrandom", "js-sys"]);
        let result = check(MANIFEST, &lock).unwrap();
        assert_eq!(result.declared, 5);
        assert_eq!(result.locked_packages, 6);
    }

    #[test]
    fn test_unpinned_target_dependency_fails() {
        let lock = lock_with(&["terminal-site", "ratzilla", "web-time", "rand"]);
        assert_eq!(
            check(MANIFEST, &lock),
            Err(LockProblem::Unpinned("getrandom".to_string()))
        );
    }

    #[test]
    fn test_renamed_dependency_uses_package_name() {
        let manifest = r#"
[package]
name = "app"
version = "0.1.0"

[dependencies]
fastrand = { package = "fastrand2", version = "2" }
"#;
        let lock = lock_with(&["app", "fastrand2"]);
        assert!(check(manifest, &lock).is_ok());
    }

    #[test]
    fn test_malformed_lock_is_reported() {
        assert!(matches!(
            check(MANIFEST, "[[package]\nname ="),
            Err(LockProblem::Lock(_))
        ));
    }

    #[test]
    fn test_verify_locked_maps_to_build_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let manifest_path = dir.path().join("Cargo.toml");
        let lock_path = dir.path().join("Cargo.lock");
        std::fs::write(&manifest_path, MANIFEST).unwrap();
        std::fs::write(&lock_path, lock_with(&["terminal-site"])).unwrap();

        let err = verify_locked(&manifest_path, &lock_path).unwrap_err();
        assert!(matches!(err, PipelineError::LockMismatch { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
