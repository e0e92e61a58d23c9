//! Asset tree helpers: scanning into an [`AssetBundle`], verbatim copying and
//! content digests.

use crate::domain::model::{AssetBundle, BundleFile};
use crate::utils::error::{PipelineError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Relative path with `/` separators, independent of the host platform.
fn normalized(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn list_files(root: &Path) -> Result<Vec<BundleFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| PipelineError::InvalidBundle {
                root: root.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_path_buf();
        files.push(BundleFile {
            path: relative,
            size: entry.metadata()?.len(),
        });
    }
    files.sort_by_key(|f| normalized(&f.path));
    Ok(files)
}

fn digest_files(root: &Path, files: &[BundleFile]) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    for file in files {
        hasher.update(normalized(&file.path).as_bytes());
        hasher.update([0u8]);
        hasher.update(file.size.to_le_bytes());

        let mut handle = fs::File::open(root.join(&file.path))?;
        loop {
            let read = handle.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Scan `root` into an [`AssetBundle`]. The tree must be non-empty and
/// contain `entry_file` as a regular file.
pub fn scan(root: &Path, entry_file: &Path) -> Result<AssetBundle> {
    if !root.is_dir() {
        return Err(PipelineError::InvalidBundle {
            root: root.to_path_buf(),
            reason: "bundle root is not a directory".to_string(),
        });
    }

    let files = list_files(root)?;
    if files.is_empty() {
        return Err(PipelineError::InvalidBundle {
            root: root.to_path_buf(),
            reason: "bundle is empty".to_string(),
        });
    }

    if !root.join(entry_file).is_file() {
        return Err(PipelineError::InvalidBundle {
            root: root.to_path_buf(),
            reason: format!("entry file {} not found", entry_file.display()),
        });
    }

    let digest = digest_files(root, &files)?;
    Ok(AssetBundle::from_parts(
        root.to_path_buf(),
        entry_file.to_path_buf(),
        files,
        digest,
    ))
}

/// Remove everything below `dir` but keep `dir` itself.
pub fn clear_dir(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// Copy every file of `bundle` below `destination`, preserving layout.
/// Directories are recreated even when empty so they stay browsable.
/// Symbolic links are not part of a bundle and are not copied.
pub fn copy_bundle(bundle: &AssetBundle, destination: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(destination)?;
    for entry in WalkDir::new(bundle.root()).min_depth(1).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(bundle.root())
            .map_err(|e| PipelineError::InvalidBundle {
                root: bundle.root().to_path_buf(),
                reason: e.to_string(),
            })?;
        fs::create_dir_all(destination.join(relative))?;
    }
    let mut written = Vec::with_capacity(bundle.file_count());
    for file in bundle.files() {
        let target = destination.join(&file.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(bundle.root().join(&file.path), &target)?;
        written.push(target);
    }
    Ok(written)
}

/// `true` when `dir` holds at least one regular file at any depth.
pub fn has_files(dir: &Path) -> Result<bool> {
    for entry in WalkDir::new(dir) {
        if entry?.file_type().is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "<html></html>");
        write(dir.path(), "app-1234_bg.wasm", "\0asm");
        write(dir.path(), "assets/style.css", "body {}");
        dir
    }

    #[test]
    fn test_scan_collects_sorted_files() {
        let dir = sample_tree();
        let bundle = scan(dir.path(), Path::new("index.html")).unwrap();

        let names: Vec<String> = bundle.files().iter().map(|f| normalized(&f.path)).collect();
        assert_eq!(names, vec!["app-1234_bg.wasm", "assets/style.css", "index.html"]);
        assert_eq!(bundle.file_count(), 3);
        assert_eq!(bundle.total_bytes(), 13 + 4 + 7);
        assert_eq!(bundle.digest().len(), 64);
    }

    #[test]
    fn test_scan_rejects_missing_entry() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "main.js", "console.log(1)");
        let err = scan(dir.path(), Path::new("index.html")).unwrap_err();
        assert!(err.to_string().contains("entry file"));
    }

    #[test]
    fn test_scan_rejects_empty_tree() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        let err = scan(dir.path(), Path::new("index.html")).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let first = sample_tree();
        let second = sample_tree();
        let a = scan(first.path(), Path::new("index.html")).unwrap();
        let b = scan(second.path(), Path::new("index.html")).unwrap();
        assert_eq!(a.digest(), b.digest());

        write(second.path(), "assets/style.css", "body { margin: 0 }");
        let c = scan(second.path(), Path::new("index.html")).unwrap();
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_copy_bundle_is_verbatim() {
        let source = sample_tree();
        let bundle = scan(source.path(), Path::new("index.html")).unwrap();

        let target = TempDir::new().unwrap();
        let destination = target.path().join("srv");
        copy_bundle(&bundle, &destination).unwrap();

        let copied = scan(&destination, Path::new("index.html")).unwrap();
        assert_eq!(copied.digest(), bundle.digest());
        assert_eq!(copied.files(), bundle.files());
    }

    #[test]
    fn test_copy_bundle_keeps_empty_directories() {
        let source = sample_tree();
        fs::create_dir_all(source.path().join("assets/fonts")).unwrap();
        let bundle = scan(source.path(), Path::new("index.html")).unwrap();

        let target = TempDir::new().unwrap();
        let destination = target.path().join("srv");
        copy_bundle(&bundle, &destination).unwrap();

        assert!(destination.join("assets/fonts").is_dir());
        assert!(destination.join("assets/style.css").is_file());
    }

    #[test]
    fn test_clear_dir_keeps_directory() {
        let dir = sample_tree();
        let removed = clear_dir(dir.path()).unwrap();
        assert_eq!(removed, 3);
        assert!(dir.path().exists());
        assert!(!has_files(dir.path()).unwrap());
    }
}
