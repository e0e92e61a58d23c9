use crate::utils::error::{PipelineError, Result};
use std::path::{Component, Path, PathBuf};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(PipelineError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(PipelineError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(PipelineError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(PipelineError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(PipelineError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

/// Paths inside the build context or the image root must stay inside it.
pub fn validate_relative_path(field_name: &str, path: &str) -> Result<()> {
    validate_path(field_name, path)?;

    let escapes = Path::new(path).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(PipelineError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path must be relative and must not contain '..'".to_string(),
        });
    }

    Ok(())
}

/// Lexically resolve `.` and `..` without touching the filesystem.
/// A relative path that resolves to the starting point becomes empty.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// An output directory that gets wiped before every build. It must be a
/// proper subdirectory of the context and must not overlap any input.
pub fn validate_output_dir(field_name: &str, path: &str, inputs: &[&str]) -> Result<()> {
    validate_relative_path(field_name, path)?;

    let output = normalize_path(Path::new(path));
    let overlaps = output.as_os_str().is_empty()
        || inputs.iter().any(|input| {
            let input = normalize_path(Path::new(input));
            input.starts_with(&output) || output.starts_with(&input)
        });
    if overlaps {
        return Err(PipelineError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "output must not be the build context or overlap its inputs".to_string(),
        });
    }

    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| PipelineError::MissingConfigError {
            field: field_name.to_string(),
        })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PipelineError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_sha256_hex(field_name: &str, value: &str) -> Result<()> {
    if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PipelineError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Expected 64 hexadecimal characters".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("provision.key_url", "https://example.com/gpg.key").is_ok());
        assert!(validate_url("provision.key_url", "http://example.com").is_ok());
        assert!(validate_url("provision.key_url", "").is_err());
        assert!(validate_url("provision.key_url", "invalid-url").is_err());
        assert!(validate_url("provision.key_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_relative_path() {
        assert!(validate_relative_path("build.dist_dir", "dist").is_ok());
        assert!(validate_relative_path("build.dist_dir", "out/web").is_ok());
        assert!(validate_relative_path("build.dist_dir", "../dist").is_err());
        assert!(validate_relative_path("build.dist_dir", "/dist").is_err());
        assert!(validate_relative_path("build.dist_dir", "").is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("./")), PathBuf::new());
        assert_eq!(normalize_path(Path::new("./src")), PathBuf::from("src"));
        assert_eq!(normalize_path(Path::new("src/../src")), PathBuf::from("src"));
        assert_eq!(normalize_path(Path::new("src/.")), PathBuf::from("src"));
        assert_eq!(normalize_path(Path::new("../a/../b")), PathBuf::from("../b"));
        assert_eq!(normalize_path(Path::new("/work/../..")), PathBuf::from("/"));
    }

    #[test]
    fn test_validate_output_dir_rejects_overlap() {
        let inputs = ["src", "index.html", "Cargo.toml", "Cargo.lock"];
        assert!(validate_output_dir("build.dist_dir", "dist", &inputs).is_ok());
        assert!(validate_output_dir("build.dist_dir", "out/web", &inputs).is_ok());
        for bad in [".", "./", "./src", "src/.", "src/../src", "src/generated", "index.html"] {
            assert!(
                validate_output_dir("build.dist_dir", bad, &inputs).is_err(),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some(3);
        let absent: Option<i32> = None;
        assert_eq!(*validate_required_field("x", &present).unwrap(), 3);
        assert!(validate_required_field("x", &absent).is_err());
    }

    #[test]
    fn test_validate_sha256_hex() {
        let digest = "a".repeat(64);
        assert!(validate_sha256_hex("provision.key_sha256", &digest).is_ok());
        assert!(validate_sha256_hex("provision.key_sha256", "abc").is_err());
        assert!(validate_sha256_hex("provision.key_sha256", &"g".repeat(64)).is_err());
    }
}
