use crate::core::ConfigProvider;
use crate::domain::model::{BuildOptions, ProvisionPlan, SourceInputs};
use crate::utils::error::{PipelineError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "bundle-serve.toml";

/// File configuration. Every section and field is optional; an empty file
/// describes the standard layout (trunk project in `.`, image root `/`,
/// caddy from its stable package channel).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub pipeline: PipelineSection,
    pub build: BuildConfig,
    pub image: ImageConfig,
    pub provision: ProvisionConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub name: String,
    pub description: Option<String>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub context_root: String,
    pub bundler: String,
    pub dist_dir: String,
    pub entry_file: String,
    pub source_dir: String,
    pub release: bool,
    pub wasm_target: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let options = BuildOptions::default();
        let inputs = SourceInputs::new(".");
        Self {
            context_root: ".".to_string(),
            bundler: options.bundler,
            dist_dir: options.dist_dir.display().to_string(),
            entry_file: inputs.entry_file.display().to_string(),
            source_dir: inputs.source_dir.display().to_string(),
            release: options.release,
            wasm_target: options.wasm_target,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub root: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub package: String,
    pub binary: String,
    pub key_url: String,
    pub key_sha256: Option<String>,
    pub keyring_path: String,
    pub source_list_path: String,
    pub repo_url: String,
    pub suite: String,
    pub component: String,
    pub timeout_seconds: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        let plan = ProvisionPlan::default();
        Self {
            package: plan.package,
            binary: plan.binary.display().to_string(),
            key_url: plan.key_url,
            key_sha256: plan.key_sha256,
            keyring_path: plan.keyring_path.display().to_string(),
            source_list_path: plan.source_list_path.display().to_string(),
            repo_url: plan.repo_url,
            suite: plan.suite,
            component: plan.component,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub context_root: Option<String>,
    pub image_root: Option<String>,
    pub dist_dir: Option<String>,
    pub monitor: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| PipelineError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 載入指定檔案；未指定時若預設檔案存在則使用，否則使用預設值
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${KEY_URL})，未定義的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| {
            PipelineError::ConfigError {
                message: format!("invalid substitution pattern: {}", e),
            }
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(context_root) = &overrides.context_root {
            self.build.context_root = context_root.clone();
        }
        if let Some(image_root) = &overrides.image_root {
            self.image.root = image_root.clone();
        }
        if let Some(dist_dir) = &overrides.dist_dir {
            self.build.dist_dir = dist_dir.clone();
        }
        if let Some(monitor) = overrides.monitor {
            self.monitoring.enabled = monitor;
        }
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;

        validation::validate_path("build.context_root", &self.build.context_root)?;
        validation::validate_non_empty_string("build.bundler", &self.build.bundler)?;
        validation::validate_relative_path("build.entry_file", &self.build.entry_file)?;
        validation::validate_relative_path("build.source_dir", &self.build.source_dir)?;
        validation::validate_non_empty_string("build.wasm_target", &self.build.wasm_target)?;

        validation::validate_output_dir(
            "build.dist_dir",
            &self.build.dist_dir,
            &[
                &self.build.source_dir,
                &self.build.entry_file,
                "Cargo.toml",
                "Cargo.lock",
            ],
        )?;

        validation::validate_path("image.root", &self.image.root)?;

        let provision = &self.provision;
        validation::validate_non_empty_string("provision.package", &provision.package)?;
        validation::validate_relative_path("provision.binary", &provision.binary)?;
        validation::validate_url("provision.key_url", &provision.key_url)?;
        if let Some(digest) = &provision.key_sha256 {
            validation::validate_sha256_hex("provision.key_sha256", digest)?;
        }
        validation::validate_relative_path("provision.keyring_path", &provision.keyring_path)?;
        validation::validate_relative_path(
            "provision.source_list_path",
            &provision.source_list_path,
        )?;
        validation::validate_url("provision.repo_url", &provision.repo_url)?;
        validation::validate_non_empty_string("provision.suite", &provision.suite)?;
        validation::validate_non_empty_string("provision.component", &provision.component)?;
        if provision.timeout_seconds == 0 {
            return Err(PipelineError::InvalidConfigValueError {
                field: "provision.timeout_seconds".to_string(),
                value: "0".to_string(),
                reason: "Value must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled
    }
}

impl ConfigProvider for TomlConfig {
    fn source_inputs(&self) -> SourceInputs {
        SourceInputs::new(&self.build.context_root)
            .with_entry_file(&self.build.entry_file)
            .with_source_dir(&self.build.source_dir)
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            bundler: self.build.bundler.clone(),
            dist_dir: PathBuf::from(&self.build.dist_dir),
            release: self.build.release,
            wasm_target: self.build.wasm_target.clone(),
        }
    }

    fn image_root(&self) -> PathBuf {
        PathBuf::from(&self.image.root)
    }

    fn provision_plan(&self) -> ProvisionPlan {
        let provision = &self.provision;
        ProvisionPlan {
            package: provision.package.clone(),
            binary: PathBuf::from(&provision.binary),
            key_url: provision.key_url.clone(),
            key_sha256: provision.key_sha256.clone(),
            keyring_path: PathBuf::from(&provision.keyring_path),
            source_list_path: PathBuf::from(&provision.source_list_path),
            repo_url: provision.repo_url.clone(),
            suite: provision.suite.clone(),
            component: provision.component.clone(),
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provision.timeout_seconds)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_standard_layout() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert!(config.validate().is_ok());

        let inputs = config.source_inputs();
        assert_eq!(inputs.lock_file_path(), PathBuf::from("./Cargo.lock"));
        assert_eq!(inputs.entry_file_path(), PathBuf::from("./index.html"));
        assert_eq!(config.build_options().bundler, "trunk");
        assert_eq!(config.image_root(), PathBuf::from("/"));
        assert_eq!(config.provision_plan(), ProvisionPlan::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
[pipeline]
name = "terminal-site"

[build]
context_root = "/work"
release = false

[image]
root = "/tmp/rootfs"

[provision]
timeout_seconds = 5
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.pipeline.name, "terminal-site");
        assert_eq!(config.source_inputs().context_root, PathBuf::from("/work"));
        assert!(!config.build_options().release);
        assert_eq!(config.build.dist_dir, "dist");
        assert_eq!(config.image_root(), PathBuf::from("/tmp/rootfs"));
        assert_eq!(config.provision.package, "caddy");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("BUNDLE_SERVE_TEST_KEY_URL", "https://keys.example.com/gpg.key");

        let toml_content = r#"
[provision]
key_url = "${BUNDLE_SERVE_TEST_KEY_URL}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.provision.key_url, "https://keys.example.com/gpg.key");

        std::env::remove_var("BUNDLE_SERVE_TEST_KEY_URL");
    }

    #[test]
    fn test_config_validation() {
        let config = TomlConfig::from_toml_str("[provision]\nkey_url = \"invalid-url\"\n").unwrap();
        assert!(config.validate().is_err());

        let config = TomlConfig::from_toml_str("[build]\ndist_dir = \".\"\n").unwrap();
        assert!(config.validate().is_err());

        let config = TomlConfig::from_toml_str("[build]\ndist_dir = \"src\"\n").unwrap();
        assert!(config.validate().is_err());

        for dist_dir in ["./", "./src", "src/../src", "src/.", "/tmp/dist", "../dist"] {
            let content = format!("[build]\ndist_dir = \"{}\"\n", dist_dir);
            let config = TomlConfig::from_toml_str(&content).unwrap();
            assert!(config.validate().is_err(), "{} should be rejected", dist_dir);
        }

        let config = TomlConfig::from_toml_str("[build]\ndist_dir = \"target/site\"\n").unwrap();
        assert!(config.validate().is_ok());

        let config = TomlConfig::from_toml_str("[build]\nentry_file = \"../index.html\"\n").unwrap();
        assert!(config.validate().is_err());

        let config = TomlConfig::from_toml_str("[provision]\nkey_sha256 = \"abc\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparsable_config_is_config_error() {
        let err = TomlConfig::from_toml_str("[build\n").unwrap_err();
        assert_eq!(err.category(), crate::utils::error::ErrorCategory::Config);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = TomlConfig::from_toml_str("[image]\nroot = \"/from/file\"\n").unwrap();
        config.apply_overrides(&Overrides {
            image_root: Some("/from/cli".to_string()),
            monitor: Some(true),
            ..Overrides::default()
        });
        assert_eq!(config.image_root(), PathBuf::from("/from/cli"));
        assert!(config.monitoring_enabled());
        assert_eq!(config.build.context_root, ".");
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[pipeline]\nname = \"file-test\"\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.pipeline.name, "file-test");

        let loaded = TomlConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(loaded.pipeline.name, "file-test");
    }
}
