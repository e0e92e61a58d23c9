use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    // 建置錯誤 (Asset Builder)
    #[error("Missing build input {kind}: {}", path.display())]
    MissingInput { kind: &'static str, path: PathBuf },

    #[error("Source directory is empty: {}", path.display())]
    EmptySource { path: PathBuf },

    #[error("Malformed build input {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error("Lock file does not pin dependency '{dependency}'")]
    LockMismatch { dependency: String },

    #[error("Build tool '{tool}' failed with {}", describe_code(*code))]
    BuildToolFailed { tool: String, code: Option<i32> },

    #[error("Invalid asset bundle at {}: {reason}", root.display())]
    InvalidBundle { root: PathBuf, reason: String },

    // 佈建錯誤 (Serving Image Assembler)
    #[error("Failed to fetch trust key: {0}")]
    KeyFetch(#[from] reqwest::Error),

    #[error("Invalid trust key: {reason}")]
    InvalidTrustKey { reason: String },

    #[error("Provisioning step '{step}' failed: {message}")]
    ProvisionFailed { step: String, message: String },

    #[error("Runtime image violates minimal surface: {}", offenders.join(", "))]
    SurfaceViolation { offenders: Vec<String> },

    // 執行期錯誤
    #[error("Failed to launch file server '{binary}': {message}")]
    ServerLaunch { binary: String, message: String },

    #[error("Probe of {url} failed: {reason}")]
    ProbeFailed { url: String, reason: String },

    // 配置錯誤
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Missing required host tools: {}", missing.join(", "))]
    PreflightFailed { missing: Vec<String> },

    // 系統錯誤
    #[error("Cannot create HTTP client: {message}")]
    HttpClient { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Build,
    Provision,
    Runtime,
    Config,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::MissingInput { .. }
            | PipelineError::EmptySource { .. }
            | PipelineError::MalformedInput { .. }
            | PipelineError::LockMismatch { .. }
            | PipelineError::BuildToolFailed { .. }
            | PipelineError::InvalidBundle { .. }
            | PipelineError::PreflightFailed { .. } => ErrorCategory::Build,
            PipelineError::KeyFetch(_)
            | PipelineError::InvalidTrustKey { .. }
            | PipelineError::ProvisionFailed { .. }
            | PipelineError::SurfaceViolation { .. } => ErrorCategory::Provision,
            PipelineError::ServerLaunch { .. } | PipelineError::ProbeFailed { .. } => {
                ErrorCategory::Runtime
            }
            PipelineError::ConfigError { .. }
            | PipelineError::InvalidConfigValueError { .. }
            | PipelineError::MissingConfigError { .. }
            | PipelineError::TomlError(_) => ErrorCategory::Config,
            PipelineError::HttpClient { .. }
            | PipelineError::IoError(_)
            | PipelineError::WalkError(_)
            | PipelineError::SerializationError(_) => ErrorCategory::System,
        }
    }

    /// Build and provisioning failures are terminal for the run; nothing is
    /// ever downgraded below `High`.
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Build | ErrorCategory::Provision | ErrorCategory::Config => {
                ErrorSeverity::High
            }
            ErrorCategory::Runtime => ErrorSeverity::Medium,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Build => 1,
            ErrorCategory::Config => 2,
            ErrorCategory::Provision => 3,
            ErrorCategory::System => 4,
            ErrorCategory::Runtime => 5,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            PipelineError::MissingInput { kind, .. } => {
                format!("Add the {} to the build context or point --context at the project root", kind)
            }
            PipelineError::EmptySource { .. } => {
                "Add the application sources before building".to_string()
            }
            PipelineError::MalformedInput { path, .. } => {
                format!("Fix the syntax of {}", path.display())
            }
            PipelineError::LockMismatch { .. } => {
                "Regenerate the lock file (cargo generate-lockfile) and commit it".to_string()
            }
            PipelineError::BuildToolFailed { tool, .. } => {
                format!("Inspect the {} output above; compile errors are not transient", tool)
            }
            PipelineError::InvalidBundle { .. } => {
                "Check that the bundler emits the entry markup file into the dist directory"
                    .to_string()
            }
            PipelineError::KeyFetch(_) => {
                "Check network access to the package channel, then rerun the pipeline".to_string()
            }
            PipelineError::InvalidTrustKey { .. } => {
                "Verify provision.key_url and provision.key_sha256".to_string()
            }
            PipelineError::ProvisionFailed { step, .. } => {
                format!("Rerun after fixing the '{}' step; completed steps are skipped", step)
            }
            PipelineError::SurfaceViolation { .. } => {
                "Start from a runtime base without build toolchain or sources".to_string()
            }
            PipelineError::ServerLaunch { .. } => {
                "Run the assemble stage so the file server is installed".to_string()
            }
            PipelineError::ProbeFailed { .. } => {
                "Check that the serving container is running and reachable".to_string()
            }
            PipelineError::ConfigError { .. }
            | PipelineError::InvalidConfigValueError { .. }
            | PipelineError::MissingConfigError { .. }
            | PipelineError::TomlError(_) => "Fix the configuration file and retry".to_string(),
            PipelineError::PreflightFailed { .. } => {
                "Install the missing tools on the build host".to_string()
            }
            PipelineError::HttpClient { .. } => {
                "Check the TLS setup of the host (root certificates)".to_string()
            }
            PipelineError::IoError(_) | PipelineError::WalkError(_) => {
                "Check file permissions and available disk space".to_string()
            }
            PipelineError::SerializationError(_) => "Report this as a bug".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        let prefix = match self.category() {
            ErrorCategory::Build => "Build failed",
            ErrorCategory::Provision => "Image assembly failed",
            ErrorCategory::Runtime => "Serving failed",
            ErrorCategory::Config => "Invalid configuration",
            ErrorCategory::System => "System error",
        };
        format!("{}: {}", prefix, self)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_errors_are_fatal() {
        let err = PipelineError::LockMismatch {
            dependency: "ratzilla".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Build);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_provision_error_message() {
        let err = PipelineError::ProvisionFailed {
            step: "refresh-index".to_string(),
            message: "apt-get update exited with 100".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Provision);
        assert!(err.user_friendly_message().starts_with("Image assembly failed"));
        assert!(err.recovery_suggestion().contains("refresh-index"));
    }

    #[test]
    fn test_http_client_setup_is_a_system_error() {
        let err = PipelineError::HttpClient {
            message: "no TLS backend".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::System);
        assert_eq!(err.exit_code(), 4);
        assert!(!err.to_string().contains("trust key"));
    }

    #[test]
    fn test_signal_termination_is_described() {
        let err = PipelineError::BuildToolFailed {
            tool: "trunk".to_string(),
            code: None,
        };
        assert!(err.to_string().contains("signal"));
    }
}
