//! The runtime entry process: the file server in the foreground, nothing else.

use crate::domain::model::{ProvisionPlan, ServingConfiguration};
use crate::utils::error::{PipelineError, Result};
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone)]
pub struct ServeCommand {
    binary: PathBuf,
    serving: ServingConfiguration,
}

impl ServeCommand {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            serving: ServingConfiguration::fixed(),
        }
    }

    pub fn from_plan(plan: &ProvisionPlan) -> Self {
        Self::new(plan.binary_in_image())
    }

    pub fn serving(&self) -> &ServingConfiguration {
        &self.serving
    }

    /// The configured binary, or the same file name on `PATH`.
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        if self.binary.is_file() {
            return Ok(self.binary.clone());
        }
        let name = self.binary.file_name().unwrap_or(self.binary.as_os_str());
        which::which(name).map_err(|e| PipelineError::ServerLaunch {
            binary: self.binary.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.binary.display().to_string()];
        argv.extend(self.serving.server_args());
        argv
    }

    fn command(&self, binary: PathBuf) -> Command {
        let mut command = Command::new(binary);
        command.args(self.serving.server_args());
        command
    }

    /// Replace the current process with the file server. Only returns on
    /// failure; once the server runs, its exit status is the process exit
    /// status.
    #[cfg(unix)]
    pub fn exec(&self) -> PipelineError {
        use std::os::unix::process::CommandExt;

        let binary = match self.resolve_binary() {
            Ok(binary) => binary,
            Err(e) => return e,
        };
        tracing::info!(
            "🌐 Serving {} on {} (browse on, TLS off)",
            self.serving.root().display(),
            self.serving.socket_addr()
        );
        let err = self.command(binary.clone()).exec();
        PipelineError::ServerLaunch {
            binary: binary.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Spawn the server and wait for it. Used where `exec` is unavailable.
    pub fn run(&self) -> Result<Option<i32>> {
        let binary = self.resolve_binary()?;
        tracing::info!(
            "🌐 Serving {} on {} (browse on, TLS off)",
            self.serving.root().display(),
            self.serving.socket_addr()
        );
        let status = self
            .command(binary.clone())
            .status()
            .map_err(|e| PipelineError::ServerLaunch {
                binary: binary.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(status.code())
    }
}
