use crate::config::toml_config::Overrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "bundle-serve", version)]
#[command(about = "Build a WASM web bundle and assemble a static file server image around it")]
pub struct CliConfig {
    /// Path to TOML configuration file (default: ./bundle-serve.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Build context root holding Cargo.toml, Cargo.lock, index.html and src/
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Root of the runtime base the server is installed into
    #[arg(long, global = true)]
    pub image_root: Option<String>,

    /// Bundler output directory, relative to the build context
    #[arg(long, global = true)]
    pub dist_dir: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build the bundle, then assemble the serving image
    Run {
        /// Log CPU and memory usage per stage
        #[arg(long)]
        monitor: bool,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Skip host tool checks
        #[arg(long)]
        skip_preflight: bool,
    },

    /// Run the Asset Builder only
    Build {
        #[arg(long)]
        skip_preflight: bool,
    },

    /// Assemble the serving image from an existing bundle directory
    Assemble {
        #[arg(long)]
        bundle: PathBuf,

        #[arg(long)]
        report: Option<PathBuf>,

        #[arg(long)]
        skip_preflight: bool,
    },

    /// Start the file server in the foreground (image entry point)
    Serve,

    /// Show what a run would do without executing anything
    Plan,

    /// Smoke-check a running serving container
    Probe {
        #[arg(long, default_value = "http://127.0.0.1:80")]
        url: String,

        /// Bundle directory whose entry file `GET /` must return
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Subdirectory expected to answer with a directory listing
        #[arg(long)]
        listing: Option<String>,
    },
}

impl CliConfig {
    pub fn overrides(&self) -> Overrides {
        let monitor = match &self.command {
            Command::Run { monitor: true, .. } => Some(true),
            _ => None,
        };
        Overrides {
            context_root: self.context.clone(),
            image_root: self.image_root.clone(),
            dist_dir: self.dist_dir.clone(),
            monitor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_global_flags() {
        let cli = CliConfig::try_parse_from([
            "bundle-serve",
            "run",
            "--monitor",
            "--context",
            "/work",
            "--image-root",
            "/rootfs",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.context_root.as_deref(), Some("/work"));
        assert_eq!(overrides.image_root.as_deref(), Some("/rootfs"));
        assert_eq!(overrides.monitor, Some(true));
    }

    #[test]
    fn test_probe_defaults_to_port_80() {
        let cli = CliConfig::try_parse_from(["bundle-serve", "probe"]).unwrap();
        match cli.command {
            Command::Probe { url, .. } => assert_eq!(url, "http://127.0.0.1:80"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_assemble_requires_bundle() {
        assert!(CliConfig::try_parse_from(["bundle-serve", "assemble"]).is_err());
    }
}
