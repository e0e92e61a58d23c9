use anyhow::Context;
use bundle_serve::config::{CliConfig, Command, TomlConfig};
use bundle_serve::core::probe;
use bundle_serve::core::serve::ServeCommand;
use bundle_serve::core::{bundle, ConfigProvider, Pipeline, PipelineReport};
use bundle_serve::domain::model::{BundleSummary, ImageSummary, PipelineState};
use bundle_serve::utils::{logger, validation::Validate};
use bundle_serve::{ContainerPipeline, HttpFetcher, PipelineEngine, PipelineError, SystemRunner};
use clap::Parser;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    let mut config = match TomlConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };
    config.apply_overrides(&cli.overrides());

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }
    tracing::debug!("Configuration: {:?}", config);

    let outcome = match &cli.command {
        Command::Run {
            report,
            skip_preflight,
            ..
        } => run(&config, report.as_deref(), *skip_preflight).await,
        Command::Build { skip_preflight } => build(&config, *skip_preflight).await,
        Command::Assemble {
            bundle,
            report,
            skip_preflight,
        } => assemble(&config, bundle, report.as_deref(), *skip_preflight).await,
        Command::Serve => serve(&config),
        Command::Plan => {
            plan(&config);
            Ok(())
        }
        Command::Probe {
            url,
            bundle,
            listing,
        } => run_probe(&config, url, bundle.as_deref(), listing.as_deref()).await,
    };

    if let Err(e) = outcome {
        exit_with(&e);
    }
    Ok(())
}

fn exit_with(e: &PipelineError) -> ! {
    tracing::error!(
        "❌ Pipeline failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.exit_code());
}

fn write_report(path: &Path, report: &PipelineReport) -> bundle_serve::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    tracing::info!("📝 Report written to {}", path.display());
    Ok(())
}

async fn run(
    config: &TomlConfig,
    report_path: Option<&Path>,
    skip_preflight: bool,
) -> bundle_serve::Result<()> {
    let pipeline = ContainerPipeline::new(SystemRunner::new(), config)?;
    if !skip_preflight {
        pipeline.preflight_build().await?;
        pipeline.preflight_assemble()?;
    }

    let engine = PipelineEngine::new_with_monitoring(pipeline, config.monitoring_enabled());
    let report = engine.run().await?;

    if let Some(image) = &report.image {
        println!("✅ Pipeline completed: {:?}", report.state);
        println!(
            "📦 Bundle: {} files, {} bytes (sha256 {})",
            report.bundle.file_count, report.bundle.total_bytes, report.bundle.digest
        );
        println!("📁 Served from: {}", image.serve_root.display());
        println!("▶️  Entry point: {}", image.entrypoint.join(" "));
    }
    if let Some(path) = report_path {
        write_report(path, &report)?;
    }
    Ok(())
}

async fn build(config: &TomlConfig, skip_preflight: bool) -> bundle_serve::Result<()> {
    let pipeline = ContainerPipeline::new(SystemRunner::new(), config)?;
    if !skip_preflight {
        pipeline.preflight_build().await?;
    }

    let engine = PipelineEngine::new_with_monitoring(pipeline, config.monitoring_enabled());
    let bundle = engine.build_only().await?;
    println!(
        "📦 Bundle at {}: {} files, {} bytes (sha256 {})",
        bundle.root().display(),
        bundle.file_count(),
        bundle.total_bytes(),
        bundle.digest()
    );
    Ok(())
}

async fn assemble(
    config: &TomlConfig,
    bundle_dir: &Path,
    report_path: Option<&Path>,
    skip_preflight: bool,
) -> bundle_serve::Result<()> {
    let started_at = chrono::Utc::now();
    let pipeline = ContainerPipeline::new(SystemRunner::new(), config)?;
    if !skip_preflight {
        pipeline.preflight_assemble()?;
    }

    let entry = config.source_inputs().entry_file_name();
    let bundle = bundle::scan(bundle_dir, &entry)?;
    let summary = BundleSummary::from(&bundle);

    let assemble_start = std::time::Instant::now();
    let image = pipeline.assemble(bundle).await?;
    println!("✅ Image assembled at {}", image.root.display());
    println!("▶️  Entry point: {}", image.entrypoint().join(" "));

    if let Some(path) = report_path {
        let report = PipelineReport {
            state: PipelineState::Assembled,
            started_at,
            finished_at: chrono::Utc::now(),
            build_duration_ms: 0,
            assemble_duration_ms: Some(assemble_start.elapsed().as_millis() as u64),
            bundle: summary,
            image: Some(ImageSummary::from(&image)),
        };
        write_report(path, &report)?;
    }
    Ok(())
}

// 以檔案伺服器取代目前行程，成為映像的唯一前景行程
#[cfg(unix)]
fn serve(config: &TomlConfig) -> bundle_serve::Result<()> {
    let command = ServeCommand::from_plan(&config.provision_plan());
    Err(command.exec())
}

#[cfg(not(unix))]
fn serve(config: &TomlConfig) -> bundle_serve::Result<()> {
    let command = ServeCommand::from_plan(&config.provision_plan());
    let code = command.run()?;
    std::process::exit(code.unwrap_or(1));
}

fn plan(config: &TomlConfig) {
    let runner = SystemRunner::new();
    let inputs = config.source_inputs();
    let options = config.build_options();
    let builder =
        bundle_serve::core::builder::AssetBuilder::new(runner.clone(), inputs.clone(), options);

    println!("📋 Plan for {}", config.pipeline.name);
    println!();
    println!("🔨 Asset Builder");
    println!("  Lock file:   {}", inputs.lock_file_path().display());
    println!("  Descriptor:  {}", inputs.manifest_path().display());
    println!("  Entry file:  {}", inputs.entry_file_path().display());
    println!("  Sources:     {}", inputs.source_dir_path().display());
    println!("  Command:     {}", builder.command());
    println!("  Output:      {}", builder.dist_path().display());

    let provision_plan = config.provision_plan();
    let fetcher = match HttpFetcher::new(config.request_timeout()) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            println!("  ⚠️  Cannot create HTTP client: {}", e);
            return;
        }
    };
    let assembler = bundle_serve::core::assembler::ImageAssembler::new(
        runner,
        fetcher,
        config.image_root(),
        provision_plan.clone(),
    );
    let provisioner = assembler.provisioner();

    println!();
    println!("🏗️  Serving Image Assembler");
    println!("  Image root:  {}", assembler.image_root().display());
    println!(
        "  1. install-trust-key  {} -> /{}",
        provision_plan.key_url,
        provision_plan.keyring_path.display()
    );
    println!(
        "  2. register-source    /{}: {}",
        provision_plan.source_list_path.display(),
        provision_plan.source_entry().trim_end()
    );
    println!("  3. refresh-index      {}", provisioner.refresh_command());
    println!("  4. install-package    {}", provisioner.install_command());
    println!("  Copy bundle to:       {}", assembler.serve_root().display());

    println!();
    println!("🌐 Runtime");
    println!(
        "  Entry point: {}",
        ServeCommand::from_plan(&provision_plan).argv().join(" ")
    );
    println!("  Listener:    http://0.0.0.0:80 (plaintext, directory browsing on)");
}

async fn run_probe(
    config: &TomlConfig,
    url: &str,
    bundle_dir: Option<&Path>,
    listing: Option<&str>,
) -> bundle_serve::Result<()> {
    let fetcher = HttpFetcher::new(config.request_timeout())?;
    let expected = match bundle_dir {
        Some(dir) => {
            let entry = dir.join(config.source_inputs().entry_file_name());
            Some(
                std::fs::read(&entry)
                    .with_context(|| format!("cannot read entry file {}", entry.display()))
                    .map_err(|e| PipelineError::ConfigError {
                        message: format!("{:#}", e),
                    })?,
            )
        }
        None => None,
    };

    let report = probe::probe(&fetcher, url, expected.as_deref(), listing).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
