use crate::core::Pipeline;
use crate::domain::model::{
    AssetBundle, BundleSummary, ImageSummary, PipelineReport, PipelineState,
};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use chrono::Utc;
use std::time::Instant;

/// Runs the two stages strictly in order. A build failure ends the run
/// before the assembler is touched.
pub struct PipelineEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> PipelineEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn build_only(&self) -> Result<AssetBundle> {
        tracing::info!("🔨 Building asset bundle...");
        let bundle = self.pipeline.build().await?;
        self.monitor.log_stats("Build");
        Ok(bundle)
    }

    pub async fn run(&self) -> Result<PipelineReport> {
        let started_at = Utc::now();
        let mut state = PipelineState::NotBuilt;
        tracing::info!("🚀 Starting build-and-serve pipeline");

        let build_start = Instant::now();
        let bundle = self.build_only().await?;
        let build_duration = build_start.elapsed();
        state = state.next().unwrap_or(state);
        tracing::info!("✅ Build stage finished in {:?} ({:?})", build_duration, state);

        tracing::info!("🏗️  Assembling serving image...");
        let assemble_start = Instant::now();
        let bundle_summary = BundleSummary::from(&bundle);
        let image = self.pipeline.assemble(bundle).await?;
        let assemble_duration = assemble_start.elapsed();
        self.monitor.log_stats("Assemble");
        state = state.next().unwrap_or(state);
        tracing::info!(
            "✅ Assemble stage finished in {:?} ({:?})",
            assemble_duration,
            state
        );

        self.monitor.log_final_stats();

        Ok(PipelineReport {
            state,
            started_at,
            finished_at: Utc::now(),
            build_duration_ms: build_duration.as_millis() as u64,
            assemble_duration_ms: Some(assemble_duration.as_millis() as u64),
            bundle: bundle_summary,
            image: Some(ImageSummary::from(&image)),
        })
    }
}
