//! Full build command.

use std::sync::Arc;

use anyhow::Result;
use kiln_pipeline::{BuildSummary, Pipeline, PipelineConfig};

use crate::commands::serve;

/// Clean and build everything. In dev mode, keep serving afterwards.
pub async fn run(config: PipelineConfig, open: bool) -> Result<()> {
    let dev = config.dev;
    tracing::info!(
        "Building {} ({} mode)...",
        config.root.display(),
        if dev { "development" } else { "production" }
    );

    let pipeline = Pipeline::new(Arc::new(config));
    let summary = pipeline.build().await?;
    report(&summary);

    if dev {
        return serve::start(pipeline, open).await;
    }

    if !summary.is_success() {
        let failed: Vec<&str> = summary.failures.iter().map(|f| f.task.name()).collect();
        anyhow::bail!("Build failed: {}", failed.join(", "));
    }

    Ok(())
}

pub fn report(summary: &BuildSummary) {
    if summary.is_success() {
        tracing::info!(
            "Built {} files in {}ms",
            summary.outputs(),
            summary.duration_ms
        );
    } else {
        tracing::warn!(
            "Built {} files in {}ms, {} tasks failed",
            summary.outputs(),
            summary.duration_ms,
            summary.failures.len()
        );
    }
}
