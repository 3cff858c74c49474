//! Development server command.

use std::sync::Arc;

use anyhow::Result;
use kiln_pipeline::{Pipeline, PipelineConfig};
use kiln_server::DevServer;

use crate::commands::build;

/// Dev build, then serve and watch.
pub async fn run(mut config: PipelineConfig, port: Option<u16>, open: bool) -> Result<()> {
    config.dev = true;
    if let Some(port) = port {
        config.server.port = port;
    }

    let pipeline = Pipeline::new(Arc::new(config));
    let summary = pipeline.build().await?;
    build::report(&summary);

    start(pipeline, open).await
}

/// Serve an already-built pipeline. Failed tasks are rebuilt on change.
pub async fn start(pipeline: Pipeline, open: bool) -> Result<()> {
    let pipeline = if open {
        pipeline
    } else {
        let mut config = PipelineConfig::clone(pipeline.config());
        config.server.open = false;
        Pipeline::new(Arc::new(config))
    };

    tracing::info!("Starting development server on port {}", pipeline.config().server.port);
    DevServer::new(pipeline).start().await?;

    Ok(())
}
