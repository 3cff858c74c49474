//! Output removal command.

use std::sync::Arc;

use anyhow::Result;
use kiln_pipeline::{Pipeline, PipelineConfig};

pub async fn run(config: PipelineConfig) -> Result<()> {
    let dest = config.path(&config.dest);
    Pipeline::new(Arc::new(config)).clean().await?;
    tracing::info!("Removed {}", dest.display());
    Ok(())
}
