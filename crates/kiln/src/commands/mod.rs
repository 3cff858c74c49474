pub mod build;
pub mod clean;
pub mod init;
pub mod serve;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use kiln_pipeline::PipelineConfig;

/// Load the project configuration with an absolute root.
pub fn load_config(root: &Path, config_file: &Path, dev: bool) -> Result<PipelineConfig> {
    let root = fs::canonicalize(root)
        .with_context(|| format!("Project root not found: {}", root.display()))?;

    let config = PipelineConfig::load(&root, config_file, dev)?;
    Ok(config)
}
