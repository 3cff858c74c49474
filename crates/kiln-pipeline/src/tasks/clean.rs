//! Output directory removal.

use std::fs;
use std::io::ErrorKind;

use crate::config::PipelineConfig;
use crate::tasks::TaskError;

/// Remove the output root. A missing directory is not an error.
pub fn clean(config: &PipelineConfig) -> Result<(), TaskError> {
    let dest = config.path(&config.dest);

    match fs::remove_dir_all(&dest) {
        Ok(()) => {
            tracing::debug!("Removed {}", dest.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TaskError::io(&dest, e)),
    }
}
