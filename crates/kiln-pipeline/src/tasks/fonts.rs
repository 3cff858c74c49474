//! Font copying.

use crate::config::PipelineConfig;
use crate::sources::SourceSet;
use crate::tasks::{copy_output, TaskError};

/// Copy matched fonts into `fonts.dest`, keeping their relative layout.
pub fn fonts(config: &PipelineConfig) -> Result<usize, TaskError> {
    let files = SourceSet::new(&config.root, &config.fonts.src)?.files();
    let dest = config.output(&config.fonts.dest);

    let mut failed = 0;
    for file in &files {
        if let Err(e) = copy_output(&file.path, &dest.join(&file.relative)) {
            tracing::error!("{}", e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(TaskError::Partial {
            task: "fonts",
            failed,
            total: files.len(),
        });
    }

    Ok(files.len())
}
