//! Asset tasks.
//!
//! Each task reads its sources through the shared [`PipelineConfig`] and
//! writes into its own destination subtree. Tasks return the number of files
//! written.

use std::fs;
use std::path::Path;

use kiln_bundler::BundleFailure;
use kiln_templates::TemplateError;

use crate::config::ConfigError;

pub mod clean;
pub mod fonts;
pub mod images;
pub mod scripts;
pub mod styles;
pub mod templates;

pub use clean::clean;
pub use fonts::fonts;
pub use images::images;
pub use scripts::scripts;
pub use styles::styles;
pub use templates::templates;

/// Errors that can occur while running a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Bundle failed: {0}")]
    Bundle(#[from] BundleFailure),

    #[error("Style error in {path}: {message}")]
    Style { path: String, message: String },

    #[error("{failed} of {total} {task} files failed")]
    Partial {
        task: &'static str,
        failed: usize,
        total: usize,
    },

    #[error("Task did not complete: {0}")]
    Join(String),
}

impl TaskError {
    pub(crate) fn io(path: &Path, e: impl std::fmt::Display) -> Self {
        TaskError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }
}

/// Write `contents`, creating parent directories.
pub(crate) fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| TaskError::io(path, e))
}

/// Copy a file, creating parent directories.
pub(crate) fn copy_output(from: &Path, to: &Path) -> Result<(), TaskError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    fs::copy(from, to).map_err(|e| TaskError::io(from, e))?;
    Ok(())
}
