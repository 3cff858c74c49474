//! Build pipeline for kiln.
//!
//! Holds the immutable build configuration, selects source files by glob,
//! and runs the asset tasks (templates, scripts, styles, images, fonts).

pub mod config;
pub mod desktop;
pub mod pipeline;
pub mod sources;
pub mod tasks;

pub use config::{ConfigError, PipelineConfig, ServerConfig};
pub use pipeline::{BuildSummary, Pipeline, Task, TaskFailure, TaskReport};
pub use sources::{glob_base, SourceFile, SourceSet};
pub use tasks::TaskError;
