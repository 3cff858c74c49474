//! Task orchestration.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::config::PipelineConfig;
use crate::tasks::{self, TaskError};

/// An asset task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    Templates,
    Scripts,
    Styles,
    Images,
    Fonts,
}

impl Task {
    /// Every asset task, in report order.
    pub const ALL: [Task; 5] = [
        Task::Templates,
        Task::Scripts,
        Task::Styles,
        Task::Images,
        Task::Fonts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Task::Templates => "templates",
            Task::Scripts => "scripts",
            Task::Styles => "styles",
            Task::Images => "images",
            Task::Fonts => "fonts",
        }
    }

    /// Globs whose changes should rerun this task.
    pub fn watch_globs(self, config: &PipelineConfig) -> &[String] {
        match self {
            Task::Templates => &config.templates.watch,
            Task::Scripts => &config.scripts.watch,
            Task::Styles => &config.styles.watch,
            Task::Images => &config.images.watch,
            Task::Fonts => &config.fonts.watch,
        }
    }

    /// Run synchronously, returning the number of files written.
    pub fn run(self, config: &PipelineConfig) -> Result<usize, TaskError> {
        match self {
            Task::Templates => tasks::templates(config),
            Task::Scripts => tasks::scripts(config),
            Task::Styles => tasks::styles(config),
            Task::Images => tasks::images(config),
            Task::Fonts => tasks::fonts(config),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a successful task run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub task: Task,

    /// Number of files written
    pub outputs: usize,

    pub duration_ms: u64,
}

/// A task that failed during a build.
#[derive(Debug)]
pub struct TaskFailure {
    pub task: Task,
    pub error: TaskError,
}

/// Outcome of a full build.
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Successful tasks, in [`Task::ALL`] order
    pub reports: Vec<TaskReport>,

    pub failures: Vec<TaskFailure>,

    /// Wall time for the whole build in milliseconds
    pub duration_ms: u64,
}

impl BuildSummary {
    /// Whether every task succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total files written.
    pub fn outputs(&self) -> usize {
        self.reports.iter().map(|r| r.outputs).sum()
    }
}

/// Runs tasks against a shared configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<PipelineConfig> {
        &self.config
    }

    /// Remove the output directory.
    pub async fn clean(&self) -> Result<(), TaskError> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || tasks::clean(&config))
            .await
            .map_err(|e| TaskError::Join(e.to_string()))?
    }

    /// Run one task on the blocking pool.
    pub async fn run_task(&self, task: Task) -> Result<TaskReport, TaskError> {
        let config = Arc::clone(&self.config);
        let start = Instant::now();

        let outputs = tokio::task::spawn_blocking(move || task.run(&config))
            .await
            .map_err(|e| TaskError::Join(e.to_string()))??;

        let report = TaskReport {
            task,
            outputs,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "{}: {} files in {}ms",
            task,
            report.outputs,
            report.duration_ms
        );
        Ok(report)
    }

    /// Clean, then run every asset task concurrently.
    ///
    /// A failing task is logged and recorded; the others still run to
    /// completion. Only a failed clean aborts the build.
    pub async fn build(&self) -> Result<BuildSummary, TaskError> {
        let start = Instant::now();
        self.clean().await?;

        let mut set = JoinSet::new();
        for task in Task::ALL {
            let pipeline = self.clone();
            set.spawn(async move { (task, pipeline.run_task(task).await) });
        }

        let mut summary = BuildSummary::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(report))) => summary.reports.push(report),
                Ok((task, Err(error))) => {
                    tracing::error!("{} failed: {}", task, error);
                    summary.failures.push(TaskFailure { task, error });
                }
                Err(e) => tracing::error!("Build task aborted: {}", e),
            }
        }

        summary.reports.sort_by_key(|r| r.task);
        summary.failures.sort_by_key(|f| f.task);
        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }
}
