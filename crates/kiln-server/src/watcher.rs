//! File watching for live reload.
//!
//! Raw notify events are mapped to the tasks whose watch globs match, then
//! debounced per task: a task's batch is released once no new event for it
//! has arrived for the debounce delay.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use kiln_pipeline::{PipelineConfig, SourceSet, Task};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// A debounced batch of changes for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub task: Task,

    /// Changed paths, deduplicated, in arrival order
    pub paths: Vec<PathBuf>,
}

/// Per-task trailing-edge debounce.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: BTreeMap<Task, Pending>,
}

#[derive(Debug)]
struct Pending {
    last: Instant,
    paths: Vec<PathBuf>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: BTreeMap::new(),
        }
    }

    /// Record a change for `task` at `now`, pushing its deadline back.
    pub fn push(&mut self, task: Task, path: PathBuf, now: Instant) {
        let pending = self.pending.entry(task).or_insert_with(|| Pending {
            last: now,
            paths: Vec::new(),
        });
        pending.last = now;
        if !pending.paths.contains(&path) {
            pending.paths.push(path);
        }
    }

    /// The earliest instant a batch becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.last + self.delay).min()
    }

    /// Remove and return every batch whose quiet period has elapsed.
    pub fn drain_due(&mut self, now: Instant) -> Vec<WatchEvent> {
        let due: Vec<Task> = self
            .pending
            .iter()
            .filter(|(_, p)| now >= p.last + self.delay)
            .map(|(task, _)| *task)
            .collect();

        due.into_iter()
            .filter_map(|task| {
                self.pending
                    .remove(&task)
                    .map(|p| WatchEvent { task, paths: p.paths })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Watch-glob matchers for every task.
#[derive(Debug, Clone)]
pub struct TaskRoutes {
    root: PathBuf,
    routes: Vec<(Task, SourceSet)>,
}

impl TaskRoutes {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, kiln_pipeline::ConfigError> {
        let routes = Task::ALL
            .iter()
            .map(|task| Ok((*task, SourceSet::new(&config.root, task.watch_globs(config))?)))
            .collect::<Result<Vec<_>, kiln_pipeline::ConfigError>>()?;
        Ok(Self {
            root: config.root.clone(),
            routes,
        })
    }

    /// Directories to watch: the glob bases of every task, without nesting.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for base in self.routes.iter().flat_map(|(_, set)| set.bases()) {
            if !roots.iter().any(|r| base.starts_with(r)) {
                roots.retain(|r| !r.starts_with(base));
                roots.push(base.clone());
            }
        }
        roots.into_iter().map(|r| self.root.join(r)).collect()
    }

    /// Tasks whose watch globs match an absolute path.
    pub fn classify(&self, path: &Path) -> Vec<Task> {
        self.routes
            .iter()
            .filter(|(_, set)| set.matches_path(path))
            .map(|(task, _)| *task)
            .collect()
    }
}

/// File watcher for detecting source changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` and deliver debounced per-task batches.
    ///
    /// Returns the watcher and a channel to receive events; dropping the
    /// watcher stops delivery.
    pub fn new(
        paths: &[PathBuf],
        routes: TaskRoutes,
        delay: Duration,
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
                tracing::debug!("Watching {}", path.display());
            } else {
                tracing::debug!("Not watching missing {}", path.display());
            }
        }

        std::thread::spawn(move || {
            let mut debouncer = Debouncer::new(delay);

            loop {
                let received = match debouncer.next_deadline() {
                    Some(deadline) => {
                        let timeout = deadline.saturating_duration_since(Instant::now());
                        match sync_rx.recv_timeout(timeout) {
                            Ok(event) => Some(event),
                            Err(mpsc::RecvTimeoutError::Timeout) => None,
                            Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    None => match sync_rx.recv() {
                        Ok(event) => Some(event),
                        Err(_) => break,
                    },
                };

                let now = Instant::now();
                if let Some(event) = received {
                    if is_change(&event.kind) {
                        for path in event.paths {
                            for task in routes.classify(&path) {
                                debouncer.push(task, path.clone(), now);
                            }
                        }
                    }
                }

                for batch in debouncer.drain_due(now) {
                    if async_tx.blocking_send(batch).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
