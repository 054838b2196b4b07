//! File watching for served directories.
//!
//! Turns raw `notify` events into debounced [`FileChange`]s whose paths are
//! relative to the served directory they belong to, ready to be passed to
//! [`DevServer::reload`](crate::DevServer::reload).

mod debouncer;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

pub use debouncer::ChangeKind;
use debouncer::Debouncer;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// A debounced change to a served file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChange {
    /// Path relative to its served directory, `/`-separated.
    pub path: String,
    /// What happened to the file.
    pub kind: ChangeKind,
}

impl FileChange {
    /// File to pass to `reload`.
    ///
    /// A removed file can't be reloaded in place, so removals ask for a
    /// whole-page reload.
    #[must_use]
    pub fn reload_target(&self) -> Option<&str> {
        match self.kind {
            ChangeKind::Removed => None,
            ChangeKind::Created | ChangeKind::Modified => Some(&self.path),
        }
    }
}

/// Watches served directories for changes.
pub struct DirWatcher {
    dirs: Vec<PathBuf>,
    patterns: Vec<glob::Pattern>,
    debounce: Duration,
}

/// Running watcher. Dropping it stops watching.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    changes: mpsc::Receiver<FileChange>,
}

impl WatchHandle {
    /// Wait for the next debounced change.
    pub async fn next(&mut self) -> Option<FileChange> {
        self.changes.recv().await
    }
}

impl DirWatcher {
    /// Create a watcher for `dirs`.
    ///
    /// `patterns` are globs matched against paths relative to the served
    /// directory; `None` watches every file. Invalid patterns are skipped.
    #[must_use]
    pub fn new(dirs: &[PathBuf], patterns: Option<&[String]>) -> Self {
        let patterns = patterns
            .unwrap_or(&["**/*".to_owned()])
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    tracing::warn!(pattern = %p, error = %err, "Ignoring invalid watch pattern");
                    None
                }
            })
            .collect();

        Self {
            dirs: dirs
                .iter()
                .map(|dir| dir.canonicalize().unwrap_or_else(|_| dir.clone()))
                .collect(),
            patterns,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching.
    ///
    /// Spawns a task that debounces raw events and forwards changes to the
    /// returned handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be created or a directory
    /// cannot be watched.
    pub fn start(self) -> Result<WatchHandle, notify::Error> {
        let (raw_tx, mut raw_rx) = mpsc::channel::<Event>(100);
        let (change_tx, change_rx) = mpsc::channel::<FileChange>(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                // The callback runs on notify's own thread.
                Ok(event) => {
                    let _ = raw_tx.blocking_send(event);
                }
                Err(err) => tracing::warn!(error = %err, "File watcher error"),
            }
        })?;

        for dir in &self.dirs {
            watcher.watch(dir, RecursiveMode::Recursive)?;
            tracing::debug!(dir = %dir.display(), "Watching directory");
        }

        tokio::spawn(async move {
            let mut debouncer = Debouncer::new(self.debounce);

            loop {
                let deadline = debouncer.next_deadline();
                tokio::select! {
                    event = raw_rx.recv() => {
                        let Some(event) = event else { break };
                        self.record(&event, &mut debouncer);
                    }
                    () = sleep_until(deadline), if deadline.is_some() => {
                        for (path, kind) in debouncer.drain_ready(Instant::now()) {
                            let Some(change) = self.to_change(&path, kind) else {
                                continue;
                            };
                            tracing::debug!(path = %change.path, ?kind, "File changed");
                            if change_tx.send(change).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(WatchHandle {
            _watcher: watcher,
            changes: change_rx,
        })
    }

    /// Feed one raw event into the debouncer.
    fn record(&self, event: &Event, debouncer: &mut Debouncer) {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Removed,
            _ => return,
        };

        let now = Instant::now();
        for path in &event.paths {
            if self.relative_path(path).is_some() {
                debouncer.record(path.clone(), kind, now);
            }
        }
    }

    /// Convert a debounced path into a [`FileChange`].
    fn to_change(&self, path: &Path, kind: ChangeKind) -> Option<FileChange> {
        let relative = self.relative_path(path)?;
        Some(FileChange {
            path: relative,
            kind,
        })
    }

    /// Path relative to the first served dir containing it, if it matches
    /// the watch patterns.
    fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = self
            .dirs
            .iter()
            .find_map(|dir| path.strip_prefix(dir).ok())?;

        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if relative.is_empty() {
            return None;
        }

        self.patterns
            .iter()
            .any(|pattern| pattern.matches(&relative))
            .then_some(relative)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline.into()).await;
    }
}
