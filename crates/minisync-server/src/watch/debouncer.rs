//! Change debouncing.
//!
//! Editors often emit several events per save (truncate, write, chmod,
//! rename). The debouncer folds them into one change per path once the path
//! has been quiet for the debounce window.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    /// Fold a newer change into an older pending one.
    ///
    /// Returns `None` when the two cancel out (created, then removed again
    /// before anyone saw it).
    fn then(self, newer: Self) -> Option<Self> {
        use ChangeKind::{Created, Modified, Removed};

        match (self, newer) {
            (Created, Removed) => None,
            (Created, _) | (Modified, Created) => Some(Created),
            (Modified, Modified) => Some(Modified),
            (Modified | Removed, Removed) | (Removed, Modified) => Some(Removed),
            (Removed, Created) => Some(Modified),
        }
    }
}

struct Pending {
    kind: ChangeKind,
    deadline: Instant,
}

/// Per-path change coalescing with a quiet-period deadline.
///
/// Owned by a single task, so it needs no locking.
pub(crate) struct Debouncer {
    pending: HashMap<PathBuf, Pending>,
    window: Duration,
}

impl Debouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Record a change observed at `now`.
    pub(crate) fn record(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        let deadline = now + self.window;

        match self.pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(Pending { kind, deadline });
            }
            Entry::Occupied(mut entry) => match entry.get().kind.then(kind) {
                Some(folded) => {
                    let pending = entry.get_mut();
                    pending.kind = folded;
                    pending.deadline = deadline;
                }
                None => {
                    entry.remove();
                }
            },
        }
    }

    /// Remove and return every change whose deadline has passed at `now`.
    pub(crate) fn drain_ready(&mut self, now: Instant) -> Vec<(PathBuf, ChangeKind)> {
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|path| {
                let pending = self.pending.remove(&path)?;
                Some((path, pending.kind))
            })
            .collect()
    }

    /// Earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChangeKind::{Created, Modified, Removed};

    const WINDOW: Duration = Duration::from_millis(100);

    fn path(name: &str) -> PathBuf {
        PathBuf::from(format!("/site/{name}"))
    }

    #[test]
    fn test_change_waits_for_quiet_period() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.record(path("app.css"), Modified, start);

        assert!(debouncer.drain_ready(start).is_empty());
        assert_eq!(
            debouncer.drain_ready(start + WINDOW),
            vec![(path("app.css"), Modified)]
        );
        assert!(debouncer.drain_ready(start + WINDOW * 2).is_empty());
    }

    #[test]
    fn test_new_event_extends_deadline() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.record(path("app.css"), Modified, start);
        debouncer.record(path("app.css"), Modified, start + WINDOW / 2);

        assert!(debouncer.drain_ready(start + WINDOW).is_empty());
        assert_eq!(debouncer.drain_ready(start + WINDOW * 2).len(), 1);
    }

    #[test]
    fn test_create_then_remove_cancels() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.record(path("tmp.swp"), Created, start);
        debouncer.record(path("tmp.swp"), Removed, start);

        assert!(debouncer.next_deadline().is_none());
        assert!(debouncer.drain_ready(start + WINDOW).is_empty());
    }

    #[test]
    fn test_atomic_save_becomes_modified() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        // write-to-temp-and-rename shows up as remove + create
        debouncer.record(path("index.html"), Removed, start);
        debouncer.record(path("index.html"), Created, start);

        assert_eq!(
            debouncer.drain_ready(start + WINDOW),
            vec![(path("index.html"), Modified)]
        );
    }

    #[test]
    fn test_paths_are_independent() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.record(path("a.css"), Modified, start);
        debouncer.record(path("b.png"), Created, start + WINDOW);

        assert_eq!(
            debouncer.next_deadline(),
            Some(start + WINDOW)
        );
        assert_eq!(
            debouncer.drain_ready(start + WINDOW),
            vec![(path("a.css"), Modified)]
        );
        assert_eq!(debouncer.next_deadline(), Some(start + WINDOW * 2));
    }

    #[test]
    fn test_fold_matrix() {
        assert_eq!(Created.then(Created), Some(Created));
        assert_eq!(Created.then(Modified), Some(Created));
        assert_eq!(Created.then(Removed), None);

        assert_eq!(Modified.then(Created), Some(Created));
        assert_eq!(Modified.then(Modified), Some(Modified));
        assert_eq!(Modified.then(Removed), Some(Removed));

        assert_eq!(Removed.then(Created), Some(Modified));
        assert_eq!(Removed.then(Modified), Some(Removed));
        assert_eq!(Removed.then(Removed), Some(Removed));
    }
}
