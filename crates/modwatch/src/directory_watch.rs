//! Per-directory observer bookkeeping and notification handling.
//!
//! Platform watch facilities are directory-granular: one native
//! registration per parent directory, reporting entry names. Each
//! [`DirectoryWatch`] recovers file granularity by filtering reported
//! entries against its observer map.

use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::diff;
use crate::event::{FileModificationEvent, ModificationObserver};
use crate::shadow::Shadow;

/// Raw change kinds the notifier reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Create,
    Modify,
    Delete,
}

/// Bookkeeping for one watched directory: the observer sets of its files
/// and the notification handling for entries beneath it.
///
/// The native registration for the directory is owned by the notifier;
/// when [`remove_observer`](Self::remove_observer) reports an empty
/// mapping, the notifier cancels the registration and drops this value.
/// The shadow context is passed in by value at construction; there is no
/// back-reference to the notifier.
pub(crate) struct DirectoryWatch {
    directory: PathBuf,
    shadow: Shadow,
    observers: HashMap<PathBuf, Vec<Arc<dyn ModificationObserver>>>,
}

impl DirectoryWatch {
    pub(crate) fn new(directory: PathBuf, shadow: Shadow) -> Self {
        Self {
            directory,
            shadow,
            observers: HashMap::new(),
        }
    }

    /// Adds `observer` to `file`'s set. Adding the same `Arc` twice is a
    /// no-op; identity is pointer identity, not closure equality.
    pub(crate) fn add_observer(&mut self, file: PathBuf, observer: Arc<dyn ModificationObserver>) {
        let set = self.observers.entry(file).or_default();
        if !set.iter().any(|existing| Arc::ptr_eq(existing, &observer)) {
            set.push(observer);
        }
    }

    /// Removes `observer` from `file`'s set, dropping the file entry when
    /// its set empties. Returns whether the whole mapping is now empty.
    pub(crate) fn remove_observer(&mut self, file: &Path, observer: &Arc<dyn ModificationObserver>) -> bool {
        if let Some(set) = self.observers.get_mut(file) {
            set.retain(|existing| !Arc::ptr_eq(existing, observer));
            if set.is_empty() {
                self.observers.remove(file);
            }
        }
        self.observers.is_empty()
    }

    /// Whether `file` currently has at least one observer here.
    pub(crate) fn watches_file(&self, file: &Path) -> bool {
        self.observers.contains_key(file)
    }

    /// Files with at least one observer in this directory.
    pub(crate) fn files(&self) -> impl Iterator<Item = &Path> {
        self.observers.keys().map(PathBuf::as_path)
    }

    /// Handles one raw notification for `file`.
    ///
    /// Entries without observers are skipped. When the file's content
    /// differs from its shadow, an event carrying the line diff is
    /// dispatched synchronously to every observer of the file, then the
    /// shadow is brought up to date: copied for creations and
    /// modifications, deleted for deletions. A content-identical
    /// notification (metadata touch, spurious wakeup) dispatches nothing.
    pub(crate) fn handle_change(&self, kind: ChangeKind, file: &Path) -> io::Result<()> {
        let Some(observers) = self.observers.get(file) else {
            return Ok(());
        };
        let shadow_path = self.shadow.shadow_path(file);
        if diff::identical(file, &shadow_path)? {
            log::debug!(
                "Watcher: content unchanged for {} in {}, suppressing event",
                file.display(),
                self.directory.display()
            );
        } else {
            let event = FileModificationEvent::capture(file, diff::diff_files(&shadow_path, file)?);
            for observer in observers {
                dispatch(observer.as_ref(), &event);
            }
        }
        match kind {
            ChangeKind::Create | ChangeKind::Modify => self.shadow.refresh(file),
            ChangeKind::Delete => self.shadow.purge(file),
        }
    }
}

/// Invokes one observer; a panic is caught and logged so it cannot starve
/// sibling observers or the drain loop.
fn dispatch(observer: &dyn ModificationObserver, event: &FileModificationEvent) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_modification(event)));
    if outcome.is_err() {
        log::warn!("Watcher: observer panicked while handling {}", event.file.display());
    }
}
