//! Modification events and the observer capability.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::diff::DiffLine;

/// Immutable record of one observed change to a watched file.
///
/// Equality and hashing are value-based over all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileModificationEvent {
    /// Absolute path of the affected file.
    pub file: PathBuf,
    /// The file's modification time, or the wall-clock instant the event
    /// was built when the file no longer exists.
    pub file_time: SystemTime,
    /// Line-level diff against the file's last known content.
    pub diff: Vec<DiffLine>,
}

impl FileModificationEvent {
    /// Builds an event for `file` carrying `diff`, stamped with the file's
    /// current modification time when available.
    pub(crate) fn capture(file: &Path, diff: Vec<DiffLine>) -> Self {
        let file_time = std::fs::metadata(file)
            .and_then(|meta| meta.modified())
            .unwrap_or_else(|_| SystemTime::now());
        Self {
            file: file.to_path_buf(),
            file_time,
            diff,
        }
    }

    /// Renders the diff as one newline-joined block.
    pub fn diff_text(&self) -> String {
        self.diff
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Capability to receive modification events.
///
/// Dispatch is synchronous on the notifier's drain thread, so
/// implementations are expected to return promptly. An observer must not
/// call back into the notifier from its callback; registration calls made
/// there deadlock against the drain lock. A panicking observer is caught,
/// logged at warning level, and otherwise ignored.
pub trait ModificationObserver: Send + Sync {
    /// Accepts one event.
    fn on_modification(&self, event: &FileModificationEvent);
}

impl<F> ModificationObserver for F
where
    F: Fn(&FileModificationEvent) + Send + Sync,
{
    fn on_modification(&self, event: &FileModificationEvent) {
        self(event)
    }
}
