//! Error types for registration and lifecycle operations.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors surfaced by registration and lifecycle calls on the notifier.
///
/// Failures inside the drain loop are never surfaced here; they are logged
/// at warning level and processing continues with the next notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum WatchError {
    /// The registered path is a directory; only regular files can be watched.
    NotAFile { path: String },
    /// The registered path does not live beneath the notifier's root.
    OutsideRoot { path: String, root: String },
    /// The platform watch backend could not be created.
    WatchUnsupported { message: String },
    /// A filesystem operation failed during construction, registration, or stop.
    Io { path: String, message: String },
}

impl WatchError {
    pub(crate) fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAFile { path } => {
                write!(f, "{} is a directory; only regular files can be watched", path)
            }
            Self::OutsideRoot { path, root } => {
                write!(f, "{} is outside the watch root {}", path, root)
            }
            Self::WatchUnsupported { message } => {
                write!(f, "Platform watch backend unavailable: {}", message)
            }
            Self::Io { path, message } => write!(f, "I/O error on {}: {}", path, message),
        }
    }
}

impl std::error::Error for WatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_path() {
        let error = WatchError::NotAFile {
            path: "/watch/docs".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "/watch/docs is a directory; only regular files can be watched"
        );

        let error = WatchError::OutsideRoot {
            path: "/elsewhere/x.txt".to_string(),
            root: "/watch".to_string(),
        };
        assert_eq!(error.to_string(), "/elsewhere/x.txt is outside the watch root /watch");
    }
}
