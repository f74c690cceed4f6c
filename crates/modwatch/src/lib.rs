// Deny unused code to catch dead code early
#![deny(unused)]
// Warn on redundant path prefixes (e.g., std::path::Path when Path is imported)
#![warn(unused_qualifications)]

//! Watches a designated set of regular files beneath a root directory and
//! delivers structured modification events — affected path, timestamp, and
//! a line-level diff against the file's last known content — to registered
//! observers.
//!
//! The platform watch facility (via the `notify` crate) is
//! directory-granular, so the notifier keeps one native watch per parent
//! directory and filters reported entry names down to the registered
//! files. A mirror tree (the shadow repository) retains each watched
//! file's last-seen content: it feeds diff generation and absorbs
//! spurious notifications whose content is unchanged.
//!
//! ```no_run
//! use std::sync::Arc;
//! use modwatch::{FileModificationEvent, FileModificationNotifier};
//!
//! let notifier = FileModificationNotifier::new("/watch", "/tmp/watch-shadow")?;
//! notifier.add_observer(
//!     "config.toml",
//!     Arc::new(|event: &FileModificationEvent| {
//!         println!("{}\n{}", event.file.display(), event.diff_text());
//!     }),
//! )?;
//! # Ok::<(), modwatch::WatchError>(())
//! ```

pub mod diff;
mod directory_watch;
mod error;
mod event;
mod notifier;
mod shadow;

pub use diff::{DiffLine, diff_files, diff_lines, identical};
pub use error::WatchError;
pub use event::{FileModificationEvent, ModificationObserver};
pub use notifier::FileModificationNotifier;

#[cfg(test)]
mod notifier_integration_test;
