//! Shadow repository: mirrored last-known contents of watched files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;

/// Locations of the watch root and its mirror tree.
///
/// The shadow of `root/x/y.txt` is `shadow_root/x/y.txt`; parent
/// directories in the mirror are created on demand. A shadow holds the
/// content its file had at the last delivered event (or at registration),
/// which both feeds diff generation and filters notifications that did
/// not change content.
#[derive(Debug, Clone)]
pub(crate) struct Shadow {
    root: PathBuf,
    shadow_root: PathBuf,
}

impl Shadow {
    pub(crate) fn new(root: PathBuf, shadow_root: PathBuf) -> Self {
        Self { root, shadow_root }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn shadow_root(&self) -> &Path {
        &self.shadow_root
    }

    /// Maps a watched file to its mirror path.
    ///
    /// Registration validates containment beneath the root; a path that
    /// slips past that degrades to its file name so it cannot land outside
    /// the mirror tree.
    pub(crate) fn shadow_path(&self, file: &Path) -> PathBuf {
        match file.strip_prefix(&self.root) {
            Ok(relative) => self.shadow_root.join(relative),
            Err(_) => self.shadow_root.join(file.file_name().unwrap_or_default()),
        }
    }

    /// Copies `file` to its shadow if the file exists and no shadow does.
    pub(crate) fn seed(&self, file: &Path) -> io::Result<()> {
        if file.exists() && !self.shadow_path(file).exists() {
            self.refresh(file)?;
        }
        Ok(())
    }

    /// Replaces the shadow with the file's current contents, preserving
    /// the source modification time exactly.
    pub(crate) fn refresh(&self, file: &Path) -> io::Result<()> {
        let shadow = self.shadow_path(file);
        if let Some(parent) = shadow.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(file, &shadow)?;
        let metadata = fs::metadata(file)?;
        let mtime = FileTime::from_last_modification_time(&metadata);
        filetime::set_file_mtime(&shadow, mtime)?;
        Ok(())
    }

    /// Deletes the shadow of `file` if one exists.
    pub(crate) fn purge(&self, file: &Path) -> io::Result<()> {
        match fs::remove_file(self.shadow_path(file)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Recursively deletes the whole mirror tree.
    pub(crate) fn purge_all(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.shadow_root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
