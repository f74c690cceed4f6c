//! The notifier façade: watch-service lifecycle, the directory-watch
//! table, and the background drain loop.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::directory_watch::{ChangeKind, DirectoryWatch};
use crate::error::WatchError;
use crate::event::ModificationObserver;
use crate::shadow::Shadow;

/// The platform watcher plus the drain thread consuming its events.
/// Presence of this value in [`NotifierState`] is the *running* predicate.
struct WatchService {
    watcher: RecommendedWatcher,
    drain: JoinHandle<()>,
}

#[derive(Default)]
struct NotifierState {
    /// Parent directory of at least one observed file -> its bookkeeping.
    watches: HashMap<PathBuf, DirectoryWatch>,
    service: Option<WatchService>,
}

/// Watches a designated set of regular files beneath a root directory and
/// delivers modification events with line-level diffs to registered
/// observers.
///
/// The notifier is created stopped. It starts implicitly on the first
/// observer registration and stops implicitly when the last observer is
/// removed, or explicitly via [`stop`](Self::stop); stopping deletes the
/// shadow tree. Files need not exist at registration time: the parent
/// directory is watched, so later creation is observed.
///
/// Paths are compared lexically (`.`/`..` are squashed, symlinks are not
/// resolved); callers who watch through symlinked locations should pass
/// canonicalized roots and files.
///
/// On platforms where `notify` falls back to polling, detection latency
/// is bounded by the poll interval; no tunable is exposed for it.
///
/// All methods take `&self`; registration calls, the drain thread, and
/// lifecycle transitions serialize on one internal lock.
pub struct FileModificationNotifier {
    shadow: Shadow,
    state: Arc<Mutex<NotifierState>>,
}

impl FileModificationNotifier {
    /// Creates a stopped notifier for `root`, creating `shadow_root` if it
    /// does not exist yet.
    pub fn new(root: impl Into<PathBuf>, shadow_root: impl Into<PathBuf>) -> Result<Self, WatchError> {
        let root = normalize(&root.into());
        let shadow_root = normalize(&shadow_root.into());
        fs::create_dir_all(&shadow_root).map_err(|e| WatchError::io(&shadow_root, &e))?;
        Ok(Self {
            shadow: Shadow::new(root, shadow_root),
            state: Arc::new(Mutex::new(NotifierState::default())),
        })
    }

    /// The directory beneath which all watched files must live.
    pub fn root(&self) -> &Path {
        self.shadow.root()
    }

    /// The mirror directory holding last-seen file contents.
    pub fn shadow_root(&self) -> &Path {
        self.shadow.shadow_root()
    }

    /// Registers `observer` for `path` (absolute or root-relative).
    ///
    /// Starts the watch service if it is not running. The file's parent
    /// directory is created on disk when absent, so a not-yet-existing
    /// file can be watched. If the file exists and has no shadow yet, the
    /// shadow is seeded from its current content.
    pub fn add_observer(
        &self,
        path: impl AsRef<Path>,
        observer: Arc<dyn ModificationObserver>,
    ) -> Result<(), WatchError> {
        let file = self.resolve(path.as_ref())?;
        let Some(parent) = file.parent().map(Path::to_path_buf) else {
            return Err(WatchError::OutsideRoot {
                path: file.display().to_string(),
                root: self.root().display().to_string(),
            });
        };
        if !parent.starts_with(self.root()) {
            return Err(WatchError::OutsideRoot {
                path: file.display().to_string(),
                root: self.root().display().to_string(),
            });
        }

        let result = self.register(&file, &parent, observer);
        if result.is_err() {
            // Best-effort rollback so a failed registration leaves neither
            // an orphaned shadow nor an idle watch service behind.
            if let Err(e) = self.shadow.purge(&file) {
                log::warn!("Watcher: failed to delete shadow of {}: {}", file.display(), e);
            }
            if let Err(e) = self.shutdown(true) {
                log::warn!("Watcher: failed to stop after failed registration: {}", e);
            }
        }
        result
    }

    fn register(
        &self,
        file: &Path,
        parent: &Path,
        observer: Arc<dyn ModificationObserver>,
    ) -> Result<(), WatchError> {
        let mut state = lock_state(&self.state);
        fs::create_dir_all(parent).map_err(|e| WatchError::io(parent, &e))?;
        self.shadow.seed(file).map_err(|e| WatchError::io(file, &e))?;
        if state.service.is_none() {
            state.service = Some(self.start_service()?);
        }
        if !state.watches.contains_key(parent) {
            if let Some(service) = state.service.as_mut() {
                service
                    .watcher
                    .watch(parent, RecursiveMode::NonRecursive)
                    .map_err(|e| WatchError::Io {
                        path: parent.display().to_string(),
                        message: e.to_string(),
                    })?;
            }
            state.watches.insert(
                parent.to_path_buf(),
                DirectoryWatch::new(parent.to_path_buf(), self.shadow.clone()),
            );
        }
        if let Some(watch) = state.watches.get_mut(parent) {
            watch.add_observer(file.to_path_buf(), observer);
        }
        Ok(())
    }

    /// Unregisters `observer` from `path`. Unknown paths and observers are
    /// a no-op. When the file loses its last observer its shadow is
    /// deleted; when the whole table empties, the watch service stops and
    /// the shadow tree is removed.
    pub fn remove_observer(
        &self,
        path: impl AsRef<Path>,
        observer: &Arc<dyn ModificationObserver>,
    ) -> Result<(), WatchError> {
        let file = self.resolve(path.as_ref())?;
        let Some(parent) = file.parent().map(Path::to_path_buf) else {
            return Ok(());
        };

        let table_emptied = {
            let mut state = lock_state(&self.state);
            let Some(watch) = state.watches.get_mut(&parent) else {
                return Ok(());
            };
            let mapping_emptied = watch.remove_observer(&file, observer);
            let file_released = !watch.watches_file(&file);
            if mapping_emptied {
                if let Some(service) = state.service.as_mut()
                    && let Err(e) = service.watcher.unwatch(&parent)
                {
                    log::warn!("Watcher: failed to cancel watch on {}: {}", parent.display(), e);
                }
                state.watches.remove(&parent);
            }
            if file_released
                && let Err(e) = self.shadow.purge(&file)
            {
                log::warn!("Watcher: failed to delete shadow of {}: {}", file.display(), e);
            }
            state.watches.is_empty() && state.service.is_some()
        };
        if table_emptied
            && let Err(e) = self.shutdown(true)
        {
            // Implicit stop is resource release: best-effort, never
            // surfaced to the remover.
            log::warn!("Watcher: failed to stop after last observer removed: {}", e);
        }
        Ok(())
    }

    /// Stops the watch service and deletes the shadow tree. No-op when not
    /// running.
    pub fn stop(&self) -> Result<(), WatchError> {
        self.shutdown(false)
    }

    /// Whether the watch service is live.
    pub fn is_running(&self) -> bool {
        lock_state(&self.state).service.is_some()
    }

    /// Snapshot of every file that currently has at least one observer,
    /// sorted for deterministic output.
    pub fn watched_files(&self) -> Vec<PathBuf> {
        let state = lock_state(&self.state);
        let mut files: Vec<PathBuf> = state
            .watches
            .values()
            .flat_map(|watch| watch.files().map(Path::to_path_buf))
            .collect();
        files.sort();
        files
    }

    /// Resolves a caller-supplied path against the root and rejects
    /// directories. Containment is checked by the caller where required.
    fn resolve(&self, path: &Path) -> Result<PathBuf, WatchError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().join(path)
        };
        let file = normalize(&absolute);
        if file.is_dir() {
            return Err(WatchError::NotAFile {
                path: file.display().to_string(),
            });
        }
        Ok(file)
    }

    fn start_service(&self) -> Result<WatchService, WatchError> {
        let (tx, rx) = mpsc::channel();
        let watcher = notify::recommended_watcher(move |outcome: notify::Result<notify::Event>| {
            let _ = tx.send(outcome);
        })
        .map_err(|e| WatchError::WatchUnsupported { message: e.to_string() })?;

        let state = Arc::clone(&self.state);
        let drain = thread::Builder::new()
            .name("modwatch-drain".to_string())
            .spawn(move || drain_loop(&state, &rx))
            .map_err(|e| WatchError::WatchUnsupported {
                message: format!("failed to spawn drain thread: {}", e),
            })?;
        log::info!("Watcher: watch service started for {}", self.root().display());
        Ok(WatchService { watcher, drain })
    }

    /// Tears the service down. With `only_if_idle`, bails out unless the
    /// directory table is empty; re-checked under the lock because a
    /// concurrent registration may have repopulated the table since the
    /// caller observed it empty.
    fn shutdown(&self, only_if_idle: bool) -> Result<(), WatchError> {
        let service = {
            let mut state = lock_state(&self.state);
            if only_if_idle && !state.watches.is_empty() {
                return Ok(());
            }
            state.watches.clear();
            state.service.take()
        };
        let Some(service) = service else {
            return Ok(());
        };
        // Dropping the watcher disconnects the event channel; the drain
        // thread observes the hangup and exits.
        let WatchService { watcher, drain } = service;
        drop(watcher);
        let _ = drain.join();
        log::info!("Watcher: watch service stopped for {}", self.root().display());
        self.shadow
            .purge_all()
            .map_err(|e| WatchError::io(self.shadow.shadow_root(), &e))?;
        Ok(())
    }
}

impl Drop for FileModificationNotifier {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Watcher: failed to stop cleanly on drop: {}", e);
        }
    }
}

/// Locks the notifier state, ignoring poison. The state is plain
/// bookkeeping, and observer panics are contained before the guard
/// unwinds, so a poisoned lock carries no signal here.
fn lock_state(state: &Mutex<NotifierState>) -> MutexGuard<'_, NotifierState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Background loop: consumes raw notifications until the watcher is
/// dropped and the channel disconnects.
fn drain_loop(state: &Mutex<NotifierState>, rx: &Receiver<notify::Result<notify::Event>>) {
    while let Ok(outcome) = rx.recv() {
        match outcome {
            Ok(event) => handle_raw_event(state, &event),
            Err(e) => log::warn!("Watcher: backend error: {}", e),
        }
    }
    log::info!("Watcher: watch service closed, drain loop exiting");
}

/// Routes one raw notification to the directory watches of the reported
/// paths. Per-file failures are logged and never abort sibling handling.
fn handle_raw_event(state: &Mutex<NotifierState>, event: &notify::Event) {
    let Some(kind) = change_kind(&event.kind) else {
        log::debug!("Watcher: ignoring {:?} notification", event.kind);
        return;
    };
    for path in &event.paths {
        let Some(parent) = path.parent() else {
            continue;
        };
        let state = lock_state(state);
        let Some(watch) = state.watches.get(parent) else {
            continue;
        };
        if let Err(e) = watch.handle_change(kind, path) {
            log::warn!(
                "Watcher: failed to handle {:?} notification for {}: {}",
                kind,
                path.display(),
                e
            );
        }
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Create),
        EventKind::Modify(_) => Some(ChangeKind::Modify),
        EventKind::Remove(_) => Some(ChangeKind::Delete),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// Squashes `.` and `..` components without touching the filesystem.
/// Symlink resolution is the caller's responsibility.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                normalized.push(component.as_os_str());
            }
        }
    }
    normalized
}
