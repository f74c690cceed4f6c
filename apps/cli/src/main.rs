//! Command-line front-end for the modwatch library.
//!
//! Usage: `modwatch ROOT FILE...` — watches the given files (absolute or
//! ROOT-relative) and prints each modification event as a timestamped
//! block: local time, path, then the newline-joined diff.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::mpsc;

use chrono::{DateTime, Local};
use modwatch::{FileModificationEvent, FileModificationNotifier, ModificationObserver};

struct ConsoleObserver;

impl ModificationObserver for ConsoleObserver {
    fn on_modification(&self, event: &FileModificationEvent) {
        let timestamp: DateTime<Local> = event.file_time.into();
        println!(
            "{} {}\n{}",
            timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            event.file.display(),
            event.diff_text()
        );
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut args = env::args().skip(1);
    let Some(root_arg) = args.next() else { usage() };
    let files: Vec<String> = args.collect();
    if files.is_empty() {
        usage();
    }

    // Resolve symlinks up front; the notifier compares paths lexically.
    let root = match fs::canonicalize(&root_arg) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("modwatch: cannot access root {}: {}", root_arg, e);
            process::exit(1);
        }
    };

    let notifier = match FileModificationNotifier::new(&root, shadow_dir()) {
        Ok(notifier) => notifier,
        Err(e) => {
            eprintln!("modwatch: {}", e);
            process::exit(1);
        }
    };

    let observer: Arc<dyn ModificationObserver> = Arc::new(ConsoleObserver);
    for file in &files {
        if let Err(e) = notifier.add_observer(file, Arc::clone(&observer)) {
            eprintln!("modwatch: cannot watch {}: {}", file, e);
            process::exit(1);
        }
    }
    log::info!("Watching {} file(s) under {}", files.len(), root.display());

    // Park until Ctrl-C, then stop the notifier so the shadow tree and
    // native watches are released.
    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    }) {
        eprintln!("modwatch: cannot install shutdown handler: {}", e);
        process::exit(1);
    }
    let _ = shutdown_rx.recv();

    if let Err(e) = notifier.stop() {
        eprintln!("modwatch: shutdown error: {}", e);
        process::exit(1);
    }
}

fn usage() -> ! {
    eprintln!("Usage: modwatch ROOT FILE...");
    process::exit(1);
}

/// Shadow location: `MODWATCH_SHADOW_DIR` when set, else a per-process
/// directory under the system temp dir.
fn shadow_dir() -> PathBuf {
    match env::var_os("MODWATCH_SHADOW_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => env::temp_dir().join(format!("modwatch-shadow-{}", process::id())),
    }
}
