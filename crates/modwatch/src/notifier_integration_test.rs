//! End-to-end scenarios driving a real platform watcher.
//!
//! These tests exercise the full pipeline: registration seeds the shadow,
//! the platform watcher reports raw changes, the drain loop diffs against
//! the shadow and dispatches events. Timing-dependent assertions use a
//! generous receive timeout; "nothing happens" assertions wait out a short
//! quiet period.

use std::fs;
use std::sync::Arc;
use std::sync::mpsc::{Sender, channel};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use filetime::FileTime;

use crate::diff::DiffLine;
use crate::event::{FileModificationEvent, ModificationObserver};
use crate::notifier::FileModificationNotifier;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);
const QUIET_PERIOD: Duration = Duration::from_millis(1500);

struct ChannelObserver(Sender<FileModificationEvent>);

impl ModificationObserver for ChannelObserver {
    fn on_modification(&self, event: &FileModificationEvent) {
        let _ = self.0.send(event.clone());
    }
}

fn watch_setup() -> (tempfile::TempDir, FileModificationNotifier) {
    let dir = tempfile::tempdir().unwrap();
    // Canonicalize so reported event paths match the registered ones even
    // when the temp dir sits behind a symlink.
    let base = dir.path().canonicalize().unwrap();
    let root = base.join("root");
    fs::create_dir_all(&root).unwrap();
    let notifier = FileModificationNotifier::new(&root, base.join("shadow")).unwrap();
    (dir, notifier)
}

/// Replaces the named file's content atomically via a staged sibling, so
/// the watcher observes a single content transition.
fn overwrite(notifier: &FileModificationNotifier, name: &str, content: &str) {
    let staged = notifier.root().join(format!(".{}.staged", name));
    fs::write(&staged, content).unwrap();
    fs::rename(&staged, notifier.root().join(name)).unwrap();
}

/// Shadow updates land after observer dispatch on the drain thread; poll
/// instead of asserting the filesystem state immediately.
fn wait_for(description: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", description);
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn modification_is_delivered_with_a_line_diff() {
    let (_guard, notifier) = watch_setup();
    let file = notifier.root().join("a.txt");
    fs::write(&file, "some content").unwrap();

    let (tx, rx) = channel();
    notifier.add_observer(&file, Arc::new(ChannelObserver(tx))).unwrap();

    // Registration seeds the shadow synchronously: byte-equal, same mtime.
    let shadow_file = notifier.shadow_root().join("a.txt");
    assert_eq!(fs::read(&shadow_file).unwrap(), b"some content");
    assert_eq!(
        fs::metadata(&shadow_file).unwrap().modified().unwrap(),
        fs::metadata(&file).unwrap().modified().unwrap()
    );

    overwrite(&notifier, "a.txt", "some new text 1700000000000");

    let event = rx.recv_timeout(EVENT_TIMEOUT).expect("no modification event");
    assert_eq!(event.file, file);
    assert_eq!(
        event.diff,
        vec![
            DiffLine::Removed("some content".to_string()),
            DiffLine::Added("some new text 1700000000000".to_string()),
        ]
    );
    assert!(rx.recv_timeout(QUIET_PERIOD).is_err(), "expected a single event");
}

#[test]
fn deletion_is_delivered_and_clears_the_shadow() {
    let (_guard, notifier) = watch_setup();
    let file = notifier.root().join("a.txt");
    fs::write(&file, "hello").unwrap();
    filetime::set_file_mtime(&file, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    let registered_at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

    let (tx, rx) = channel();
    let observer: Arc<dyn ModificationObserver> = Arc::new(ChannelObserver(tx));
    notifier.add_observer(&file, observer.clone()).unwrap();

    let shadow_file = notifier.shadow_root().join("a.txt");
    assert_eq!(
        fs::metadata(&shadow_file).unwrap().modified().unwrap(),
        registered_at
    );

    fs::remove_file(&file).unwrap();

    let event = rx.recv_timeout(EVENT_TIMEOUT).expect("no deletion event");
    assert_eq!(event.file, file);
    assert_eq!(event.diff, vec![DiffLine::Removed("hello".to_string())]);
    assert!(event.file_time > registered_at);
    wait_for("shadow purge", || !shadow_file.exists());

    notifier.remove_observer(&file, &observer).unwrap();
    assert!(!notifier.is_running());
}

#[test]
fn creation_of_a_registered_file_is_delivered() {
    let (_guard, notifier) = watch_setup();
    let file = notifier.root().join("b.txt");

    let (tx, rx) = channel();
    let observer: Arc<dyn ModificationObserver> = Arc::new(ChannelObserver(tx));
    notifier.add_observer(&file, observer.clone()).unwrap();
    assert!(!notifier.shadow_root().join("b.txt").exists());

    overwrite(&notifier, "b.txt", "newly created");

    let event = rx.recv_timeout(EVENT_TIMEOUT).expect("no creation event");
    assert_eq!(event.file, file);
    assert_eq!(event.diff, vec![DiffLine::Added("newly created".to_string())]);
    assert_eq!(event.file_time, fs::metadata(&file).unwrap().modified().unwrap());
    let shadow_file = notifier.shadow_root().join("b.txt");
    wait_for("shadow seed", || shadow_file.exists());
    assert_eq!(fs::read(&shadow_file).unwrap(), b"newly created");

    notifier.remove_observer(&file, &observer).unwrap();
    assert!(!notifier.is_running());
    assert!(!notifier.shadow_root().exists());
}

#[test]
fn metadata_only_touches_are_suppressed() {
    let (_guard, notifier) = watch_setup();
    let file = notifier.root().join("a.txt");
    fs::write(&file, "stable content").unwrap();

    let (tx, rx) = channel();
    notifier.add_observer(&file, Arc::new(ChannelObserver(tx))).unwrap();

    // Touch the mtime without changing content.
    filetime::set_file_mtime(&file, FileTime::from_system_time(SystemTime::now())).unwrap();
    assert!(
        rx.recv_timeout(QUIET_PERIOD).is_err(),
        "identical content must not produce an event"
    );

    // The pipeline is still live: a real change comes through.
    overwrite(&notifier, "a.txt", "changed content");
    let event = rx.recv_timeout(EVENT_TIMEOUT).expect("no event after real change");
    assert_eq!(
        event.diff,
        vec![
            DiffLine::Removed("stable content".to_string()),
            DiffLine::Added("changed content".to_string()),
        ]
    );
}

#[test]
fn every_observer_of_a_file_receives_the_event() {
    let (_guard, notifier) = watch_setup();
    let file = notifier.root().join("a.txt");
    fs::write(&file, "v1").unwrap();

    let (tx_a, rx_a) = channel();
    let (tx_b, rx_b) = channel();
    let first: Arc<dyn ModificationObserver> = Arc::new(ChannelObserver(tx_a));
    let second: Arc<dyn ModificationObserver> = Arc::new(ChannelObserver(tx_b));
    notifier.add_observer(&file, first.clone()).unwrap();
    notifier.add_observer(&file, second.clone()).unwrap();

    overwrite(&notifier, "a.txt", "v2");

    let expected = vec![
        DiffLine::Removed("v1".to_string()),
        DiffLine::Added("v2".to_string()),
    ];
    assert_eq!(rx_a.recv_timeout(EVENT_TIMEOUT).expect("first observer").diff, expected);
    assert_eq!(rx_b.recv_timeout(EVENT_TIMEOUT).expect("second observer").diff, expected);

    // After the first observer leaves, the second keeps receiving.
    notifier.remove_observer(&file, &first).unwrap();
    overwrite(&notifier, "a.txt", "v3");
    let event = rx_b.recv_timeout(EVENT_TIMEOUT).expect("second observer after removal");
    assert_eq!(
        event.diff,
        vec![
            DiffLine::Removed("v2".to_string()),
            DiffLine::Added("v3".to_string()),
        ]
    );
    assert!(rx_a.recv_timeout(QUIET_PERIOD).is_err());
}
