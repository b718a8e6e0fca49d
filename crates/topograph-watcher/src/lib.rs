//! Snapshot file watcher

pub mod watcher;

pub use watcher::{FileWatcher, SnapshotWatcher, WatchEvent, read_snapshot};
