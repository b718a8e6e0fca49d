//! Filesystem watcher that turns snapshot file rewrites into graph replacements

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use topograph_core::Snapshot;
use tracing::{debug, error, info, warn};

/// Quiet period after the last change before the file is read.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File created or modified
    Changed(PathBuf),
    /// File removed
    Removed(PathBuf),
}

/// Watches a single file through its parent directory.
///
/// Editors and exporters often replace a file instead of writing it in
/// place, which drops watches on the file itself.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    target: PathBuf,
    dir: PathBuf,
}

impl FileWatcher {
    pub fn new(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let file_name = target.file_name().map(OsStr::to_os_string);
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                debug!("File system event: {:?}", event);
                Self::handle_notify_event(event, file_name.as_deref(), &event_tx);
            }
            Err(e) => {
                error!("File system watch error: {}", e);
            }
        })?;

        let dir = watch_dir(&target);
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
        info!("Watching snapshot file: {:?}", target);

        Ok(Self {
            watcher,
            event_rx,
            target,
            dir,
        })
    }

    /// Convert a notify event into watch events for the target file
    fn handle_notify_event(event: notify::Event, file_name: Option<&OsStr>, event_tx: &mpsc::UnboundedSender<WatchEvent>) {
        let removed = match event.kind {
            notify::EventKind::Create(_) | notify::EventKind::Modify(_) => false,
            notify::EventKind::Remove(_) => true,
            _ => return,
        };
        for path in event.paths {
            if !is_target(&path, file_name) {
                continue;
            }
            let watch_event = if removed {
                WatchEvent::Removed(path)
            } else {
                WatchEvent::Changed(path)
            };
            if let Err(e) = event_tx.send(watch_event) {
                warn!("Failed to send watch event: {}", e);
            }
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Get the event receiver
    pub fn event_receiver(&mut self) -> &mut mpsc::UnboundedReceiver<WatchEvent> {
        &mut self.event_rx
    }

    /// Stop watching
    pub fn unwatch(&mut self) -> Result<()> {
        info!("Stopping watch for: {:?}", self.target);
        self.watcher.unwatch(&self.dir)?;
        Ok(())
    }
}

/// Delivers every complete, parseable rewrite of a snapshot file.
pub struct SnapshotWatcher {
    files: FileWatcher,
    debounce: Duration,
}

impl SnapshotWatcher {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            files: FileWatcher::new(path)?,
            debounce: DEFAULT_DEBOUNCE,
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn path(&self) -> &Path {
        self.files.target()
    }

    /// The snapshot currently on disk, if readable.
    pub fn current(&self) -> Option<Snapshot> {
        read_snapshot(self.files.target())
    }

    /// Wait for the next readable snapshot.
    ///
    /// Bursts of events are coalesced until the file has been quiet for the
    /// debounce period. Removals and unparseable contents are skipped.
    /// Returns `None` once the watcher has shut down.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        loop {
            let mut last = self.files.event_receiver().recv().await?;
            loop {
                match tokio::time::timeout(self.debounce, self.files.event_receiver().recv()).await {
                    Ok(Some(event)) => last = event,
                    Ok(None) => return None,
                    Err(_) => break,
                }
            }

            if let WatchEvent::Removed(path) = last {
                info!("Snapshot file removed: {:?}", path);
                continue;
            }
            if let Some(snapshot) = read_snapshot(self.files.target()) {
                return Some(snapshot);
            }
        }
    }

    pub fn stop(&mut self) -> Result<()> {
        self.files.unwatch()
    }
}

/// Read a snapshot file, logging and skipping anything unreadable.
pub fn read_snapshot(path: &Path) -> Option<Snapshot> {
    match Snapshot::load(path) {
        Ok(snapshot) => {
            debug!(
                nodes = snapshot.nodes.len(),
                edges = snapshot.edges.len(),
                "Read snapshot from {}",
                path.display()
            );
            Some(snapshot)
        }
        Err(e) => {
            warn!("Skipping snapshot {}: {}", path.display(), e);
            None
        }
    }
}

/// Directory to watch for `target`.
fn watch_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Match by file name; event paths may be canonicalized.
fn is_target(path: &Path, file_name: Option<&OsStr>) -> bool {
    file_name.is_some() && path.file_name() == file_name
}
