//! File-change notifications.
//!
//! The watcher observes the file's parent directory rather than the file
//! itself, which keeps it working across rotation: a renamed-away file and
//! its freshly created replacement both produce events in the directory.

use std::ffi::OsString;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use crate::error::Result;

/// Wakes a tailer when its file might have changed.
///
/// Events for other files in the same directory are filtered out in the
/// notification callback.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<()>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Starts watching `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be created or the
    /// parent directory cannot be watched (for example, it does not exist).
    pub fn new(path: &Path) -> Result<Self> {
        let name: Option<OsString> = path.file_name().map(std::ffi::OsStr::to_os_string);
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let relevant = match res {
                Ok(event) => {
                    event.paths.is_empty()
                        || event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == name.as_deref())
                }
                Err(e) => {
                    debug!(error = %e, "file watcher error");
                    true
                }
            };
            if relevant {
                // The receiver is gone only while the watcher is being dropped.
                let _ = tx.send(());
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            events: rx,
        })
    }

    /// Blocks until the file changes or `timeout` elapses.
    ///
    /// Returns true if a change was signalled. Pending signals are drained
    /// so a burst of writes wakes the caller once.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.events.recv_timeout(timeout) {
            Ok(()) => {
                while self.events.try_recv().is_ok() {}
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("missing").join("app.log");
        assert!(FileWatcher::new(&path).is_err());
    }

    #[test]
    fn wait_times_out_without_changes() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("app.log");
        fs::write(&path, "").expect("seed");
        let watcher = FileWatcher::new(&path).expect("watch");
        // Settle any events from setup.
        watcher.wait(Duration::from_millis(50));

        let start = Instant::now();
        let woke = watcher.wait(Duration::from_millis(50));
        assert!(!woke);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn wait_wakes_on_write() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("app.log");
        fs::write(&path, "").expect("seed");
        let watcher = FileWatcher::new(&path).expect("watch");

        fs::write(&path, "line\n").expect("write");

        assert!(watcher.wait(Duration::from_secs(5)));
    }
}
