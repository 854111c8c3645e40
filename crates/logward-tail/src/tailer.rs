//! Positioned file tailer.
//!
//! A [`PositionedTailer`] owns one growing file and yields the complete
//! lines appended since the last read. Its `(path, inode, offset)` position
//! is saved after every read and on drop, so a restarted agent continues
//! where the previous one stopped.
//!
//! Before every read the tailer checks the path:
//!
//! - missing: close the handle and report no data until it reappears
//! - same inode but smaller than the offset: truncated in place, resume per
//!   [`TruncationPolicy`]
//! - different inode: rotated or recreated, reopen and resume per
//!   [`TruncationPolicy`]

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use logward_persist::KvFile;
use tracing::{debug, info, warn};

use crate::position::{PartialLinePolicy, PositionStore, TailPosition, TruncationPolicy};
use crate::watcher::FileWatcher;

/// Reads newly appended lines from one file across restarts and rotation.
#[derive(Debug)]
pub struct PositionedTailer {
    path: PathBuf,
    store: Option<PositionStore>,
    truncation: TruncationPolicy,
    partial: PartialLinePolicy,
    file: Option<File>,
    inode: u64,
    offset: u64,
    watcher: Option<FileWatcher>,
}

impl PositionedTailer {
    /// Creates a tailer for `path` whose position lives under `namespace`
    /// in the shared state file at `state_path`.
    ///
    /// A saved position is restored if it names the same path. If the
    /// saved inode no longer matches the file, or the saved offset is past
    /// its end, the position is resolved with `policy`. Nothing here fails:
    /// a missing file or unreadable state just means starting from scratch.
    pub fn new(
        path: impl Into<PathBuf>,
        namespace: impl Into<String>,
        state_path: impl Into<PathBuf>,
        policy: TruncationPolicy,
    ) -> Self {
        let store = PositionStore::new(namespace, KvFile::new(state_path));
        Self::build(path.into(), Some(store), policy)
    }

    /// Creates a tailer that keeps its position in memory only.
    pub fn ephemeral(path: impl Into<PathBuf>, policy: TruncationPolicy) -> Self {
        Self::build(path.into(), None, policy)
    }

    /// Sets how bytes after the last newline are handled.
    #[must_use]
    pub fn with_partial_lines(mut self, partial: PartialLinePolicy) -> Self {
        self.partial = partial;
        self
    }

    fn build(path: PathBuf, store: Option<PositionStore>, truncation: TruncationPolicy) -> Self {
        let watcher = match FileWatcher::new(&path) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "file watcher unavailable, falling back to timed polling"
                );
                None
            }
        };

        let mut tailer = Self {
            path,
            store,
            truncation,
            partial: PartialLinePolicy::default(),
            file: None,
            inode: 0,
            offset: 0,
            watcher,
        };
        tailer.restore();
        tailer.persist();
        tailer
    }

    fn restore(&mut self) {
        let saved = match &self.store {
            Some(store) => store.load(&self.path).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable tail state");
                None
            }),
            None => None,
        };
        let restored = saved.is_some();
        if let Some(pos) = saved {
            self.inode = pos.inode;
            self.offset = pos.offset;
        }

        let Ok((file, meta)) = open_with_metadata(&self.path) else {
            debug!(path = %self.path.display(), "tailed file not present yet");
            return;
        };
        let current = file_id(&meta);
        let size = meta.len();

        if restored && self.inode == 0 {
            // Saved while the path was missing: the file appeared while stopped.
            info!(
                path = %self.path.display(),
                inode = current,
                "file created while stopped"
            );
            self.offset = self.truncation.resume_offset(size);
        } else if self.inode != 0 && self.inode != current {
            info!(
                path = %self.path.display(),
                saved_inode = self.inode,
                inode = current,
                "file replaced while stopped"
            );
            self.offset = self.truncation.resume_offset(size);
        } else if self.offset > size {
            info!(
                path = %self.path.display(),
                offset = self.offset,
                size,
                "file shrank while stopped"
            );
            self.offset = self.truncation.resume_offset(size);
        }
        self.inode = current;
        self.file = Some(file);
    }

    /// Moves the position to the current end of the file and saves it.
    ///
    /// Used on first run so pre-existing history is skipped. If the file
    /// does not exist the position is reset to `(0, 0)`.
    pub fn start_from_end(&mut self) {
        self.close();
        self.inode = 0;
        self.offset = 0;
        if let Ok((file, meta)) = open_with_metadata(&self.path) {
            self.inode = file_id(&meta);
            self.offset = meta.len();
            self.file = Some(file);
        }
        self.persist();
    }

    /// Returns the complete lines appended since the last call.
    ///
    /// Immediately available data is returned without waiting. Otherwise
    /// the call blocks for at most `timeout` for a change notification and
    /// reads once more. Lines have their trailing `\n` and any `\r` before
    /// it removed. Read errors yield an empty result; the handle is closed
    /// and reopened on the next call.
    pub fn read_new_lines(&mut self, timeout: Duration) -> Vec<String> {
        let lines = self.poll_once();
        if !lines.is_empty() {
            return lines;
        }

        match &self.watcher {
            Some(watcher) => {
                watcher.wait(timeout);
            }
            None => thread::sleep(timeout),
        }

        self.poll_once()
    }

    /// Returns the tailed path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the inode of the file the offset refers to, or 0.
    #[must_use]
    pub const fn inode(&self) -> u64 {
        self.inode
    }

    /// Returns the byte offset of the next unread byte.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the current position.
    #[must_use]
    pub fn position(&self) -> TailPosition {
        TailPosition::new(self.path.clone(), self.inode, self.offset)
    }

    fn poll_once(&mut self) -> Vec<String> {
        self.refresh();
        match self.drain() {
            Ok(lines) => lines,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "read failed, reopening next poll");
                self.close();
                Vec::new()
            }
        }
    }

    /// Detects rotation, recreation and truncation.
    fn refresh(&mut self) {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(_) => {
                if self.file.is_some() {
                    debug!(path = %self.path.display(), "tailed file disappeared");
                }
                self.close();
                self.inode = 0;
                self.offset = 0;
                return;
            }
        };

        let current = file_id(&meta);
        if self.inode != 0 && current == self.inode {
            if self.file.is_none() {
                match File::open(&self.path) {
                    Ok(file) => self.file = Some(file),
                    Err(e) => {
                        debug!(path = %self.path.display(), error = %e, "reopen failed");
                        return;
                    }
                }
            }
            let size = meta.len();
            if size < self.offset {
                info!(
                    path = %self.path.display(),
                    offset = self.offset,
                    size,
                    policy = ?self.truncation,
                    "truncation detected"
                );
                self.offset = self.truncation.resume_offset(size);
                self.persist();
            }
            return;
        }

        if self.inode != 0 {
            info!(
                path = %self.path.display(),
                old_inode = self.inode,
                new_inode = current,
                policy = ?self.truncation,
                "rotation detected"
            );
        }
        self.close();
        self.inode = 0;
        self.offset = 0;
        match open_with_metadata(&self.path) {
            Ok((file, meta)) => {
                self.inode = file_id(&meta);
                self.offset = self.truncation.resume_offset(meta.len());
                self.file = Some(file);
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "open failed");
            }
        }
        self.persist();
    }

    fn drain(&mut self) -> io::Result<Vec<String>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        if buf.is_empty() {
            return Ok(Vec::new());
        }

        let complete = buf
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |idx| idx + 1);
        let consumed = match self.partial {
            PartialLinePolicy::Hold => complete,
            PartialLinePolicy::Discard => buf.len(),
        };

        let lines = split_complete_lines(&buf[..complete]);
        if consumed > 0 {
            self.offset += consumed as u64;
            self.persist();
        }
        Ok(lines)
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.position()) {
            warn!(
                path = %self.path.display(),
                state = %store.file().path().display(),
                error = %e,
                "failed to save tail position"
            );
        }
    }
}

impl Drop for PositionedTailer {
    fn drop(&mut self) {
        self.persist();
    }
}

fn open_with_metadata(path: &Path) -> io::Result<(File, Metadata)> {
    let file = File::open(path)?;
    let meta = file.metadata()?;
    Ok((file, meta))
}

/// Splits newline-terminated bytes into lines, dropping a `\r` before each
/// `\n`. Invalid UTF-8 is replaced rather than rejected.
fn split_complete_lines(bytes: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = bytes;
    while let Some(idx) = rest.iter().position(|&b| b == b'\n') {
        let mut line = &rest[..idx];
        if let [head @ .., b'\r'] = line {
            line = head;
        }
        lines.push(String::from_utf8_lossy(line).into_owned());
        rest = &rest[idx + 1..];
    }
    lines
}

#[cfg(unix)]
fn file_id(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

// Without inodes only truncation can be detected.
#[cfg(not(unix))]
fn file_id(_meta: &Metadata) -> u64 {
    1
}
