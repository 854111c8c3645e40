//! Tail positions and their persisted form.
//!
//! A position is stored in a shared state file under three keys owned by
//! the tailer's namespace:
//!
//! ```text
//! <namespace>.path=/var/log/syslog
//! <namespace>.inode=1835021
//! <namespace>.offset=48213
//! ```

use std::path::{Path, PathBuf};

use logward_persist::{KvFile, KvMap};

use crate::error::Result;

/// How a tailer reacts when its file shrinks or is replaced.
///
/// Fixed per source when the tailer is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TruncationPolicy {
    /// Re-read from byte 0. For files where completeness matters more than
    /// avoiding duplicates.
    #[default]
    ResetToZero,
    /// Jump to the current end. For append-mostly files that may be
    /// recreated wholesale, such as shell history.
    SeekToEnd,
}

impl TruncationPolicy {
    /// Returns the offset to resume from in a file of `size` bytes.
    #[must_use]
    pub const fn resume_offset(self, size: u64) -> u64 {
        match self {
            Self::ResetToZero => 0,
            Self::SeekToEnd => size,
        }
    }
}

/// What a tailer does with bytes after the last newline at read time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PartialLinePolicy {
    /// Leave the offset at the last newline so the unterminated tail is
    /// read again, and emitted once its newline arrives.
    #[default]
    Hold,
    /// Consume the unterminated tail into the offset without emitting it.
    /// Bytes a writer flushed mid-line are lost.
    Discard,
}

/// The durable read position of a tailed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailPosition {
    /// The tailed path.
    pub path: PathBuf,
    /// Inode of the file the offset refers to, or 0 if not yet known.
    pub inode: u64,
    /// Byte offset of the next unread byte.
    pub offset: u64,
}

impl TailPosition {
    /// Creates a position.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, inode: u64, offset: u64) -> Self {
        Self {
            path: path.into(),
            inode,
            offset,
        }
    }
}

/// A tailer's namespace inside a shared state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionStore {
    namespace: String,
    file: KvFile,
}

impl PositionStore {
    /// Creates a store for `namespace` in `file`.
    #[must_use]
    pub fn new(namespace: impl Into<String>, file: KvFile) -> Self {
        Self {
            namespace: namespace.into(),
            file,
        }
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the underlying state file.
    #[must_use]
    pub const fn file(&self) -> &KvFile {
        &self.file
    }

    /// Loads the position saved for `path`.
    ///
    /// Returns `None` if nothing was saved, or if the saved path names a
    /// different file (the source was reconfigured).
    ///
    /// # Errors
    ///
    /// Returns an error if the state file exists but cannot be read.
    pub fn load(&self, path: &Path) -> Result<Option<TailPosition>> {
        let map = self.file.load()?;
        Ok(self.position_from(&map, path))
    }

    /// Saves `position`, keeping every key outside this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be rewritten.
    pub fn save(&self, position: &TailPosition) -> Result<()> {
        let path_key = self.key("path");
        let inode_key = self.key("inode");
        let offset_key = self.key("offset");
        self.file.update(|map| {
            map.set(path_key, position.path.display());
            map.set(inode_key, position.inode);
            map.set(offset_key, position.offset);
        })?;
        Ok(())
    }

    fn position_from(&self, map: &KvMap, path: &Path) -> Option<TailPosition> {
        let saved_path = map.get(&self.key("path")).unwrap_or_default();
        if !saved_path.is_empty() && Path::new(saved_path) != path {
            return None;
        }
        let inode = map.get_parsed(&self.key("inode"));
        let offset = map.get_parsed(&self.key("offset"));
        if inode.is_none() && offset.is_none() {
            return None;
        }
        Some(TailPosition::new(
            path,
            inode.unwrap_or(0),
            offset.unwrap_or(0),
        ))
    }

    fn key(&self, field: &str) -> String {
        format!("{}.{field}", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use test_case::test_case;

    fn store_in(dir: &TempDir, namespace: &str) -> PositionStore {
        PositionStore::new(namespace, KvFile::new(dir.path().join("reader.state")))
    }

    #[test_case(TruncationPolicy::ResetToZero, 500, 0 ; "reset rereads from start")]
    #[test_case(TruncationPolicy::SeekToEnd, 500, 500 ; "seek jumps to end")]
    #[test_case(TruncationPolicy::SeekToEnd, 0, 0 ; "seek on empty file")]
    fn resume_offset(policy: TruncationPolicy, size: u64, expected: u64) {
        assert_eq!(policy.resume_offset(size), expected);
    }

    #[test]
    fn defaults() {
        assert_eq!(TruncationPolicy::default(), TruncationPolicy::ResetToZero);
        assert_eq!(PartialLinePolicy::default(), PartialLinePolicy::Hold);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().expect("create temp dir");
        let store = store_in(&dir, "syslog");
        let pos = TailPosition::new("/var/log/syslog", 17, 4096);

        store.save(&pos).expect("save");

        let loaded = store.load(Path::new("/var/log/syslog")).expect("load");
        assert_eq!(loaded, Some(pos));
    }

    #[test]
    fn load_ignores_position_for_other_path() {
        let dir = TempDir::new().expect("create temp dir");
        let store = store_in(&dir, "syslog");
        store
            .save(&TailPosition::new("/var/log/messages", 17, 4096))
            .expect("save");

        let loaded = store.load(Path::new("/var/log/syslog")).expect("load");
        assert_eq!(loaded, None);
    }

    #[test]
    fn load_missing_namespace_is_none() {
        let dir = TempDir::new().expect("create temp dir");
        store_in(&dir, "auditd")
            .save(&TailPosition::new("/var/log/audit/audit.log", 1, 2))
            .expect("save");

        let loaded = store_in(&dir, "syslog")
            .load(Path::new("/var/log/syslog"))
            .expect("load");
        assert_eq!(loaded, None);
    }

    #[test]
    fn load_tolerates_garbage_numbers() {
        let dir = TempDir::new().expect("create temp dir");
        fs::write(
            dir.path().join("reader.state"),
            "syslog.path=/var/log/syslog\nsyslog.inode=abc\nsyslog.offset=12\n",
        )
        .expect("seed");

        let loaded = store_in(&dir, "syslog")
            .load(Path::new("/var/log/syslog"))
            .expect("load");
        assert_eq!(loaded, Some(TailPosition::new("/var/log/syslog", 0, 12)));
    }

    #[test]
    fn namespaces_share_one_file() {
        let dir = TempDir::new().expect("create temp dir");
        let syslog = store_in(&dir, "syslog");
        let auth = store_in(&dir, "auth.log");

        syslog
            .save(&TailPosition::new("/var/log/syslog", 1, 10))
            .expect("save syslog");
        auth.save(&TailPosition::new("/var/log/auth.log", 2, 20))
            .expect("save auth");
        syslog
            .save(&TailPosition::new("/var/log/syslog", 1, 11))
            .expect("resave syslog");

        let auth_pos = auth.load(Path::new("/var/log/auth.log")).expect("load");
        assert_eq!(auth_pos, Some(TailPosition::new("/var/log/auth.log", 2, 20)));
        let syslog_pos = syslog.load(Path::new("/var/log/syslog")).expect("load");
        assert_eq!(syslog_pos.map(|p| p.offset), Some(11));
    }
}
