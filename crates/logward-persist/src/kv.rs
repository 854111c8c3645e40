//! Line-oriented `key=value` state files.
//!
//! The format is deliberately minimal:
//!
//! ```text
//! # comment lines and blank lines are ignored
//! syslog.path=/var/log/syslog
//! syslog.inode=1835021
//! syslog.offset=48213
//! ```
//!
//! Keys and values are trimmed of surrounding spaces and tabs. The first `=`
//! separates key from value, so values may contain `=`. A file is shared by
//! several writers that each own a key prefix; [`KvFile::update`] rewrites
//! the whole file while keeping every key it was not asked to touch.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::atomic::replace_file;
use crate::error::{PersistError, Result};

/// Ordered key-value contents of a state file.
///
/// Insertion order is preserved so rewrites keep foreign keys where they
/// were. Setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvMap {
    entries: Vec<(String, String)>,
}

impl KvMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Parses state file contents.
    ///
    /// Malformed lines (no `=`, or an empty key) are skipped. When a key
    /// appears more than once the last value wins.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut map = Self::new();
        for line in content.lines() {
            let line = trim(line);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = trim(key);
            if key.is_empty() {
                continue;
            }
            map.insert(key.to_string(), trim(value).to_string());
        }
        map
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value under `key` parsed as `T`, or `None` if it is
    /// missing or does not parse.
    #[must_use]
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Sets `key` to `value`.
    ///
    /// Values are stored as given; [`KvMap::render`] and [`KvFile::save`]
    /// reject values that would break the line format.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.insert(key.into(), value.to_string());
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders the map back into state file form.
    ///
    /// # Errors
    ///
    /// Returns an error if a key contains `=`, `#` at the start, or a line
    /// break, or if a value contains a line break.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        for (key, value) in &self.entries {
            validate(key, value)?;
            // Writing to a String cannot fail.
            let _ = writeln!(out, "{key}={value}");
        }
        Ok(out)
    }

    fn insert(&mut self, key: String, value: String) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }
}

fn trim(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n')
}

fn validate(key: &str, value: &str) -> Result<()> {
    let bad_key = key.is_empty()
        || trim(key) != key
        || key.starts_with('#')
        || key.contains(['=', '\n', '\r']);
    if bad_key {
        return Err(PersistError::InvalidKey(key.to_string()));
    }
    if value.contains(['\n', '\r']) || trim(value) != value {
        return Err(PersistError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Handle to a `key=value` state file on disk.
///
/// The handle holds no open file; each [`KvFile::load`] reads the file
/// afresh and each [`KvFile::save`] replaces it atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvFile {
    path: PathBuf,
}

impl KvFile {
    /// Creates a handle for the state file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the state file currently exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads the state file. A missing file loads as an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(&self) -> Result<KvMap> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(KvMap::parse(&String::from_utf8_lossy(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(KvMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically writes `map` to the state file, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be rendered or the file cannot be
    /// replaced.
    pub fn save(&self, map: &KvMap) -> Result<()> {
        let rendered = map.render()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        replace_file(&self.path, rendered.as_bytes())
    }

    /// Loads the file, applies `mutate`, and saves the result.
    ///
    /// Keys that `mutate` does not touch are written back unchanged, which
    /// is what lets several tailers share one file.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving fails.
    pub fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut KvMap),
    {
        let mut map = self.load()?;
        mutate(&mut map);
        self.save(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let map = KvMap::parse("# header\n\nsyslog.offset=10\n   \n# trailing\n");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("syslog.offset"), Some("10"));
    }

    #[test_case("a=b", "a", "b" ; "plain")]
    #[test_case("  a =  b  ", "a", "b" ; "surrounding spaces")]
    #[test_case("\ta=b\t\r", "a", "b" ; "tabs and carriage return")]
    #[test_case("path=/x=y", "path", "/x=y" ; "value keeps later equals")]
    #[test_case("empty=", "empty", "" ; "empty value")]
    fn parse_line_forms(line: &str, key: &str, value: &str) {
        let map = KvMap::parse(line);
        assert_eq!(map.get(key), Some(value));
    }

    #[test_case("no separator" ; "missing equals")]
    #[test_case("=value" ; "empty key")]
    #[test_case("   = value" ; "blank key")]
    fn parse_ignores_malformed(line: &str) {
        assert!(KvMap::parse(line).is_empty());
    }

    #[test]
    fn parse_last_duplicate_wins() {
        let map = KvMap::parse("a=1\nb=2\na=3\n");
        assert_eq!(map.get("a"), Some("3"));
        assert_eq!(map.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn get_parsed_handles_garbage() {
        let map = KvMap::parse("x.inode=12\nx.offset=abc\n");
        assert_eq!(map.get_parsed::<u64>("x.inode"), Some(12));
        assert_eq!(map.get_parsed::<u64>("x.offset"), None);
        assert_eq!(map.get_parsed::<u64>("x.missing"), None);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut map = KvMap::parse("a=1\nb=2\n");
        map.set("a", 9);
        map.set("c", "3");
        assert_eq!(map.render().expect("render"), "a=9\nb=2\nc=3\n");
    }

    #[test]
    fn render_rejects_line_breaks() {
        let mut map = KvMap::new();
        map.set("a", "x\ny");
        assert!(matches!(map.render(), Err(PersistError::InvalidValue { .. })));

        let mut map = KvMap::new();
        map.set("a=b", "x");
        assert!(matches!(map.render(), Err(PersistError::InvalidKey(_))));
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = TempDir::new().expect("create temp dir");
        let file = KvFile::new(dir.path().join("reader.state"));
        assert!(!file.exists());
        assert!(file.load().expect("load").is_empty());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().expect("create temp dir");
        let file = KvFile::new(dir.path().join("state/nested/reader.state"));

        let mut map = KvMap::new();
        map.set("auditd.offset", 5);
        file.save(&map).expect("save");

        assert!(file.exists());
        assert_eq!(file.load().expect("load"), map);
    }

    #[test]
    fn update_preserves_foreign_namespaces() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("reader.state");
        fs::write(
            &path,
            "# written by hand\nsyslog.path=/var/log/syslog\nsyslog.offset=100\nauditd.offset=7\n",
        )
        .expect("seed");

        let file = KvFile::new(&path);
        file.update(|map| {
            map.set("auditd.offset", 8);
            map.set("auditd.inode", 99);
        })
        .expect("update");

        let map = file.load().expect("load");
        assert_eq!(map.get("syslog.path"), Some("/var/log/syslog"));
        assert_eq!(map.get("syslog.offset"), Some("100"));
        assert_eq!(map.get("auditd.offset"), Some("8"));
        assert_eq!(map.get("auditd.inode"), Some("99"));
    }

    #[test]
    fn failed_render_leaves_file_untouched() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("reader.state");
        fs::write(&path, "a=1\n").expect("seed");

        let file = KvFile::new(&path);
        let result = file.update(|map| map.set("a", "broken\nvalue"));

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).expect("read"), "a=1\n");
    }

    proptest! {
        #[test]
        fn render_parse_preserves_entries(
            entries in prop::collection::vec(("[a-z][a-z0-9_.]{0,12}", "[A-Za-z0-9/._=-]{0,16}"), 0..12)
        ) {
            let mut map = KvMap::new();
            for (k, v) in &entries {
                map.set(k.clone(), v.clone());
            }
            let rendered = map.render().expect("render");
            prop_assert_eq!(KvMap::parse(&rendered), map);
        }
    }
}
