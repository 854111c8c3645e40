//! The three-tier delivery spool.
//!
//! On disk the spool is a directory with two newline-delimited files:
//!
//! ```text
//! <dir>/queue.log     overflow queue, head = first line
//! <dir>/inflight.log  at most one payload, claimed from the queue head
//! ```
//!
//! Head removal and prepends rewrite `queue.log` through an atomic replace,
//! so a crash leaves either the old or the new contents. Enqueue appends.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logward_persist::{replace_file, replace_with};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::ack::is_success_ack;
use crate::error::{DeliveryError, Result, SpoolError};
use crate::queue::BoundedQueue;
use crate::transport::Transport;

/// File name of the on-disk overflow queue.
pub const QUEUE_FILE: &str = "queue.log";

/// File name of the inflight slot.
pub const INFLIGHT_FILE: &str = "inflight.log";

/// A spool shared between several producer threads.
///
/// The spool itself does no locking; hosts that enqueue from more than one
/// thread wrap it in this.
pub type SharedSpool = Arc<Mutex<Spool>>;

/// Where [`Spool::enqueue`] put a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The payload was empty after trimming and was not stored.
    Skipped,
    /// The payload went to the RAM tier.
    Memory,
    /// RAM was full and the payload was appended to the disk queue.
    Disk,
}

/// Result of one [`Spool::flush_some`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Payloads acknowledged by the collector.
    pub delivered: usize,
    /// True if the call stopped on a failed send or spool I/O error
    /// rather than running out of work or budget.
    pub halted: bool,
}

impl FlushOutcome {
    /// Returns true if at least one payload was delivered.
    #[must_use]
    pub const fn delivered_any(&self) -> bool {
        self.delivered > 0
    }
}

/// Snapshot of how much data is waiting in each tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpoolStatus {
    /// Payloads in the RAM tier.
    pub memory: usize,
    /// Payload lines in the disk queue.
    pub disk: usize,
    /// True if the inflight slot holds a payload.
    pub inflight: bool,
}

impl SpoolStatus {
    /// Returns the total number of waiting payloads.
    #[must_use]
    pub fn total(&self) -> usize {
        self.memory + self.disk + usize::from(self.inflight)
    }
}

enum Step {
    Delivered,
    Idle,
    Halted,
}

/// Durable at-least-once delivery pipeline.
///
/// See the [crate docs](crate) for the tier layout. The RAM tier is spilled
/// to disk on [`Spool::drain_memory_to_disk`] and again on drop, so
/// in-memory payloads survive an orderly shutdown.
#[derive(Debug)]
pub struct Spool {
    dir: PathBuf,
    queue_path: PathBuf,
    inflight_path: PathBuf,
    ram: BoundedQueue<String>,
}

impl Spool {
    /// Opens the spool in `dir`, creating the directory if needed.
    ///
    /// Existing queue and inflight files are picked up as they are, which
    /// is how payloads survive a restart. `ram_capacity` of zero sends
    /// every payload straight to disk.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::DirectoryUnusable`] if the directory cannot be
    /// created.
    pub fn open(dir: impl Into<PathBuf>, ram_capacity: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SpoolError::DirectoryUnusable {
            path: dir.clone(),
            source,
        })?;
        let spool = Self {
            queue_path: dir.join(QUEUE_FILE),
            inflight_path: dir.join(INFLIGHT_FILE),
            dir,
            ram: BoundedQueue::new(ram_capacity),
        };
        info!(
            dir = %spool.dir.display(),
            ram_capacity,
            pending = spool.has_pending_data(),
            "spool opened"
        );
        Ok(spool)
    }

    /// Opens a spool shared behind a mutex.
    ///
    /// # Errors
    ///
    /// Same as [`Spool::open`].
    pub fn open_shared(dir: impl Into<PathBuf>, ram_capacity: usize) -> Result<SharedSpool> {
        Ok(Arc::new(Mutex::new(Self::open(dir, ram_capacity)?)))
    }

    /// Returns the spool directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the disk queue path.
    #[must_use]
    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    /// Returns the inflight slot path.
    #[must_use]
    pub fn inflight_path(&self) -> &Path {
        &self.inflight_path
    }

    /// Accepts one payload line.
    ///
    /// Trailing CR/LF are trimmed. An empty payload is skipped. Otherwise
    /// the payload goes to RAM, or is appended to the disk queue if RAM is
    /// full.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::EmbeddedNewline`] if the payload spans lines,
    /// or an I/O error if RAM is full and the disk queue cannot be
    /// appended. In the latter case the payload was not accepted.
    pub fn enqueue(&mut self, payload: &str) -> Result<Placement> {
        let line = normalize(payload);
        if line.is_empty() {
            return Ok(Placement::Skipped);
        }
        if line.contains(['\n', '\r']) {
            return Err(SpoolError::EmbeddedNewline);
        }

        match self.ram.push(line.to_string()) {
            Ok(()) => {
                trace!(len = line.len(), "payload queued in memory");
                Ok(Placement::Memory)
            }
            Err(line) => {
                append_line(&self.queue_path, &line)?;
                debug!(len = line.len(), "memory tier full, payload spilled to disk");
                Ok(Placement::Disk)
            }
        }
    }

    /// Returns true if any tier holds data.
    #[must_use]
    pub fn has_pending_data(&self) -> bool {
        !self.ram.is_empty()
            || file_has_data(&self.inflight_path)
            || file_has_data(&self.queue_path)
    }

    /// Returns the number of payloads in the RAM tier.
    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.ram.len()
    }

    /// Returns the RAM tier capacity.
    #[must_use]
    pub const fn memory_capacity(&self) -> usize {
        self.ram.capacity()
    }

    /// Counts the payload lines in the disk queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file exists but cannot be read.
    pub fn disk_len(&self) -> Result<usize> {
        let Some(reader) = open_reader(&self.queue_path)? else {
            return Ok(0);
        };
        let mut count = 0;
        for line in reader.split(b'\n') {
            if !is_blank(&line?) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Returns the payload in the inflight slot, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the inflight file exists but cannot be read.
    pub fn inflight(&self) -> Result<Option<String>> {
        let Some(mut reader) = open_reader(&self.inflight_path)? else {
            return Ok(None);
        };
        first_payload(&mut reader)
    }

    /// Returns a snapshot of every tier.
    ///
    /// # Errors
    ///
    /// Returns an error if a spool file cannot be read.
    pub fn status(&self) -> Result<SpoolStatus> {
        Ok(SpoolStatus {
            memory: self.ram.len(),
            disk: self.disk_len()?,
            inflight: self.inflight()?.is_some(),
        })
    }

    /// Delivers up to `max_items` payloads.
    ///
    /// Does nothing unless the transport is connected. Each step resolves
    /// one payload, taking it from the inflight slot first, then RAM, then
    /// the disk queue. The first failed send ends the call: a failed RAM
    /// payload is moved to the head of the disk queue, and a failed disk
    /// payload is rolled back from inflight to the queue head. A
    /// `max_items` of zero is treated as one.
    pub fn flush_some<T>(&mut self, transport: &mut T, max_items: usize) -> FlushOutcome
    where
        T: Transport + ?Sized,
    {
        let mut outcome = FlushOutcome::default();
        if !transport.is_connected() {
            return outcome;
        }

        for _ in 0..max_items.max(1) {
            match self.flush_one(transport) {
                Step::Delivered => outcome.delivered += 1,
                Step::Idle => break,
                Step::Halted => {
                    outcome.halted = true;
                    break;
                }
            }
        }

        if outcome.delivered > 0 || outcome.halted {
            debug!(
                delivered = outcome.delivered,
                halted = outcome.halted,
                "flush finished"
            );
        }
        outcome
    }

    /// Sends one payload and waits for its acknowledgement.
    ///
    /// Writes the payload plus a newline, reads one response line, and
    /// checks it with [`is_success_ack`].
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Transport`] if the write or read fails, and
    /// [`DeliveryError::Rejected`] if the response is not a success.
    pub fn send_and_await_ack<T>(
        transport: &mut T,
        payload: &str,
    ) -> std::result::Result<(), DeliveryError>
    where
        T: Transport + ?Sized,
    {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload.as_bytes());
        frame.push(b'\n');
        transport.send_all(&frame)?;

        let response = transport.read_line()?;
        if is_success_ack(&response) {
            Ok(())
        } else {
            Err(DeliveryError::Rejected { response })
        }
    }

    /// Discards every tier's contents.
    ///
    /// For operator-initiated resets only.
    ///
    /// # Errors
    ///
    /// Returns an error if a spool file cannot be truncated. The RAM tier
    /// is cleared regardless.
    pub fn clear_all(&mut self) -> Result<()> {
        let dropped = self.ram.len();
        self.ram.clear();
        truncate(&self.queue_path)?;
        truncate(&self.inflight_path)?;
        warn!(dir = %self.dir.display(), memory_dropped = dropped, "spool cleared");
        Ok(())
    }

    /// Appends every RAM payload to the disk queue, in FIFO order.
    ///
    /// Returns the number of payloads moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the disk queue cannot be written. Payloads not
    /// yet written stay in RAM.
    pub fn drain_memory_to_disk(&mut self) -> Result<usize> {
        if self.ram.is_empty() {
            return Ok(0);
        }
        let mut file = open_append(&self.queue_path)?;
        let mut moved = 0;
        while let Some(line) = self.ram.peek() {
            writeln!(file, "{line}")?;
            self.ram.pop();
            moved += 1;
        }
        file.sync_data()?;
        info!(moved, "memory tier drained to disk");
        Ok(moved)
    }

    fn flush_one<T>(&mut self, transport: &mut T) -> Step
    where
        T: Transport + ?Sized,
    {
        match self.inflight() {
            Ok(Some(payload)) => return self.deliver_inflight(transport, &payload),
            Ok(None) => {
                if file_has_data(&self.inflight_path) {
                    if let Err(e) = truncate(&self.inflight_path) {
                        warn!(
                            path = %self.inflight_path.display(),
                            error = %e,
                            "could not clear blank inflight slot"
                        );
                        return Step::Halted;
                    }
                }
            }
            Err(e) => {
                warn!(
                    path = %self.inflight_path.display(),
                    error = %e,
                    "inflight slot unreadable"
                );
                return Step::Halted;
            }
        }

        if let Some(payload) = self.ram.pop() {
            return match Self::send_and_await_ack(transport, &payload) {
                Ok(()) => Step::Delivered,
                Err(e) => {
                    warn!(error = %e, "send from memory failed, demoting payload to disk");
                    self.demote(payload);
                    Step::Halted
                }
            };
        }

        match self.claim_disk_head() {
            Ok(Some(payload)) => match Self::send_and_await_ack(transport, &payload) {
                Ok(()) => self.release_inflight(),
                Err(e) => {
                    warn!(error = %e, "send from disk failed, rolling back");
                    self.rollback(&payload);
                    Step::Halted
                }
            },
            Ok(None) => Step::Idle,
            Err(e) => {
                warn!(
                    path = %self.queue_path.display(),
                    error = %e,
                    "could not claim disk queue head"
                );
                Step::Halted
            }
        }
    }

    fn deliver_inflight<T>(&mut self, transport: &mut T, payload: &str) -> Step
    where
        T: Transport + ?Sized,
    {
        match Self::send_and_await_ack(transport, payload) {
            Ok(()) => self.release_inflight(),
            Err(e) => {
                warn!(error = %e, "resend of inflight payload failed");
                Step::Halted
            }
        }
    }

    /// Clears the slot after an acknowledged send.
    fn release_inflight(&mut self) -> Step {
        match truncate(&self.inflight_path) {
            Ok(()) => Step::Delivered,
            Err(e) => {
                // The payload was delivered but will be sent again.
                warn!(
                    path = %self.inflight_path.display(),
                    error = %e,
                    "could not clear inflight slot"
                );
                Step::Halted
            }
        }
    }

    /// Moves the disk queue head into the inflight slot.
    fn claim_disk_head(&mut self) -> Result<Option<String>> {
        let Some(mut reader) = open_reader(&self.queue_path)? else {
            return Ok(None);
        };
        let Some(head) = first_payload(&mut reader)? else {
            if file_has_data(&self.queue_path) {
                truncate(&self.queue_path)?;
            }
            return Ok(None);
        };
        drop(reader);

        replace_file(&self.inflight_path, format!("{head}\n").as_bytes())?;
        if let Err(e) = self.remove_queue_head() {
            if let Err(clear) = truncate(&self.inflight_path) {
                warn!(error = %clear, "head left in both queue and inflight slot");
            }
            return Err(e);
        }
        trace!(len = head.len(), "disk queue head claimed");
        Ok(Some(head))
    }

    fn remove_queue_head(&self) -> Result<()> {
        let Some(mut reader) = open_reader(&self.queue_path)? else {
            return Ok(());
        };
        replace_with(&self.queue_path, |out| {
            let mut skipped = false;
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf)? == 0 {
                    return Ok(());
                }
                if is_blank(&buf) {
                    continue;
                }
                if !skipped {
                    skipped = true;
                    continue;
                }
                out.write_all(trim_line_end(&buf))?;
                out.write_all(b"\n")?;
            }
        })?;
        Ok(())
    }

    /// Returns a claimed payload to the queue head and clears the slot.
    ///
    /// If the queue cannot be rewritten the payload stays in the inflight
    /// slot, where the next flush picks it up first.
    fn rollback(&mut self, payload: &str) {
        if let Err(e) = prepend_line(&self.queue_path, payload) {
            warn!(error = %e, "rollback failed, payload kept in inflight slot");
            return;
        }
        if let Err(e) = truncate(&self.inflight_path) {
            warn!(error = %e, "payload restored to queue but inflight slot not cleared");
        }
    }

    /// Puts a RAM payload that failed to send into durable storage.
    fn demote(&mut self, payload: String) {
        let Err(e) = prepend_line(&self.queue_path, &payload) else {
            return;
        };
        warn!(error = %e, "could not prepend to disk queue, using inflight slot");
        // The inflight slot is known to be empty here.
        let Err(e) = replace_file(&self.inflight_path, format!("{payload}\n").as_bytes()) else {
            return;
        };
        warn!(error = %e, "could not write inflight slot, returning payload to memory");
        if self.ram.push(payload).is_err() {
            error!("payload lost: no tier could take it back");
        }
    }
}

impl Drop for Spool {
    fn drop(&mut self) {
        if let Err(e) = self.drain_memory_to_disk() {
            error!(
                dir = %self.dir.display(),
                remaining = self.ram.len(),
                error = %e,
                "memory tier could not be saved on shutdown"
            );
        }
    }
}

fn normalize(payload: &str) -> &str {
    payload.trim_end_matches(['\r', '\n'])
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| b == b'\n' || b == b'\r')
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn file_has_data(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.len() > 0)
}

fn open_reader(path: &Path) -> Result<Option<BufReader<File>>> {
    match File::open(path) {
        Ok(file) => Ok(Some(BufReader::new(file))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn first_payload<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        if !is_blank(&buf) {
            return Ok(Some(String::from_utf8_lossy(trim_line_end(&buf)).into_owned()));
        }
    }
}

/// Opens `path` for appending, first terminating a torn last line so the
/// next write starts on a fresh line.
fn open_append(path: &Path) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;
    if file.metadata()?.len() > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            file.write_all(b"\n")?;
        }
    }
    Ok(file)
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = open_append(path)?;
    writeln!(file, "{line}")?;
    file.sync_data()
}

fn prepend_line(path: &Path, line: &str) -> Result<()> {
    let existing = match File::open(path) {
        Ok(file) => Some(file),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    replace_with(path, |out| {
        writeln!(out, "{line}")?;
        if let Some(mut file) = existing {
            io::copy(&mut file, out)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn truncate(path: &Path) -> io::Result<()> {
    match OpenOptions::new().write(true).truncate(true).open(path) {
        Ok(file) => file.sync_data(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, Reply};
    use std::thread;
    use tempfile::TempDir;
    use test_case::test_case;

    fn open(dir: &TempDir, capacity: usize) -> Spool {
        Spool::open(dir.path().join("spool"), capacity).expect("open spool")
    }

    fn disk_lines(spool: &Spool) -> Vec<String> {
        match fs::read_to_string(spool.queue_path()) {
            Ok(s) => s.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn seed_inflight(spool: &Spool, payload: &str) {
        fs::write(spool.inflight_path(), format!("{payload}\n")).expect("seed inflight");
    }

    #[test]
    fn open_creates_directory() {
        let dir = TempDir::new().expect("create temp dir");
        let spool = open(&dir, 2);
        assert!(spool.dir().is_dir());
        assert!(!spool.has_pending_data());
    }

    #[test]
    fn open_fails_when_directory_is_a_file() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("spool");
        fs::write(&path, "not a dir").expect("seed");

        let err = Spool::open(&path, 2).expect_err("should fail");
        assert!(matches!(err, SpoolError::DirectoryUnusable { .. }));
    }

    #[test_case("payload\n", "payload" ; "trailing newline")]
    #[test_case("payload\r\n", "payload" ; "trailing crlf")]
    #[test_case("payload\r\n\r\n", "payload" ; "several line ends")]
    #[test_case("  spaced  ", "  spaced  " ; "inner whitespace kept")]
    fn enqueue_trims_line_ends(input: &str, stored: &str) {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 0);

        assert_eq!(spool.enqueue(input).expect("enqueue"), Placement::Disk);
        assert_eq!(disk_lines(&spool), vec![stored]);
    }

    #[test_case("" ; "empty")]
    #[test_case("\n" ; "newline only")]
    #[test_case("\r\n" ; "crlf only")]
    fn enqueue_skips_empty(input: &str) {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 2);

        assert_eq!(spool.enqueue(input).expect("enqueue"), Placement::Skipped);
        assert!(!spool.has_pending_data());
    }

    #[test]
    fn enqueue_rejects_embedded_newline() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 2);

        let err = spool.enqueue("a\nb").expect_err("should reject");
        assert!(matches!(err, SpoolError::EmbeddedNewline));
        assert!(!spool.has_pending_data());
    }

    #[test]
    fn overflow_spills_to_disk_without_loss() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 2);

        assert_eq!(spool.enqueue("A").expect("A"), Placement::Memory);
        assert_eq!(spool.enqueue("B").expect("B"), Placement::Memory);
        assert_eq!(spool.enqueue("C").expect("C"), Placement::Disk);

        assert_eq!(spool.memory_len(), 2);
        assert_eq!(disk_lines(&spool), vec!["C"]);
        assert_eq!(spool.disk_len().expect("disk len"), 1);
    }

    #[test]
    fn flush_delivers_all_tiers_in_order() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 2);
        for p in ["A", "B", "C"] {
            spool.enqueue(p).expect("enqueue");
        }
        let mut transport = MockTransport::new();

        let outcome = spool.flush_some(&mut transport, 3);

        assert_eq!(outcome.delivered, 3);
        assert!(outcome.delivered_any());
        assert!(!outcome.halted);
        assert_eq!(transport.sent(), ["A", "B", "C"]);
        assert!(!spool.has_pending_data());
        assert_eq!(spool.inflight().expect("inflight"), None);
    }

    #[test]
    fn failed_memory_send_is_prepended_to_disk() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 2);
        for p in ["A", "B", "C"] {
            spool.enqueue(p).expect("enqueue");
        }
        let mut transport = MockTransport::new()
            .with_replies([Reply::Ack, Reply::Reject(r#"{"status":"error"}"#.into())]);

        let outcome = spool.flush_some(&mut transport, 3);

        assert_eq!(outcome.delivered, 1);
        assert!(outcome.halted);
        assert_eq!(spool.memory_len(), 0);
        assert_eq!(disk_lines(&spool), vec!["B", "C"]);
        assert_eq!(spool.inflight().expect("inflight"), None);
    }

    #[test]
    fn inflight_is_resolved_before_other_tiers() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 2);
        spool.enqueue("ram-1").expect("enqueue");
        spool.enqueue("ram-2").expect("enqueue");
        spool.enqueue("disk-1").expect("enqueue");
        seed_inflight(&spool, "claimed");
        let mut transport = MockTransport::new();

        let outcome = spool.flush_some(&mut transport, 1);

        assert_eq!(outcome.delivered, 1);
        assert_eq!(transport.sent(), ["claimed"]);
        assert_eq!(spool.inflight().expect("inflight"), None);
        assert_eq!(spool.memory_len(), 2);
        assert_eq!(disk_lines(&spool), vec!["disk-1"]);
    }

    #[test]
    fn memory_is_preferred_over_disk() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 1);
        spool.enqueue("old-ram").expect("enqueue");
        spool.enqueue("backlog").expect("enqueue");
        let mut transport = MockTransport::new();

        spool.flush_some(&mut transport, 1);
        spool.enqueue("fresh").expect("enqueue");
        spool.flush_some(&mut transport, 1);

        assert_eq!(transport.sent(), ["old-ram", "fresh"]);
        assert_eq!(disk_lines(&spool), vec!["backlog"]);
    }

    #[test]
    fn failed_inflight_send_stops_without_touching_lower_tiers() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 2);
        spool.enqueue("ram").expect("enqueue");
        seed_inflight(&spool, "claimed");
        let mut transport = MockTransport::new().with_replies([Reply::SendError]);

        let outcome = spool.flush_some(&mut transport, 5);

        assert_eq!(outcome, FlushOutcome { delivered: 0, halted: true });
        assert_eq!(spool.inflight().expect("inflight"), Some("claimed".to_string()));
        assert_eq!(spool.memory_len(), 1);
    }

    #[test]
    fn failed_disk_send_rolls_back_to_head() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 0);
        for p in ["D1", "D2", "D3"] {
            spool.enqueue(p).expect("enqueue");
        }
        let mut transport = MockTransport::new().with_replies([Reply::Ack, Reply::ReadError]);

        let outcome = spool.flush_some(&mut transport, 3);

        assert_eq!(outcome.delivered, 1);
        assert!(outcome.halted);
        assert_eq!(disk_lines(&spool), vec!["D2", "D3"]);
        assert_eq!(spool.inflight().expect("inflight"), None);
    }

    #[test]
    fn disconnected_transport_is_a_no_op() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 2);
        spool.enqueue("A").expect("enqueue");
        let mut transport = MockTransport::disconnected();

        let outcome = spool.flush_some(&mut transport, 10);

        assert_eq!(outcome, FlushOutcome::default());
        assert!(transport.sent().is_empty());
        assert_eq!(spool.memory_len(), 1);
    }

    #[test]
    fn zero_budget_flushes_one() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 4);
        spool.enqueue("A").expect("enqueue");
        spool.enqueue("B").expect("enqueue");
        let mut transport = MockTransport::new();

        assert_eq!(spool.flush_some(&mut transport, 0).delivered, 1);
        assert_eq!(spool.memory_len(), 1);
    }

    #[test]
    fn budget_limits_deliveries() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 0);
        for i in 0..5 {
            spool.enqueue(&format!("p{i}")).expect("enqueue");
        }
        let mut transport = MockTransport::new();

        let outcome = spool.flush_some(&mut transport, 2);

        assert_eq!(outcome, FlushOutcome { delivered: 2, halted: false });
        assert_eq!(spool.disk_len().expect("disk len"), 3);
    }

    #[test]
    fn send_and_await_ack_frames_payload() {
        let mut transport = MockTransport::new();
        Spool::send_and_await_ack(&mut transport, "hello").expect("ack");
        assert_eq!(transport.raw_frames(), [b"hello\n".to_vec()]);
    }

    #[test]
    fn send_and_await_ack_reports_rejection() {
        let mut transport =
            MockTransport::new().with_replies([Reply::Reject("{\"status\":\"fail\"}".to_string())]);

        let err = Spool::send_and_await_ack(&mut transport, "x").expect_err("rejected");
        assert!(matches!(
            err,
            DeliveryError::Rejected { ref response } if response == r#"{"status":"fail"}"#
        ));
    }

    #[test]
    fn payloads_survive_restart() {
        let dir = TempDir::new().expect("create temp dir");
        {
            let mut spool = open(&dir, 2);
            for p in ["A", "B", "C"] {
                spool.enqueue(p).expect("enqueue");
            }
            // Dropping spills RAM to disk.
        }

        let mut spool = open(&dir, 2);
        assert!(spool.has_pending_data());
        assert_eq!(spool.memory_len(), 0);
        assert_eq!(spool.disk_len().expect("disk len"), 3);

        let mut transport = MockTransport::new();
        let outcome = spool.flush_some(&mut transport, 10);
        assert_eq!(outcome.delivered, 3);
        let mut sent = transport.sent().to_vec();
        sent.sort();
        assert_eq!(sent, ["A", "B", "C"]);
    }

    #[test]
    fn inflight_survives_restart_and_is_sent_first() {
        let dir = TempDir::new().expect("create temp dir");
        {
            let mut spool = open(&dir, 0);
            spool.enqueue("first").expect("enqueue");
            spool.enqueue("second").expect("enqueue");
            // Simulate a crash after the head was claimed.
            assert_eq!(
                spool.claim_disk_head().expect("claim"),
                Some("first".to_string())
            );
        }

        let mut spool = open(&dir, 0);
        assert_eq!(spool.inflight().expect("inflight"), Some("first".to_string()));
        let mut transport = MockTransport::new();
        spool.flush_some(&mut transport, 10);
        assert_eq!(transport.sent(), ["first", "second"]);
    }

    #[test]
    fn drain_memory_to_disk_appends_in_order() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 3);
        spool.enqueue("A").expect("enqueue");
        spool.enqueue("B").expect("enqueue");

        assert_eq!(spool.drain_memory_to_disk().expect("drain"), 2);
        assert_eq!(spool.memory_len(), 0);
        assert_eq!(disk_lines(&spool), vec!["A", "B"]);
        assert_eq!(spool.drain_memory_to_disk().expect("drain again"), 0);
    }

    #[test]
    fn clear_all_empties_every_tier() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 1);
        spool.enqueue("A").expect("enqueue");
        spool.enqueue("B").expect("enqueue");
        seed_inflight(&spool, "C");
        assert!(spool.has_pending_data());

        spool.clear_all().expect("clear");

        assert!(!spool.has_pending_data());
        assert_eq!(spool.status().expect("status"), SpoolStatus::default());
    }

    #[test]
    fn status_reports_each_tier() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 1);
        spool.enqueue("A").expect("enqueue");
        spool.enqueue("B").expect("enqueue");
        spool.enqueue("C").expect("enqueue");
        seed_inflight(&spool, "D");

        let status = spool.status().expect("status");
        assert_eq!(status, SpoolStatus { memory: 1, disk: 2, inflight: true });
        assert_eq!(status.total(), 4);
    }

    #[test]
    fn blank_lines_in_queue_are_skipped() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 0);
        fs::write(spool.queue_path(), "\n\r\nA\n\nB\n").expect("seed");
        let mut transport = MockTransport::new();

        assert_eq!(spool.disk_len().expect("disk len"), 2);
        spool.flush_some(&mut transport, 10);

        assert_eq!(transport.sent(), ["A", "B"]);
        assert!(!spool.has_pending_data());
    }

    #[test]
    fn blank_inflight_slot_is_cleared() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 0);
        fs::write(spool.inflight_path(), "\n\r\n").expect("seed");
        fs::write(spool.queue_path(), "A\n").expect("seed");
        let mut transport = MockTransport::new();

        assert!(spool.has_pending_data());
        assert_eq!(spool.inflight().expect("inflight"), None);

        let outcome = spool.flush_some(&mut transport, 10);

        assert_eq!(outcome.delivered, 1);
        assert_eq!(transport.sent(), ["A"]);
        assert!(!spool.has_pending_data());
        assert_eq!(fs::metadata(spool.inflight_path()).expect("stat").len(), 0);
    }

    #[test]
    fn blank_inflight_slot_alone_is_not_pending_after_flush() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 4);
        fs::write(spool.inflight_path(), "\n").expect("seed");
        let mut transport = MockTransport::new();

        let outcome = spool.flush_some(&mut transport, 10);

        assert_eq!(outcome.delivered, 0);
        assert!(!outcome.halted);
        assert!(transport.sent().is_empty());
        assert!(!spool.has_pending_data());
    }

    #[test]
    fn append_repairs_torn_last_line() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 0);
        fs::write(spool.queue_path(), "A\ntorn").expect("seed");

        spool.enqueue("B").expect("enqueue");

        assert_eq!(disk_lines(&spool), vec!["A", "torn", "B"]);
    }

    #[test]
    fn interrupted_replace_leaves_queue_intact() {
        let dir = TempDir::new().expect("create temp dir");
        let mut spool = open(&dir, 0);
        spool.enqueue("A").expect("enqueue");
        spool.enqueue("B").expect("enqueue");
        // A crash mid-replace leaves only a stray temp file behind.
        fs::write(logward_persist::temp_path(spool.queue_path()), "B\n").expect("temp");

        assert_eq!(disk_lines(&spool), vec!["A", "B"]);
        let mut transport = MockTransport::new();
        spool.flush_some(&mut transport, 10);
        assert_eq!(transport.sent(), ["A", "B"]);
    }

    #[test]
    fn shared_spool_accepts_concurrent_producers() {
        let dir = TempDir::new().expect("create temp dir");
        let shared = Spool::open_shared(dir.path().join("spool"), 8).expect("open");

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let spool = Arc::clone(&shared);
                thread::spawn(move || {
                    for i in 0..5 {
                        spool.lock().enqueue(&format!("t{t}-{i}")).expect("enqueue");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("join");
        }

        let status = shared.lock().status().expect("status");
        assert_eq!(status.memory, 8);
        assert_eq!(status.disk, 12);
    }
}
