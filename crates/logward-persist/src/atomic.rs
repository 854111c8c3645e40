//! Atomic whole-file replacement.
//!
//! Every mutation of persistent state goes through [`replace_with`]: the new
//! contents are written to `<target>.tmp`, synced, and renamed over the
//! target. A crash at any point leaves either the old or the new contents,
//! never a torn file.
//!
//! If the rename fails (for example because the target is held open on a
//! platform that refuses to rename over it), the target is deleted and the
//! rename is retried once. If that also fails the temp file is removed and
//! [`PersistError::Replace`] is returned.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

use crate::error::{PersistError, Result};

/// Returns the temp file path used while replacing `target`.
#[must_use]
pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(OsString::new, std::ffi::OsStr::to_os_string);
    name.push(".tmp");
    target.with_file_name(name)
}

/// Atomically replaces `target` with `contents`.
///
/// # Errors
///
/// Returns an error if the temp file cannot be written or moved into place.
pub fn replace_file(target: &Path, contents: &[u8]) -> Result<()> {
    replace_with(target, |out| out.write_all(contents))
}

/// Atomically replaces `target` with whatever `write` produces.
///
/// The closure receives a buffered writer over the temp file. This lets
/// callers stream large contents (e.g. copy the remainder of a queue file)
/// without holding them in memory.
///
/// # Errors
///
/// Returns an error if the closure fails, the temp file cannot be synced, or
/// the final rename fails. In every error case the temp file is removed.
pub fn replace_with<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let tmp = temp_path(target);

    if let Err(e) = write_temp(&tmp, write) {
        discard_temp(&tmp);
        return Err(e.into());
    }

    install(&tmp, target)?;

    if let Some(parent) = target.parent() {
        if let Err(e) = sync_dir(parent) {
            trace!(path = %parent.display(), error = %e, "directory sync skipped");
        }
    }
    Ok(())
}

fn write_temp<F>(tmp: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp)?;
    let mut out = BufWriter::new(file);
    write(&mut out)?;
    out.flush()?;
    out.get_ref().sync_all()
}

fn install(tmp: &Path, target: &Path) -> Result<()> {
    let Err(first) = fs::rename(tmp, target) else {
        return Ok(());
    };
    warn!(
        path = %target.display(),
        error = %first,
        "rename over target failed, retrying after delete"
    );

    match fs::remove_file(target) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => trace!(path = %target.display(), error = %e, "could not delete target"),
    }

    fs::rename(tmp, target).map_err(|source| {
        discard_temp(tmp);
        PersistError::Replace {
            path: target.to_path_buf(),
            source,
        }
    })
}

fn discard_temp(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %tmp.display(), error = %e, "failed to remove temp file");
        }
    }
}

/// Syncs a directory so a rename into it survives power loss.
fn sync_dir(dir: &Path) -> io::Result<()> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    File::open(dir)?.sync_all()
}
