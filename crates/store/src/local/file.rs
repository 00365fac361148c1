//! JSON snapshot file shared between processes.
//!
//! Every access holds a `flock` on a sibling `.lock` file: shared for reads,
//! exclusive for read-modify-write. Under the lock the snapshot is reloaded
//! whenever its stamp differs from the one this process last saw, so writes
//! from another process (the admin CLI next to a worker) are never lost.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use tracing::debug;

use crate::error::StoreError;

use super::state::{Snapshot, StoreState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

/// Identity of one written version of the snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    inode: u64,
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Option<Self>, StoreError> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Self {
            inode: inode(&meta),
            modified: meta.modified()?,
            len: meta.len(),
        }))
    }
}

#[cfg(unix)]
fn inode(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_: &std::fs::Metadata) -> u64 {
    0
}

/// Held for the duration of one store operation; dropping it releases the lock.
pub(crate) struct FileLock {
    _file: File,
}

pub(crate) struct SnapshotFile {
    path: PathBuf,
    lock_path: PathBuf,
    /// Stamp of the snapshot last loaded or written by this process.
    /// Only touched while the caller holds the state write guard.
    seen: Mutex<Option<FileStamp>>,
}

impl SnapshotFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            lock_path: sibling(&path, ".lock"),
            path,
            seen: Mutex::new(None),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Block until this process holds the cross-process lock in `mode`.
    pub(crate) fn lock(&self, mode: LockMode) -> Result<FileLock, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;
        acquire_blocking(&file, mode)?;
        Ok(FileLock { _file: file })
    }

    /// Reload `state` from disk if the file changed since this process last saw it.
    pub(crate) fn refresh(&self, state: &mut StoreState) -> Result<(), StoreError> {
        let current = FileStamp::of(&self.path)?;
        let mut seen = self
            .seen
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        if *seen == current {
            return Ok(());
        }

        *state = match current {
            Some(_) => {
                let json = std::fs::read_to_string(&self.path)?;
                let snapshot: Snapshot = serde_json::from_str(&json)?;
                StoreState::from(snapshot)
            }
            None => StoreState::default(),
        };
        if seen.is_some() {
            debug!(path = %self.path.display(), "store snapshot changed on disk, reloaded");
        }
        *seen = current;
        Ok(())
    }

    /// Write `state` to a temporary sibling and rename it into place.
    pub(crate) fn write(&self, state: &StoreState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&Snapshot::from(state))?;
        let tmp = sibling(&self.path, ".tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        let stamp = FileStamp::of(&self.path)?;
        *self
            .seen
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))? = stamp;
        debug!(path = %self.path.display(), "store snapshot written");
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn acquire_blocking(file: &File, mode: LockMode) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let op = match mode {
        LockMode::Shared => libc::LOCK_SH,
        LockMode::Exclusive => libc::LOCK_EX,
    };
    let fd = file.as_raw_fd();
    loop {
        // SAFETY: `fd` belongs to `file`, which outlives this call, and
        // LOCK_SH / LOCK_EX are valid `flock` operations.
        let rc = unsafe { libc::flock(fd, op) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(unix))]
fn acquire_blocking(_: &File, _: LockMode) -> io::Result<()> {
    Ok(())
}
