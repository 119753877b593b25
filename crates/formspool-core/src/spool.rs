//! Temp file creation and per-session cleanup.
//!
//! Every file a session creates is recorded in its [`SpoolLedger`]. If the
//! session fails, the ledger removes them all; if it terminates normally the
//! ledger is committed and each [`SpooledFile`](crate::SpooledFile) owns its
//! own file from then on.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

const SPOOL_PREFIX: &str = "formspool-";
const SPOOL_SUFFIX: &str = ".part";
const CREATE_ATTEMPTS: usize = 8;

/// Create a fresh, exclusively-owned temp file inside `dir`.
///
/// Names are random; `create_new` makes the filesystem reject any collision,
/// in which case another name is tried.
pub(crate) fn create_spool_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    for _ in 0..CREATE_ATTEMPTS {
        let candidate = dir.join(format!(
            "{SPOOL_PREFIX}{}{SPOOL_SUFFIX}",
            uuid::Uuid::new_v4().simple()
        ));

        match OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "failed to allocate unique spool file",
    ))
}

/// Check that `dir` exists and is a directory. It is never created here.
pub(crate) fn check_directory(dir: &Path) -> io::Result<()> {
    let meta = std::fs::metadata(dir)?;
    if meta.is_dir() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            "spool path is not a directory",
        ))
    }
}

/// Remove a file, treating "already gone" as success.
pub(crate) fn remove_quietly(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Open,
    Committed,
    Discarded,
}

#[derive(Debug)]
struct LedgerState {
    paths: Vec<PathBuf>,
    settlement: Settlement,
}

/// Record of the temp files created by one decode session.
#[derive(Debug)]
pub(crate) struct SpoolLedger {
    state: Mutex<LedgerState>,
}

impl SpoolLedger {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                paths: Vec::new(),
                settlement: Settlement::Open,
            }),
        }
    }

    pub(crate) fn register(&self, path: PathBuf) {
        self.state.lock().paths.push(path);
    }

    /// Hand ownership of every recorded file to its `SpooledFile`.
    pub(crate) fn commit(&self) {
        let mut state = self.state.lock();
        if state.settlement == Settlement::Open {
            state.paths.clear();
            state.settlement = Settlement::Committed;
        }
    }

    /// Delete every recorded file. Returns how many paths were processed.
    ///
    /// Paths are forgotten as they are handled, so a second call is a no-op.
    /// After a commit this does nothing.
    pub(crate) fn discard(&self) -> usize {
        let paths = {
            let mut state = self.state.lock();
            if state.settlement == Settlement::Committed {
                return 0;
            }
            state.settlement = Settlement::Discarded;
            std::mem::take(&mut state.paths)
        };

        for path in &paths {
            if let Err(err) = remove_quietly(path) {
                tracing::warn!(
                    target: "formspool::spool",
                    path = %path.display(),
                    error = %err,
                    "failed to remove spooled file during cleanup"
                );
            }
        }
        paths.len()
    }

    /// Returns true once the session ended successfully.
    pub(crate) fn is_committed(&self) -> bool {
        self.state.lock().settlement == Settlement::Committed
    }

    /// Returns true once the session's files were discarded.
    pub(crate) fn is_discarded(&self) -> bool {
        self.state.lock().settlement == Settlement::Discarded
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.state.lock().paths.len()
    }
}
