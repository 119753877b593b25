//! Decoded part types.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::spool::{SpoolLedger, remove_quietly};

/// Parsed headers of one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeader {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    headers: HashMap<String, String>,
}

impl PartHeader {
    pub(crate) fn new(
        name: String,
        filename: Option<String>,
        content_type: Option<String>,
        headers: HashMap<String, String>,
    ) -> Self {
        Self {
            name,
            filename,
            content_type,
            headers,
        }
    }

    /// Field name from `Content-Disposition`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filename exactly as the client sent it, if any.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Filename with any client-side directory components removed.
    ///
    /// Returns `None` when there is no filename or nothing usable is left
    /// (empty, `.` or `..`).
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        let raw = self.filename.as_deref()?;
        let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
        match base {
            "" | "." | ".." => None,
            name => Some(name),
        }
    }

    /// The part's `Content-Type`, if present.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Look up any header by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers, keyed by lower-cased name.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Returns true if `Content-Disposition` carried a filename.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }
}

/// A file part written to the spool directory.
///
/// Until the decode terminates, the file belongs to the session and is
/// removed if the session fails. Afterwards it belongs to this handle:
/// dropping it removes the file unless it was claimed with
/// [`into_path`](Self::into_path) or moved with [`persist`](Self::persist).
#[derive(Debug)]
pub struct SpooledFile {
    path: PathBuf,
    len: u64,
    claimed: bool,
    ledger: Arc<SpoolLedger>,
}

impl SpooledFile {
    pub(crate) fn new(path: PathBuf, len: u64, ledger: Arc<SpoolLedger>) -> Self {
        Self {
            path,
            len,
            claimed: false,
            ledger,
        }
    }

    /// Current location of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for a zero-length upload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true once the caller took responsibility for the file.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    /// Returns true once the session that wrote this file has terminated
    /// successfully, so the file can no longer be removed by a decode
    /// failure.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.ledger.is_committed()
    }

    /// Open the file for reading.
    pub fn open(&self) -> io::Result<File> {
        File::open(&self.path)
    }

    /// Read the whole file into memory.
    pub fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Move the file to `dest` and claim it.
    ///
    /// Falls back to copy-and-remove when a rename is not possible (for
    /// example across filesystems). On error the file stays where it was;
    /// a copy made before the original could not be removed is deleted.
    pub fn persist(&mut self, dest: impl AsRef<Path>) -> io::Result<()> {
        let dest = dest.as_ref();
        if std::fs::rename(&self.path, dest).is_err() {
            copy_then_remove(&self.path, dest, remove_quietly)?;
        }
        self.path = dest.to_path_buf();
        self.claimed = true;
        Ok(())
    }

    /// Claim the file and return its path. The caller must delete it.
    ///
    /// If the decode has not terminated yet and later fails, the file is
    /// still removed with the rest of the session.
    #[must_use]
    pub fn into_path(mut self) -> PathBuf {
        self.claimed = true;
        std::mem::take(&mut self.path)
    }

    /// Remove the file now.
    pub fn delete(mut self) -> io::Result<()> {
        self.claimed = true;
        remove_quietly(&self.path)
    }
}

/// Copy `src` to `dest`, then remove `src`. If the removal fails the copy is
/// deleted so only one of the two paths holds the data.
fn copy_then_remove(
    src: &Path,
    dest: &Path,
    remove: impl Fn(&Path) -> io::Result<()>,
) -> io::Result<()> {
    std::fs::copy(src, dest)?;
    if let Err(err) = remove(src) {
        let _ = remove_quietly(dest);
        return Err(err);
    }
    Ok(())
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        if self.claimed {
            return;
        }
        if let Err(err) = remove_quietly(&self.path) {
            tracing::warn!(
                target: "formspool::spool",
                path = %self.path.display(),
                error = %err,
                "failed to remove unclaimed spooled file"
            );
        }
    }
}

/// The body of a decoded part.
#[derive(Debug)]
pub enum PartBody {
    /// A form field, held in memory.
    Field(Vec<u8>),
    /// A file upload, spooled to disk.
    File(SpooledFile),
}

/// One decoded part: headers plus body.
#[derive(Debug)]
pub struct DecodedPart {
    header: PartHeader,
    body: PartBody,
}

impl DecodedPart {
    pub(crate) fn new(header: PartHeader, body: PartBody) -> Self {
        Self { header, body }
    }

    /// Parsed headers.
    #[must_use]
    pub fn header(&self) -> &PartHeader {
        &self.header
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.header.name()
    }

    /// Returns true if this part is a file upload.
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self.body, PartBody::File(_))
    }

    /// Returns true if this part is a regular form field.
    #[must_use]
    pub fn is_field(&self) -> bool {
        matches!(self.body, PartBody::Field(_))
    }

    /// Body size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        match &self.body {
            PartBody::Field(data) => data.len() as u64,
            PartBody::File(file) => file.len(),
        }
    }

    /// Returns true if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The body.
    #[must_use]
    pub fn body(&self) -> &PartBody {
        &self.body
    }

    /// In-memory value of a form field.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        match &self.body {
            PartBody::Field(data) => Some(data),
            PartBody::File(_) => None,
        }
    }

    /// Form field value as UTF-8, if it is a field and valid UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.value().and_then(|v| std::str::from_utf8(v).ok())
    }

    /// The spooled file of a file part.
    #[must_use]
    pub fn as_file(&self) -> Option<&SpooledFile> {
        match &self.body {
            PartBody::File(file) => Some(file),
            PartBody::Field(_) => None,
        }
    }

    /// Mutable access to the spooled file, e.g. to [`persist`](SpooledFile::persist) it.
    pub fn as_file_mut(&mut self) -> Option<&mut SpooledFile> {
        match &mut self.body {
            PartBody::File(file) => Some(file),
            PartBody::Field(_) => None,
        }
    }

    /// Read the body regardless of where it is stored.
    pub fn bytes(&self) -> io::Result<Vec<u8>> {
        match &self.body {
            PartBody::Field(data) => Ok(data.clone()),
            PartBody::File(file) => file.read_to_vec(),
        }
    }

    /// Take the spooled file out of a file part.
    #[must_use]
    pub fn into_file(self) -> Option<SpooledFile> {
        match self.body {
            PartBody::File(file) => Some(file),
            PartBody::Field(_) => None,
        }
    }

    /// Split into header and body.
    #[must_use]
    pub fn into_parts(self) -> (PartHeader, PartBody) {
        (self.header, self.body)
    }
}
