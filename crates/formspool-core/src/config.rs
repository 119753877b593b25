//! Upload limit configuration.
//!
//! [`MultipartConfig`] is the shape an application exposes to describe how
//! uploads are bounded and where they are spooled. [`UploadLimits`] is the
//! concrete, immutable value the decoder works from.
//!
//! # Example
//!
//! ```ignore
//! use formspool_core::UploadLimits;
//!
//! let limits = UploadLimits::new("/var/tmp/uploads")
//!     .with_size_limit(10 * 1024 * 1024)
//!     .with_file_size_limit(4 * 1024 * 1024);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default limit for the whole upload and for each file (2 MiB).
pub const DEFAULT_SIZE_LIMIT: u64 = 2 * 1024 * 1024;

/// Default maximum number of parts in one request.
pub const DEFAULT_MAX_PARTS: usize = 128;

/// Default maximum size of a single part's header block (8 KiB).
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;

/// Basic multipart upload configuration.
///
/// Applications implement this on their own settings type; the decoder
/// snapshots it into [`UploadLimits`] before reading any bytes.
pub trait MultipartConfig {
    /// Maximum number of body bytes across all parts.
    fn size_limit(&self) -> u64;

    /// Maximum number of body bytes in any single file part.
    fn file_size_limit(&self) -> u64;

    /// Directory where file parts are spooled.
    fn directory(&self) -> &Path;
}

/// Size limits and spool location for one decode.
///
/// `file_size_limit <= size_limit` is not enforced. Both limits
/// are checked on their own and whichever is crossed first is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadLimits {
    /// Maximum total body bytes.
    size_limit: u64,
    /// Maximum body bytes per file part.
    file_size_limit: u64,
    /// Spool directory. Must already exist.
    directory: PathBuf,
    /// Maximum number of parts.
    max_parts: usize,
    /// Maximum header block size per part.
    max_header_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_SIZE_LIMIT,
            file_size_limit: DEFAULT_SIZE_LIMIT,
            directory: std::env::temp_dir(),
            max_parts: DEFAULT_MAX_PARTS,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl UploadLimits {
    /// Create limits with default sizes spooling into `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Snapshot any [`MultipartConfig`] implementation.
    #[must_use]
    pub fn from_config<C: MultipartConfig + ?Sized>(config: &C) -> Self {
        Self {
            size_limit: config.size_limit(),
            file_size_limit: config.file_size_limit(),
            directory: config.directory().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load limits from a JSON document such as
    /// `{"sizeLimit": 1048576, "directory": "/tmp/up"}`.
    ///
    /// Missing keys take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Set the total size limit.
    #[must_use]
    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = bytes;
        self
    }

    /// Set the per-file size limit.
    #[must_use]
    pub fn with_file_size_limit(mut self, bytes: u64) -> Self {
        self.file_size_limit = bytes;
        self
    }

    /// Set the spool directory.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the maximum number of parts.
    #[must_use]
    pub fn with_max_parts(mut self, count: usize) -> Self {
        self.max_parts = count;
        self
    }

    /// Set the maximum header block size per part.
    #[must_use]
    pub fn with_max_header_bytes(mut self, bytes: usize) -> Self {
        self.max_header_bytes = bytes;
        self
    }

    /// Total size limit in bytes.
    #[must_use]
    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    /// Per-file size limit in bytes.
    #[must_use]
    pub fn file_size_limit(&self) -> u64 {
        self.file_size_limit
    }

    /// Spool directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Maximum number of parts.
    #[must_use]
    pub fn max_parts(&self) -> usize {
        self.max_parts
    }

    /// Maximum header block size per part.
    #[must_use]
    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }
}

impl MultipartConfig for UploadLimits {
    fn size_limit(&self) -> u64 {
        self.size_limit
    }

    fn file_size_limit(&self) -> u64 {
        self.file_size_limit
    }

    fn directory(&self) -> &Path {
        &self.directory
    }
}
