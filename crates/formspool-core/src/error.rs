//! Decode error taxonomy.
//!
//! Every variant is terminal for its session. Variants carry enough context
//! (part index, field name, byte offset) for the HTTP layer to build a precise
//! rejection message.

use std::io;
use std::path::PathBuf;

/// Why a stream stopped before the terminal boundary was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The consumer called `abort` or dropped the decoder.
    Aborted,
    /// The transport reported an error while reading.
    Transport,
    /// The attached cancellation context requested cancellation.
    Cancelled,
}

impl CloseReason {
    /// Short lowercase label, e.g. for log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aborted => "aborted",
            Self::Transport => "transport",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a decode session.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The stream does not follow multipart framing.
    #[error("malformed multipart stream at byte {offset}: {detail}")]
    MalformedStream {
        /// Stream offset where the problem was detected.
        offset: u64,
        /// What was expected.
        detail: &'static str,
    },
    /// A part's header block could not be parsed.
    #[error("malformed headers in part {part_index}: {detail}")]
    MalformedHeaders {
        /// Zero-based index of the offending part.
        part_index: usize,
        /// Description of the problem.
        detail: String,
    },
    /// The body bytes of all parts together exceed the total limit.
    #[error("total upload size exceeds limit of {limit} bytes at byte {offset}")]
    TotalSizeExceeded {
        /// The configured total limit.
        limit: u64,
        /// Stream offset of the first byte over the limit.
        offset: u64,
    },
    /// A file part exceeds the per-file limit.
    #[error("file field `{field}` exceeds limit of {limit} bytes")]
    FileSizeExceeded {
        /// Name of the offending form field.
        field: String,
        /// The configured per-file limit.
        limit: u64,
    },
    /// The stream ended before the terminal boundary.
    #[error("multipart stream truncated at byte {offset}")]
    TruncatedStream {
        /// Number of bytes received before the end.
        offset: u64,
    },
    /// The spool directory is unusable or a write failed.
    #[error("spool storage error{}: {source}", path_suffix(.path.as_ref()))]
    StorageError {
        /// The file or directory involved, when known.
        path: Option<PathBuf>,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The stream was closed or cancelled before completion.
    #[error("multipart stream closed ({reason}) at byte {offset}")]
    StreamClosed {
        /// Number of bytes received before closing.
        offset: u64,
        /// Who closed it.
        reason: CloseReason,
        /// Transport error, for [`CloseReason::Transport`].
        #[source]
        source: Option<io::Error>,
    },
    /// More parts than the configured maximum.
    #[error("too many parts: limit is {limit}")]
    TooManyParts {
        /// The configured maximum.
        limit: usize,
    },
}

fn path_suffix(path: Option<&PathBuf>) -> String {
    path.map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}

/// Copyable discriminant of [`DecodeError`], carried by the failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`DecodeError::MalformedStream`].
    MalformedStream,
    /// See [`DecodeError::MalformedHeaders`].
    MalformedHeaders,
    /// See [`DecodeError::TotalSizeExceeded`].
    TotalSizeExceeded,
    /// See [`DecodeError::FileSizeExceeded`].
    FileSizeExceeded,
    /// See [`DecodeError::TruncatedStream`].
    TruncatedStream,
    /// See [`DecodeError::StorageError`].
    StorageError,
    /// See [`DecodeError::StreamClosed`].
    StreamClosed,
    /// See [`DecodeError::TooManyParts`].
    TooManyParts,
}

impl ErrorKind {
    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedStream => "malformed_stream",
            Self::MalformedHeaders => "malformed_headers",
            Self::TotalSizeExceeded => "total_size_exceeded",
            Self::FileSizeExceeded => "file_size_exceeded",
            Self::TruncatedStream => "truncated_stream",
            Self::StorageError => "storage_error",
            Self::StreamClosed => "stream_closed",
            Self::TooManyParts => "too_many_parts",
        }
    }

    /// Returns true for the two size-limit kinds.
    #[must_use]
    pub fn is_size_limit(self) -> bool {
        matches!(self, Self::TotalSizeExceeded | Self::FileSizeExceeded)
    }
}

impl DecodeError {
    /// The kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedStream { .. } => ErrorKind::MalformedStream,
            Self::MalformedHeaders { .. } => ErrorKind::MalformedHeaders,
            Self::TotalSizeExceeded { .. } => ErrorKind::TotalSizeExceeded,
            Self::FileSizeExceeded { .. } => ErrorKind::FileSizeExceeded,
            Self::TruncatedStream { .. } => ErrorKind::TruncatedStream,
            Self::StorageError { .. } => ErrorKind::StorageError,
            Self::StreamClosed { .. } => ErrorKind::StreamClosed,
            Self::TooManyParts { .. } => ErrorKind::TooManyParts,
        }
    }

    pub(crate) fn storage(path: impl Into<Option<PathBuf>>, source: io::Error) -> Self {
        Self::StorageError {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn headers(part_index: usize, detail: impl Into<String>) -> Self {
        Self::MalformedHeaders {
            part_index,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = DecodeError::FileSizeExceeded {
            field: "avatar".to_string(),
            limit: 2,
        };
        assert_eq!(err.to_string(), "file field `avatar` exceeds limit of 2 bytes");

        let err = DecodeError::headers(3, "missing name parameter");
        assert_eq!(
            err.to_string(),
            "malformed headers in part 3: missing name parameter"
        );

        let err = DecodeError::TruncatedStream { offset: 42 };
        assert_eq!(err.to_string(), "multipart stream truncated at byte 42");
    }

    #[test]
    fn storage_error_mentions_path_and_source() {
        let err = DecodeError::storage(
            PathBuf::from("/nope"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "spool storage error at /nope: gone");
        assert!(std::error::Error::source(&err).is_some());

        let err = DecodeError::storage(None, io::Error::other("disk full"));
        assert_eq!(err.to_string(), "spool storage error: disk full");
    }

    #[test]
    fn kinds_and_labels() {
        let err = DecodeError::StreamClosed {
            offset: 9,
            reason: CloseReason::Cancelled,
            source: None,
        };
        assert_eq!(err.kind(), ErrorKind::StreamClosed);
        assert_eq!(err.to_string(), "multipart stream closed (cancelled) at byte 9");
        assert_eq!(err.kind().as_str(), "stream_closed");
        assert!(ErrorKind::TotalSizeExceeded.is_size_limit());
        assert!(!ErrorKind::TruncatedStream.is_size_limit());
    }
}
