//! Streaming `multipart/form-data` decoding for upload handling.
//!
//! This crate provides the pieces an upload interceptor needs once the HTTP
//! layer has handed over a request body:
//! - [`UploadLimits`] and the [`MultipartConfig`] capability trait
//! - [`MultipartDecoder`], a lazy sequence of [`DecodedPart`]s read from a
//!   chunked byte stream
//! - [`SpooledFile`] handles for file parts written to the spool directory
//! - [`UploadForm`] for callers that want the whole form at once
//!
//! # Design Principles
//!
//! - File bodies never sit in memory; they are written as they arrive
//! - Limits are checked before bytes are stored, never after
//! - A failed, aborted or dropped decode leaves no temp files behind
//! - Sessions share nothing but the spool directory
//!
//! # Example
//!
//! ```ignore
//! use formspool_core::{UploadLimits, decode};
//!
//! let limits = UploadLimits::new("/var/tmp/uploads").with_file_size_limit(512 * 1024);
//! let mut decoder = decode(body_stream, "XYZ", limits)?;
//!
//! while let Some(part) = decoder.next_part().await? {
//!     if let Some(file) = part.as_file() {
//!         println!("{} -> {}", part.name(), file.path().display());
//!     }
//! }
//! ```

#![forbid(unsafe_code)]

pub mod config;
mod decoder;
pub mod error;
mod form;
mod headers;
mod part;
mod session;
mod spool;
pub mod testing;

pub use config::{
    DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_PARTS, DEFAULT_SIZE_LIMIT, MultipartConfig,
    UploadLimits,
};
pub use decoder::{MultipartDecoder, decode};
pub use error::{CloseReason, DecodeError, ErrorKind};
pub use form::UploadForm;
pub use headers::{MAX_BOUNDARY_LEN, validate_boundary};
pub use part::{DecodedPart, PartBody, PartHeader, SpooledFile};
pub use session::{DecodeSession, DecodeState, Step};
