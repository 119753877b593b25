//! HTTP edge for formspool.
//!
//! Turns a request's `Content-Type` and body stream into a
//! [`MultipartDecoder`], and turns decode failures into client-facing
//! [`Rejection`]s. The decoder types are re-exported from `formspool-core` so
//! handlers only need this crate.
//!
//! # Example
//!
//! ```ignore
//! use formspool_http::{Rejection, UploadLimits, decode_request};
//!
//! let limits = UploadLimits::new("/var/tmp/uploads");
//! let result = match decode_request(content_type, body, limits) {
//!     Ok(decoder) => decoder.collect().await.map_err(Rejection::from),
//!     Err(err) => Err(Rejection::from(err)),
//! };
//! if let Err(rejection) = result {
//!     respond(rejection.status().as_u16(), rejection.body_bytes());
//! }
//! ```

#![forbid(unsafe_code)]

mod boundary;
mod rejection;

use std::io;

use asupersync::stream::Stream;

pub use boundary::{BoundaryError, parse_boundary};
pub use formspool_core::{
    CloseReason, DEFAULT_SIZE_LIMIT, DecodeError, DecodeState, DecodedPart, ErrorKind,
    MultipartConfig, MultipartDecoder, PartBody, PartHeader, SpooledFile, UploadForm,
    UploadLimits, decode,
};
pub use rejection::{Rejection, StatusCode};

/// Failure to start decoding a request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The `Content-Type` has no usable boundary.
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
    /// The decoder could not be created.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Start decoding a request body described by `content_type`.
pub fn decode_request<S, B>(
    content_type: &str,
    body: S,
    limits: UploadLimits,
) -> Result<MultipartDecoder<S>, RequestError>
where
    S: Stream<Item = io::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let boundary = parse_boundary(content_type).inspect_err(|err| {
        tracing::debug!(
            target: "formspool::http",
            content_type,
            error = %err,
            "rejecting upload content type"
        );
    })?;
    Ok(decode(body, &boundary, limits)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use formspool_core::testing::{ChunkedBody, FormBuilder};
    use futures_executor::block_on;

    #[test]
    fn decodes_with_boundary_from_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let builder = FormBuilder::new("----WebKitFormBoundary7MA4YWxkTrZu0gW");
        let content_type = builder.content_type();
        let body = builder.field("q", "rust").finish();

        let decoder = decode_request(
            &content_type,
            ChunkedBody::split(&body, 9),
            UploadLimits::new(dir.path()),
        )
        .unwrap();
        let form = block_on(decoder.collect()).unwrap();
        assert_eq!(form.get_field("q"), Some("rust"));
    }

    #[test]
    fn bad_content_type_is_a_boundary_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = decode_request(
            "text/plain",
            ChunkedBody::new(Vec::new()),
            UploadLimits::new(dir.path()),
        )
        .unwrap_err();
        assert!(matches!(err, RequestError::Boundary(BoundaryError::NotMultipart { .. })));
        assert_eq!(Rejection::from(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_directory_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = decode_request(
            "multipart/form-data; boundary=XYZ",
            ChunkedBody::new(Vec::new()),
            UploadLimits::new(dir.path().join("gone")),
        )
        .unwrap_err();
        let rejection = Rejection::from(err);
        assert_eq!(rejection.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
