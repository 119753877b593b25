//! Boundary extraction from a request `Content-Type`.

use formspool_core::validate_boundary;

/// Why a `Content-Type` value does not yield a usable boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoundaryError {
    /// The media type is not `multipart/form-data`.
    #[error("expected multipart/form-data, got `{media_type}`")]
    NotMultipart {
        /// The media type that was sent.
        media_type: String,
    },
    /// No `boundary` parameter.
    #[error("missing boundary in multipart Content-Type")]
    Missing,
    /// The boundary is not a valid RFC 2046 boundary.
    #[error("invalid multipart boundary: {detail}")]
    Invalid {
        /// What is wrong with it.
        detail: &'static str,
    },
}

/// Parse the boundary from a `Content-Type` header value.
///
/// Format: `multipart/form-data; boundary=----WebKitFormBoundary...`. The
/// parameter name is case-insensitive and the value may be quoted.
pub fn parse_boundary(content_type: &str) -> Result<String, BoundaryError> {
    let mut params = content_type.trim().split(';');
    let media_type = params.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return Err(BoundaryError::NotMultipart {
            media_type: media_type.to_string(),
        });
    }

    for param in params {
        let Some((key, value)) = param.trim().split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("boundary") {
            continue;
        }

        let value = value.trim();
        let boundary = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        validate_boundary(boundary).map_err(|detail| BoundaryError::Invalid { detail })?;
        return Ok(boundary.to_string());
    }

    Err(BoundaryError::Missing)
}
