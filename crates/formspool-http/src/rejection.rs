//! Mapping decode failures to HTTP rejections.

use formspool_core::{DecodeError, ErrorKind};

use crate::RequestError;
use crate::boundary::BoundaryError;

/// HTTP status code of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// 400 Bad Request.
    pub const BAD_REQUEST: Self = Self(400);
    /// 413 Payload Too Large.
    pub const PAYLOAD_TOO_LARGE: Self = Self(413);
    /// 499 Client Closed Request (nginx convention).
    pub const CLIENT_CLOSED_REQUEST: Self = Self(499);
    /// 500 Internal Server Error.
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);

    /// Numeric code.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Canonical reason phrase.
    #[must_use]
    pub fn canonical_reason(self) -> &'static str {
        match self.0 {
            400 => "Bad Request",
            413 => "Payload Too Large",
            499 => "Client Closed Request",
            500 => "Internal Server Error",
            _ => "",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.canonical_reason())
    }
}

/// A client-facing rejection derived from an upload failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    status: StatusCode,
    kind: &'static str,
    detail: String,
    field: Option<String>,
    limit: Option<u64>,
}

impl Rejection {
    /// Classify a decode error.
    #[must_use]
    pub fn from_error(err: &DecodeError) -> Self {
        let status = match err.kind() {
            ErrorKind::TotalSizeExceeded | ErrorKind::FileSizeExceeded => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ErrorKind::MalformedStream
            | ErrorKind::MalformedHeaders
            | ErrorKind::TruncatedStream
            | ErrorKind::TooManyParts => StatusCode::BAD_REQUEST,
            ErrorKind::StreamClosed => StatusCode::CLIENT_CLOSED_REQUEST,
            ErrorKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let (field, limit) = match err {
            DecodeError::FileSizeExceeded { field, limit } => (Some(field.clone()), Some(*limit)),
            DecodeError::TotalSizeExceeded { limit, .. } => (None, Some(*limit)),
            DecodeError::TooManyParts { limit } => (None, u64::try_from(*limit).ok()),
            _ => (None, None),
        };

        // Never leak spool paths or I/O details to the client.
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "upload storage unavailable".to_string()
        } else {
            err.to_string()
        };

        Self {
            status,
            kind: err.kind().as_str(),
            detail,
            field,
            limit,
        }
    }

    /// Classify a `Content-Type` problem. Always 400.
    #[must_use]
    pub fn from_boundary_error(err: &BoundaryError) -> Self {
        let kind = match err {
            BoundaryError::NotMultipart { .. } => "not_multipart",
            BoundaryError::Missing => "missing_boundary",
            BoundaryError::Invalid { .. } => "invalid_boundary",
        };
        Self {
            status: StatusCode::BAD_REQUEST,
            kind,
            detail: err.to_string(),
            field: None,
            limit: None,
        }
    }

    /// HTTP status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable machine-readable kind, e.g. `file_size_exceeded`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Human-readable message.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Offending field, for per-file limit failures.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// The limit that was exceeded, if any.
    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// JSON body: `{"detail": ..., "kind": ...}` plus `field` and `limit`
    /// when known.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "detail": self.detail,
            "kind": self.kind,
        });
        if let Some(field) = &self.field {
            body["field"] = serde_json::Value::from(field.as_str());
        }
        if let Some(limit) = self.limit {
            body["limit"] = serde_json::Value::from(limit);
        }
        body
    }

    /// Serialized JSON body bytes.
    #[must_use]
    pub fn body_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}

impl From<&DecodeError> for Rejection {
    fn from(err: &DecodeError) -> Self {
        Self::from_error(err)
    }
}

impl From<DecodeError> for Rejection {
    fn from(err: DecodeError) -> Self {
        Self::from_error(&err)
    }
}

impl From<BoundaryError> for Rejection {
    fn from(err: BoundaryError) -> Self {
        Self::from_boundary_error(&err)
    }
}

impl From<RequestError> for Rejection {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Boundary(err) => Self::from_boundary_error(&err),
            RequestError::Decode(err) => Self::from_error(&err),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.detail)
    }
}
