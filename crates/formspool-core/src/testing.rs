//! Helpers for exercising decoders without a live connection.
//!
//! [`FormBuilder`] produces well-formed request bodies and [`ChunkedBody`]
//! replays them as a chunked byte stream, optionally interleaving
//! `Pending` polls and a trailing transport error.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use asupersync::stream::Stream;

/// In-memory body stream that yields pre-split chunks.
#[derive(Debug, Default)]
pub struct ChunkedBody {
    chunks: VecDeque<io::Result<Vec<u8>>>,
    yielding: bool,
    parked: bool,
}

impl ChunkedBody {
    /// Yield `chunks` in order.
    #[must_use]
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Ok).collect(),
            yielding: false,
            parked: false,
        }
    }

    /// Split `body` into chunks of at most `chunk_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    #[must_use]
    pub fn split(body: &[u8], chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self::new(body.chunks(chunk_size).map(<[u8]>::to_vec))
    }

    /// Fail with `err` after the remaining chunks.
    #[must_use]
    pub fn with_error(mut self, err: io::Error) -> Self {
        self.chunks.push_back(Err(err));
        self
    }

    /// Return `Pending` once before every item, waking immediately.
    #[must_use]
    pub fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    /// Items not yet yielded.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl Stream for ChunkedBody {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.yielding && !self.parked && !self.chunks.is_empty() {
            self.parked = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.parked = false;
        Poll::Ready(self.chunks.pop_front())
    }
}

/// Builder for `multipart/form-data` bodies.
#[derive(Debug, Clone)]
pub struct FormBuilder {
    boundary: String,
    body: Vec<u8>,
}

impl FormBuilder {
    /// Start a body delimited by `boundary`.
    #[must_use]
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: Vec::new(),
        }
    }

    /// The boundary in use.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `Content-Type` header value for this body.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Append a text field.
    #[must_use]
    pub fn field(self, name: &str, value: impl AsRef<[u8]>) -> Self {
        let disposition = format!("form-data; name=\"{name}\"");
        self.part(&[("Content-Disposition", disposition.as_str())], value)
    }

    /// Append a file part.
    #[must_use]
    pub fn file(
        self,
        name: &str,
        filename: &str,
        content_type: &str,
        data: impl AsRef<[u8]>,
    ) -> Self {
        let disposition = format!("form-data; name=\"{name}\"; filename=\"{filename}\"");
        self.part(
            &[
                ("Content-Disposition", disposition.as_str()),
                ("Content-Type", content_type),
            ],
            data,
        )
    }

    /// Append a part with arbitrary headers.
    #[must_use]
    pub fn part(mut self, headers: &[(&str, &str)], data: impl AsRef<[u8]>) -> Self {
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        for (name, value) in headers {
            self.body.extend_from_slice(name.as_bytes());
            self.body.extend_from_slice(b": ");
            self.body.extend_from_slice(value.as_bytes());
            self.body.extend_from_slice(b"\r\n");
        }
        self.body.extend_from_slice(b"\r\n");
        self.body.extend_from_slice(data.as_ref());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Close the body with the terminal boundary.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"--\r\n");
        self.body
    }

    /// The body so far, without a terminal boundary.
    #[must_use]
    pub fn unterminated(self) -> Vec<u8> {
        self.body
    }
}
