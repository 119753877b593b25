//! Async multipart decoder over a chunked byte stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use asupersync::Cx;
use asupersync::stream::Stream;

use crate::config::UploadLimits;
use crate::error::{CloseReason, DecodeError};
use crate::form::UploadForm;
use crate::part::DecodedPart;
use crate::session::{DecodeSession, DecodeState, Step};

/// Start decoding `stream` as `multipart/form-data` delimited by `boundary`.
///
/// Nothing is read until the first part is requested. Fails up front if the
/// boundary is invalid or the spool directory does not exist.
pub fn decode<S, B>(
    stream: S,
    boundary: &str,
    limits: UploadLimits,
) -> Result<MultipartDecoder<S>, DecodeError>
where
    S: Stream<Item = io::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    MultipartDecoder::new(stream, boundary, limits)
}

/// Lazy, finite, non-restartable sequence of [`DecodedPart`]s.
///
/// Suspends only when the underlying stream is not ready. Dropping the
/// decoder before the terminal boundary behaves like [`abort`](Self::abort).
pub struct MultipartDecoder<S> {
    stream: S,
    session: DecodeSession,
    cancel: Option<Cx>,
    eof: bool,
}

impl<S, B> MultipartDecoder<S>
where
    S: Stream<Item = io::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    /// Create a decoder. See [`decode`].
    pub fn new(stream: S, boundary: &str, limits: UploadLimits) -> Result<Self, DecodeError> {
        Ok(Self {
            stream,
            session: DecodeSession::new(boundary, limits)?,
            cancel: None,
            eof: false,
        })
    }

    /// Stop with `StreamClosed` once `cx` requests cancellation.
    ///
    /// The context is checked before every read from the stream.
    #[must_use]
    pub fn with_cancellation(mut self, cx: Cx) -> Self {
        self.cancel = Some(cx);
        self
    }

    /// The attached cancellation context, if any.
    #[must_use]
    pub fn cancellation(&self) -> Option<&Cx> {
        self.cancel.as_ref()
    }

    /// Current decode state.
    #[must_use]
    pub fn state(&self) -> DecodeState {
        self.session.state()
    }

    /// Session counters and limits.
    #[must_use]
    pub fn session(&self) -> &DecodeSession {
        &self.session
    }

    /// Poll for the next part.
    ///
    /// `Ok(None)` means the sequence is over: either the terminal boundary
    /// was read or an error was already returned.
    pub fn poll_next_part(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<DecodedPart>, DecodeError>> {
        loop {
            match self.session.advance(self.eof) {
                Ok(Step::Part(part)) => return Poll::Ready(Ok(Some(part))),
                Ok(Step::Done) => return Poll::Ready(Ok(None)),
                Ok(Step::NeedMore) => {}
                Err(err) => return Poll::Ready(Err(err)),
            }

            if self.cancel.as_ref().is_some_and(|c| c.checkpoint().is_err()) {
                return Poll::Ready(self.close(CloseReason::Cancelled, None));
            }

            match Pin::new(&mut self.stream).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => self.session.push(chunk.as_ref()),
                Poll::Ready(Some(Err(err))) => {
                    return Poll::Ready(self.close(CloseReason::Transport, Some(err)));
                }
                Poll::Ready(None) => self.eof = true,
            }
        }
    }

    /// Wait for the next part.
    pub async fn next_part(&mut self) -> Result<Option<DecodedPart>, DecodeError> {
        std::future::poll_fn(|cx| self.poll_next_part(cx)).await
    }

    /// Abort decoding and remove every file spooled so far. Idempotent.
    pub fn abort(&mut self) {
        self.session.abort();
    }

    /// Decode the remaining parts into an [`UploadForm`].
    pub async fn collect(mut self) -> Result<UploadForm, DecodeError> {
        let mut parts = Vec::new();
        while let Some(part) = self.next_part().await? {
            parts.push(part);
        }
        Ok(UploadForm::from_parts(parts))
    }

    fn close(
        &mut self,
        reason: CloseReason,
        source: Option<io::Error>,
    ) -> Result<Option<DecodedPart>, DecodeError> {
        match self.session.close(reason, source) {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

impl<S, B> Stream for MultipartDecoder<S>
where
    S: Stream<Item = io::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<DecodedPart, DecodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_next_part(cx).map(Result::transpose)
    }
}

impl<S> std::fmt::Debug for MultipartDecoder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartDecoder")
            .field("state", &self.session.state())
            .field("bytes_received", &self.session.bytes_received())
            .field("eof", &self.eof)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}
