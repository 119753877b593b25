//! Byte-level decode state machine.
//!
//! [`DecodeSession`] is fed raw chunks with [`push`](DecodeSession::push) and
//! asked for progress with [`advance`](DecodeSession::advance). It never
//! performs stream I/O itself, which keeps it usable from any runtime and
//! easy to test with hand-made chunkings.
//!
//! ```text
//! AwaitingBoundary -> ReadingHeaders -> ReadingBody -> AwaitingBoundary
//!                                                   \-> Terminated
//! any state -> Failed(kind)
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use memchr::memmem;

use crate::config::UploadLimits;
use crate::error::{CloseReason, DecodeError, ErrorKind};
use crate::headers::{parse_part_header, validate_boundary};
use crate::part::{DecodedPart, PartBody, PartHeader, SpooledFile};
use crate::spool::{SpoolLedger, check_directory, create_spool_file};

/// Whitespace allowed between a delimiter and its CRLF.
const MAX_TRANSPORT_PADDING: usize = 64;

/// Public view of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Expecting a boundary delimiter.
    AwaitingBoundary,
    /// Reading a part's header block.
    ReadingHeaders,
    /// Streaming a part's body.
    ReadingBody,
    /// The terminal boundary was seen.
    Terminated,
    /// Decoding failed with the given kind.
    Failed(ErrorKind),
}

impl DecodeState {
    /// Returns true for `Terminated` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed(_))
    }
}

/// Result of one [`DecodeSession::advance`] call.
#[derive(Debug)]
pub enum Step {
    /// A complete part.
    Part(DecodedPart),
    /// Buffered bytes are exhausted; push more.
    NeedMore,
    /// The session is over. No more parts will be produced.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Before the first delimiter.
    Opening,
    /// Just after `--boundary`: expecting `--`, or padding then CRLF.
    DelimiterTail,
    Headers,
    Body,
    Terminated,
    Failed(ErrorKind),
}

#[derive(Debug)]
enum Sink {
    Memory(Vec<u8>),
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
}

#[derive(Debug)]
struct ActivePart {
    header: PartHeader,
    size: u64,
    sink: Sink,
}

enum Scan {
    /// A delimiter starts at this offset.
    Found(usize),
    /// A match starts here but its suffix has not arrived yet.
    Undecided(usize),
    NotFound,
}

/// One decode session over one request body.
#[derive(Debug)]
pub struct DecodeSession {
    /// `--boundary`
    delimiter: Vec<u8>,
    /// `\r\n--boundary`, the delimiter as it appears after a body.
    body_delimiter: memmem::Finder<'static>,
    limits: UploadLimits,
    ledger: Arc<SpoolLedger>,
    buffer: Vec<u8>,
    /// Stream bytes already drained from `buffer`.
    consumed: u64,
    total_size: u64,
    part_count: usize,
    stage: Stage,
    current: Option<ActivePart>,
}

impl DecodeSession {
    /// Start a session for `boundary`.
    ///
    /// Fails with `MalformedStream` for a boundary outside the RFC 2046
    /// grammar and with `StorageError` if the spool directory does not exist.
    pub fn new(boundary: &str, limits: UploadLimits) -> Result<Self, DecodeError> {
        validate_boundary(boundary)
            .map_err(|detail| DecodeError::MalformedStream { offset: 0, detail })?;
        check_directory(limits.directory())
            .map_err(|e| DecodeError::storage(limits.directory().to_path_buf(), e))?;

        let delimiter = format!("--{boundary}").into_bytes();
        let body_delimiter = memmem::Finder::new(format!("\r\n--{boundary}").as_bytes()).into_owned();

        Ok(Self {
            delimiter,
            body_delimiter,
            limits,
            ledger: Arc::new(SpoolLedger::new()),
            buffer: Vec::new(),
            consumed: 0,
            total_size: 0,
            part_count: 0,
            stage: Stage::Opening,
            current: None,
        })
    }

    /// Append bytes received from the stream. Ignored once the session is over.
    pub fn push(&mut self, chunk: &[u8]) {
        if !self.state().is_terminal() {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Make as much progress as the buffered bytes allow.
    ///
    /// Pass `eof = true` once the stream has ended; the session then either
    /// finishes or fails with `TruncatedStream` instead of asking for more.
    /// An error moves the session to `Failed` and removes every file it
    /// spooled before returning.
    pub fn advance(&mut self, eof: bool) -> Result<Step, DecodeError> {
        match self.step(eof) {
            Ok(step) => Ok(step),
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Stop the session as closed by `reason`, cleaning up like any failure.
    ///
    /// Returns `None` if the session was already over; calling this again is
    /// harmless.
    pub fn close(
        &mut self,
        reason: CloseReason,
        source: Option<std::io::Error>,
    ) -> Option<DecodeError> {
        if self.state().is_terminal() {
            return None;
        }
        let err = DecodeError::StreamClosed {
            offset: self.bytes_received(),
            reason,
            source,
        };
        self.fail(&err);
        Some(err)
    }

    /// Abort the session. Idempotent.
    pub fn abort(&mut self) {
        let _ = self.close(CloseReason::Aborted, None);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DecodeState {
        match self.stage {
            Stage::Opening | Stage::DelimiterTail => DecodeState::AwaitingBoundary,
            Stage::Headers => DecodeState::ReadingHeaders,
            Stage::Body => DecodeState::ReadingBody,
            Stage::Terminated => DecodeState::Terminated,
            Stage::Failed(kind) => DecodeState::Failed(kind),
        }
    }

    /// Stream bytes received so far, including any still buffered.
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.consumed + self.buffer.len() as u64
    }

    /// Body bytes accepted across all parts.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of parts started so far.
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.part_count
    }

    /// The limits this session enforces.
    #[must_use]
    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    fn step(&mut self, eof: bool) -> Result<Step, DecodeError> {
        loop {
            match self.stage {
                Stage::Terminated | Stage::Failed(_) => return Ok(Step::Done),
                Stage::Opening => {
                    let n = self.buffer.len().min(self.delimiter.len());
                    if let Some(pos) = (0..n).find(|&i| self.buffer[i] != self.delimiter[i]) {
                        return Err(DecodeError::MalformedStream {
                            offset: self.consumed + pos as u64,
                            detail: "stream does not begin with the boundary delimiter",
                        });
                    }
                    if n < self.delimiter.len() {
                        return self.need_more(eof);
                    }
                    self.drain(self.delimiter.len());
                    self.stage = Stage::DelimiterTail;
                }
                Stage::DelimiterTail => {
                    if self.buffer.first() == Some(&b'-') {
                        match self.buffer.get(1) {
                            None => return self.need_more(eof),
                            Some(b'-') => {
                                self.drain(2);
                                self.terminate();
                                return Ok(Step::Done);
                            }
                            Some(_) => {
                                return Err(self.malformed(1, "expected `--` or CRLF after boundary"));
                            }
                        }
                    }

                    let padding = self
                        .buffer
                        .iter()
                        .take_while(|&&b| b == b' ' || b == b'\t')
                        .count();
                    if padding > MAX_TRANSPORT_PADDING {
                        return Err(self.malformed(padding, "too much whitespace after boundary"));
                    }
                    match self.buffer.get(padding..padding + 2) {
                        Some(b"\r\n") => {}
                        Some(_) => return Err(self.malformed(padding, "expected CRLF after boundary")),
                        None => {
                            if self.buffer.get(padding).is_some_and(|&b| b != b'\r') {
                                return Err(self.malformed(padding, "expected CRLF after boundary"));
                            }
                            return self.need_more(eof);
                        }
                    }

                    if self.part_count >= self.limits.max_parts() {
                        return Err(DecodeError::TooManyParts {
                            limit: self.limits.max_parts(),
                        });
                    }
                    self.drain(padding + 2);
                    self.part_count += 1;
                    self.stage = Stage::Headers;
                }
                Stage::Headers => {
                    let part_index = self.part_count - 1;
                    let max = self.limits.max_header_bytes();
                    let (block_len, skip) = if self.buffer.starts_with(b"\r\n") {
                        (0, 2)
                    } else if let Some(pos) = memmem::find(&self.buffer, b"\r\n\r\n") {
                        (pos, pos + 4)
                    } else {
                        if self.buffer.len() > max {
                            return Err(DecodeError::headers(
                                part_index,
                                format!("header block exceeds {max} bytes"),
                            ));
                        }
                        return self.need_more(eof);
                    };
                    if block_len > max {
                        return Err(DecodeError::headers(
                            part_index,
                            format!("header block exceeds {max} bytes"),
                        ));
                    }

                    let header = parse_part_header(&self.buffer[..block_len], part_index)?;
                    self.drain(skip);
                    self.begin_part(header)?;
                    self.stage = Stage::Body;
                }
                Stage::Body => match self.scan_body() {
                    Scan::Found(at) => {
                        self.append(at)?;
                        self.drain(self.body_delimiter.needle().len());
                        let part = self.finish_part()?;
                        self.stage = Stage::DelimiterTail;
                        return Ok(Step::Part(part));
                    }
                    scan => {
                        if eof {
                            return Err(DecodeError::TruncatedStream {
                                offset: self.bytes_received(),
                            });
                        }
                        let keep = self.body_delimiter.needle().len() + 1;
                        let mut flush = self.buffer.len().saturating_sub(keep);
                        if let Scan::Undecided(at) = scan {
                            flush = flush.min(at);
                        }
                        self.append(flush)?;
                        return Ok(Step::NeedMore);
                    }
                },
            }
        }
    }

    /// Find the first real delimiter in the buffered body bytes.
    ///
    /// Boundary-like text not followed by `--`, CRLF or padding is content.
    fn scan_body(&self) -> Scan {
        let needle_len = self.body_delimiter.needle().len();
        let mut from = 0;
        while let Some(rel) = self.body_delimiter.find(&self.buffer[from..]) {
            let at = from + rel;
            let end = at + needle_len;
            if end + 2 > self.buffer.len() {
                return Scan::Undecided(at);
            }
            let suffix = &self.buffer[end..end + 2];
            if suffix == b"--" || suffix == b"\r\n" || suffix[0] == b' ' || suffix[0] == b'\t' {
                return Scan::Found(at);
            }
            from = at + 1;
        }
        Scan::NotFound
    }

    fn begin_part(&mut self, header: PartHeader) -> Result<(), DecodeError> {
        let sink = if header.is_file() {
            let (path, file) = create_spool_file(self.limits.directory())
                .map_err(|e| DecodeError::storage(self.limits.directory().to_path_buf(), e))?;
            self.ledger.register(path.clone());
            Sink::File {
                path,
                writer: BufWriter::new(file),
            }
        } else {
            Sink::Memory(Vec::new())
        };

        tracing::debug!(
            target: "formspool::decoder",
            part_index = self.part_count - 1,
            name = header.name(),
            file = header.is_file(),
            "part headers parsed"
        );

        self.current = Some(ActivePart {
            header,
            size: 0,
            sink,
        });
        Ok(())
    }

    /// Move `len` buffered bytes into the current part, enforcing limits
    /// before anything is stored.
    fn append(&mut self, len: usize) -> Result<(), DecodeError> {
        if len == 0 {
            return Ok(());
        }
        let Some(part) = self.current.as_mut() else {
            return Err(DecodeError::MalformedStream {
                offset: self.consumed,
                detail: "body bytes outside of a part",
            });
        };

        let n = len as u64;
        let size_limit = self.limits.size_limit();
        let file_limit = self.limits.file_size_limit();
        let total_room = size_limit.saturating_sub(self.total_size);
        let file_room = if part.header.is_file() {
            file_limit.saturating_sub(part.size)
        } else {
            u64::MAX
        };
        let over_total = n > total_room;
        let over_file = n > file_room;

        if over_file || over_total {
            // Report whichever limit the stream crosses first; on a tie, the
            // smaller one.
            let file_first = over_file
                && (!over_total
                    || file_room < total_room
                    || (file_room == total_room && file_limit <= size_limit));
            return Err(if file_first {
                DecodeError::FileSizeExceeded {
                    field: part.header.name().to_string(),
                    limit: file_limit,
                }
            } else {
                DecodeError::TotalSizeExceeded {
                    limit: size_limit,
                    offset: self.consumed + total_room,
                }
            });
        }

        let bytes = &self.buffer[..len];
        match &mut part.sink {
            Sink::Memory(data) => data.extend_from_slice(bytes),
            Sink::File { path, writer } => writer
                .write_all(bytes)
                .map_err(|e| DecodeError::storage(path.clone(), e))?,
        }
        part.size += n;
        self.total_size += n;
        self.drain(len);
        Ok(())
    }

    fn finish_part(&mut self) -> Result<DecodedPart, DecodeError> {
        let Some(part) = self.current.take() else {
            return Err(DecodeError::MalformedStream {
                offset: self.consumed,
                detail: "delimiter outside of a part",
            });
        };

        let body = match part.sink {
            Sink::Memory(data) => PartBody::Field(data),
            Sink::File { path, mut writer } => {
                writer
                    .flush()
                    .map_err(|e| DecodeError::storage(path.clone(), e))?;
                drop(writer);
                PartBody::File(SpooledFile::new(path, part.size, Arc::clone(&self.ledger)))
            }
        };

        tracing::debug!(
            target: "formspool::decoder",
            part_index = self.part_count - 1,
            name = part.header.name(),
            size = part.size,
            "part complete"
        );

        Ok(DecodedPart::new(part.header, body))
    }

    fn terminate(&mut self) {
        self.stage = Stage::Terminated;
        self.current = None;
        self.buffer = Vec::new();
        self.ledger.commit();
        tracing::debug!(
            target: "formspool::decoder",
            parts = self.part_count,
            total_size = self.total_size,
            bytes = self.consumed,
            "multipart decode complete"
        );
    }

    fn fail(&mut self, err: &DecodeError) {
        self.stage = Stage::Failed(err.kind());
        // Close the open writer before its file is removed.
        self.current = None;
        self.buffer = Vec::new();
        let removed = self.ledger.discard();
        tracing::warn!(
            target: "formspool::decoder",
            kind = err.kind().as_str(),
            error = %err,
            removed,
            "multipart decode failed"
        );
    }

    fn need_more(&self, eof: bool) -> Result<Step, DecodeError> {
        if eof {
            Err(DecodeError::TruncatedStream {
                offset: self.bytes_received(),
            })
        } else {
            Ok(Step::NeedMore)
        }
    }

    fn malformed(&self, at: usize, detail: &'static str) -> DecodeError {
        DecodeError::MalformedStream {
            offset: self.consumed + at as u64,
            detail,
        }
    }

    fn drain(&mut self, len: usize) {
        self.buffer.drain(..len);
        self.consumed += len as u64;
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        self.abort();
    }
}
