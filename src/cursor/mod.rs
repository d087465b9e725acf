//! Refillable, boundary-aware view over the batch transport.
//!
//! [`FramedCursor`] is the only component that reads from the transport.
//! Everything above it (the reader state machine and the content streams it
//! hands out) consumes bytes from the cursor's buffer through
//! [`read_with_delimiter`](FramedCursor::read_with_delimiter),
//! [`read_with_length`](FramedCursor::read_with_length),
//! [`next_delimiter`](FramedCursor::next_delimiter) and
//! [`read_header_block`](FramedCursor::read_header_block).
//!
//! Refills are the only suspension points, and the only places where
//! cancellation is observed. A cancelled refill leaves the buffer exactly as
//! it was.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr_iter;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{BatchError, MalformedPayload, Result},
    scanner::{DelimiterMatch, ScanResult, reserved_tail, scan_any},
};

/// Cursor shared between a reader and the content stream it hands out.
pub type SharedCursor<R> = Arc<Mutex<FramedCursor<R>>>;

/// Buffered transport reader that understands boundary delimiters.
///
/// The cursor keeps a stack of active boundaries: the outer batch boundary
/// at the bottom and, while a change set is open, its boundary on top.
/// Delimiter-framed reads stop at a delimiter of any active boundary.
///
/// # Examples
///
/// ```
/// use batchframe::FramedCursor;
///
/// # futures::executor::block_on(async {
/// let payload: &[u8] = b"hello\r\n--b1--\r\n";
/// let mut cursor = FramedCursor::new(payload, "b1", 16);
///
/// let mut body = [0_u8; 32];
/// let n = cursor.read_with_delimiter(&mut body).await.expect("body bytes");
/// assert_eq!(&body[..n], b"hello");
/// assert_eq!(cursor.read_with_delimiter(&mut body).await.expect("at delimiter"), 0);
/// # });
/// ```
#[derive(Debug)]
pub struct FramedCursor<R> {
    transport: R,
    buffer: BytesMut,
    exhausted: bool,
    boundaries: Vec<String>,
    refill_size: usize,
    cancellation: Option<CancellationToken>,
}

impl<R> FramedCursor<R> {
    /// Wrap `transport`, framing parts with the outer `boundary`.
    pub fn new(transport: R, boundary: impl Into<String>, refill_size: usize) -> Self {
        let refill_size = refill_size.max(1);
        Self {
            transport,
            buffer: BytesMut::with_capacity(refill_size),
            exhausted: false,
            boundaries: vec![boundary.into()],
            refill_size,
            cancellation: None,
        }
    }

    /// Observe `token` at every refill.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Active boundaries, outermost first.
    #[must_use]
    pub fn boundaries(&self) -> &[String] { &self.boundaries }

    /// Activate a nested boundary.
    pub fn push_boundary(&mut self, boundary: impl Into<String>) {
        self.boundaries.push(boundary.into());
    }

    /// Deactivate the innermost nested boundary. The outer boundary is never
    /// removed.
    pub fn pop_boundary(&mut self) -> Option<String> {
        if self.boundaries.len() > 1 {
            self.boundaries.pop()
        } else {
            None
        }
    }

    /// Whether the transport has reported end of data.
    #[must_use]
    pub fn is_exhausted(&self) -> bool { self.exhausted }

    /// Bytes read from the transport but not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> &[u8] { &self.buffer }

    /// Return the transport, discarding buffered bytes.
    pub fn into_inner(self) -> R { self.transport }

    fn innermost(&self) -> &str { self.boundaries.last().map_or("", String::as_str) }

    fn reserve_len(&self) -> usize {
        self.boundaries
            .iter()
            .map(|boundary| reserved_tail(boundary))
            .max()
            .unwrap_or(0)
    }

    fn deliver(&mut self, dest: &mut [u8], available: usize) -> usize {
        let n = dest.len().min(available);
        dest[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);
        n
    }
}

impl<R: AsyncRead + Unpin> FramedCursor<R> {
    /// Copy body bytes of the current part into `dest`.
    ///
    /// Returns fewer bytes than requested, possibly zero, as soon as a
    /// delimiter of an active boundary is next in the stream. `Ok(0)` for a
    /// non-empty `dest` therefore means the body is complete.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload::UnexpectedEndOfStream`] if the transport
    /// ends before a delimiter, [`BatchError::Cancelled`] if a refill is
    /// cancelled, or [`BatchError::Io`] on transport failure.
    pub async fn read_with_delimiter(&mut self, dest: &mut [u8]) -> Result<usize> {
        if dest.is_empty() {
            return Ok(0);
        }
        loop {
            let available = match scan_any(&self.buffer, &self.boundaries) {
                ScanResult::Match(found) => return Ok(self.deliver(dest, found.start)),
                ScanResult::PartialMatch { start } => start,
                ScanResult::NoMatch if self.exhausted => self.buffer.len(),
                ScanResult::NoMatch => self.buffer.len().saturating_sub(self.reserve_len()),
            };
            if available > 0 {
                return Ok(self.deliver(dest, available));
            }
            if self.exhausted {
                return Err(MalformedPayload::UnexpectedEndOfStream {
                    context: "reading a part body",
                }
                .into());
            }
            self.refill().await?;
        }
    }

    /// Copy up to `dest.len()` bytes without interpreting boundaries.
    ///
    /// Buffered bytes are drained first; once the buffer is empty a large
    /// destination is filled straight from the transport. Returns `Ok(0)`
    /// only when the transport is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Cancelled`] if a transport read is cancelled,
    /// or [`BatchError::Io`] on transport failure.
    pub async fn read_with_length(&mut self, dest: &mut [u8]) -> Result<usize> {
        if dest.is_empty() {
            return Ok(0);
        }
        if self.buffer.is_empty() {
            if self.exhausted {
                return Ok(0);
            }
            if dest.len() >= self.refill_size {
                return self.read_direct(dest).await;
            }
            self.refill().await?;
        }
        let available = self.buffer.len();
        Ok(self.deliver(dest, available))
    }

    /// Discard bytes up to and including the next delimiter.
    ///
    /// Used to skip a preamble, the unread rest of an abandoned body, or the
    /// epilogue of a change set. Skipped bytes are only dropped once the
    /// refill that follows them has succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload::MissingBoundary`] when the transport ends
    /// first, [`BatchError::Cancelled`] if a refill is cancelled, or
    /// [`BatchError::Io`] on transport failure.
    pub async fn next_delimiter(&mut self) -> Result<DelimiterMatch> {
        let mut skipped = 0_usize;
        loop {
            let discard = match scan_any(&self.buffer, &self.boundaries) {
                ScanResult::Match(found) => {
                    self.buffer.advance(found.end());
                    tracing::trace!(
                        skipped = skipped + found.start,
                        boundary = %self.boundaries[found.boundary],
                        kind = ?found.kind,
                        "delimiter consumed"
                    );
                    return Ok(found);
                }
                ScanResult::PartialMatch { start } => start,
                ScanResult::NoMatch => self.buffer.len().saturating_sub(self.reserve_len()),
            };
            if self.exhausted {
                return Err(MalformedPayload::MissingBoundary {
                    boundary: self.innermost().to_owned(),
                }
                .into());
            }
            self.refill().await?;
            self.buffer.advance(discard);
            skipped += discard;
        }
    }

    /// Take one header block, up to and including its terminating empty
    /// line.
    ///
    /// Nothing is consumed until the whole block is buffered, so a cancelled
    /// call can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload::HeadersTooLarge`] once more than
    /// `max_len` bytes are buffered without an empty line,
    /// [`MalformedPayload::UnexpectedEndOfStream`] if the transport ends
    /// first, [`BatchError::Cancelled`] or [`BatchError::Io`].
    pub async fn read_header_block(&mut self, max_len: usize) -> Result<Bytes> {
        loop {
            if let Some(end) = header_block_end(&self.buffer) {
                if end > max_len {
                    return Err(MalformedPayload::HeadersTooLarge { max: max_len }.into());
                }
                return Ok(self.buffer.split_to(end).freeze());
            }
            if self.buffer.len() > max_len {
                return Err(MalformedPayload::HeadersTooLarge { max: max_len }.into());
            }
            if self.exhausted {
                return Err(MalformedPayload::UnexpectedEndOfStream {
                    context: "reading part headers",
                }
                .into());
            }
            self.refill().await?;
        }
    }

    async fn refill(&mut self) -> Result<usize> {
        if self.exhausted {
            return Ok(0);
        }
        self.buffer.reserve(self.refill_size);
        let Self {
            transport,
            buffer,
            cancellation,
            ..
        } = self;
        let read = transport.read_buf(buffer);
        let n = match cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(BatchError::Cancelled),
                result = read => result?,
            },
            None => read.await?,
        };
        if n == 0 {
            self.exhausted = true;
            tracing::debug!(buffered = self.buffer.len(), "transport exhausted");
        } else {
            tracing::trace!(bytes = n, buffered = self.buffer.len(), "buffer refilled");
        }
        Ok(n)
    }

    async fn read_direct(&mut self, dest: &mut [u8]) -> Result<usize> {
        let Self {
            transport,
            cancellation,
            ..
        } = self;
        let read = transport.read(dest);
        let n = match cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(BatchError::Cancelled),
                result = read => result?,
            },
            None => read.await?,
        };
        if n == 0 {
            self.exhausted = true;
            tracing::debug!("transport exhausted");
        }
        Ok(n)
    }
}

/// Offset one past the empty line that closes a header block.
fn header_block_end(buffer: &[u8]) -> Option<usize> {
    if buffer.starts_with(b"\r\n") {
        return Some(2);
    }
    if buffer.starts_with(b"\n") {
        return Some(1);
    }
    memchr_iter(b'\n', buffer).find_map(|newline| {
        let rest = &buffer[newline + 1..];
        if rest.starts_with(b"\r\n") {
            Some(newline + 3)
        } else if rest.starts_with(b"\n") {
            Some(newline + 2)
        } else {
            None
        }
    })
}
