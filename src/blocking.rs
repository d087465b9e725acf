//! Blocking adapters for `std::io` transports.
//!
//! The adapters own the same [`BatchReader`] and [`BatchWriter`] state
//! machines as asynchronous callers use, created in
//! [`StreamMode::Synchronous`], and drive each call to completion with
//! [`futures::executor::block_on`]. No async runtime is required.

use std::{
    io::{self, SeekFrom},
    pin::Pin,
    task::{Context, Poll},
};

use futures::executor::block_on;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::{
    config::BatchConfig,
    content::{ContentStream, PartBody, PartSink, StreamMode},
    error::Result,
    message::{OperationMessage, OperationRequest, OperationResponse},
    reader::{BatchReader, BatchReaderState},
    writer::{BatchWriter, BatchWriterState},
};

/// Presents a blocking `std::io` transport as a tokio I/O object.
///
/// Every poll completes immediately by performing the blocking call.
#[derive(Debug)]
pub struct SyncTransport<T>(T);

impl<T> SyncTransport<T> {
    /// Wrap `inner`.
    pub fn new(inner: T) -> Self { Self(inner) }

    /// Return the wrapped transport.
    pub fn into_inner(self) -> T { self.0 }
}

impl<T: io::Read + Unpin> AsyncRead for SyncTransport<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match this.0.read(buf.initialize_unfilled()) {
                Ok(n) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Poll::Ready(Err(err)),
            }
        }
    }
}

impl<T: io::Write + Unpin> AsyncWrite for SyncTransport<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.get_mut().0.write(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.get_mut().0.flush())
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}

/// Content stream handed out by the blocking adapters.
///
/// Implements [`io::Read`] for reader-side streams and [`io::Write`] for
/// writer-side streams. [`io::Seek`] always fails.
#[derive(Debug)]
pub struct BlockingContentStream<B> {
    inner: ContentStream<B>,
}

impl<B> BlockingContentStream<B> {
    /// Dispose the stream, notifying its listener through the blocking hook.
    ///
    /// # Errors
    ///
    /// Never fails for streams created by the blocking adapters.
    pub fn dispose(&mut self) -> Result<()> { self.inner.dispose_blocking() }

    /// Whether the stream has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool { self.inner.is_disposed() }
}

impl<R: io::Read + Unpin> io::Read for BlockingContentStream<PartBody<SyncTransport<R>>> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        block_on(self.inner.read(buf)).map_err(io::Error::from)
    }
}

impl<W: io::Write + Unpin> io::Write for BlockingContentStream<PartSink<SyncTransport<W>>> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        block_on(self.inner.write(buf)).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        block_on(self.inner.flush()).map_err(io::Error::from)
    }
}

impl<B> io::Seek for BlockingContentStream<B> {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        self.inner.seek(position).map_err(io::Error::from)
    }
}

/// Blocking reader over a `std::io::Read` transport.
///
/// # Examples
///
/// ```
/// use std::io::Read;
///
/// use batchframe::{BatchConfig, BatchReaderState, BlockingBatchReader};
///
/// let payload: &[u8] = b"--b\r\n\
///     Content-Type: application/http\r\n\
///     \r\n\
///     POST http://host/svc/Notes HTTP/1.1\r\n\
///     \r\n\
///     hello\r\n--b--\r\n";
/// let mut reader = BlockingBatchReader::new(payload, "b", BatchConfig::default());
/// assert!(reader.read().expect("operation"));
///
/// let mut stream = reader.content_stream().expect("body");
/// let mut body = String::new();
/// stream.read_to_string(&mut body).expect("utf-8 body");
/// stream.dispose().expect("dispose");
/// assert_eq!(body, "hello");
///
/// assert!(!reader.read().expect("end"));
/// assert_eq!(reader.state(), BatchReaderState::Completed);
/// ```
#[derive(Debug)]
pub struct BlockingBatchReader<R> {
    inner: BatchReader<SyncTransport<R>>,
}

impl<R: io::Read + Unpin> BlockingBatchReader<R> {
    /// Create a synchronous reader over `transport` framed by `boundary`.
    pub fn new(transport: R, boundary: impl Into<String>, config: BatchConfig) -> Self {
        Self {
            inner: BatchReader::with_mode(
                SyncTransport::new(transport),
                boundary,
                config,
                StreamMode::Synchronous,
            ),
        }
    }

    /// Advance to the next element; see [`BatchReader::read`].
    ///
    /// # Errors
    ///
    /// As for [`BatchReader::read`].
    pub fn read(&mut self) -> Result<bool> { block_on(self.inner.read()) }

    /// Request the body of the current operation.
    ///
    /// # Errors
    ///
    /// As for [`BatchReader::content_stream`].
    pub fn content_stream(
        &mut self,
    ) -> Result<BlockingContentStream<PartBody<SyncTransport<R>>>> {
        Ok(BlockingContentStream {
            inner: self.inner.content_stream_blocking()?,
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BatchReaderState { self.inner.state() }

    /// Metadata of the current operation.
    #[must_use]
    pub fn operation(&self) -> Option<&OperationMessage> { self.inner.operation() }

    /// Boundary of the change set currently open, if any.
    #[must_use]
    pub fn changeset_boundary(&self) -> Option<&str> { self.inner.changeset_boundary() }
}

/// Blocking writer over a `std::io::Write` transport.
#[derive(Debug)]
pub struct BlockingBatchWriter<W> {
    inner: BatchWriter<SyncTransport<W>>,
}

impl<W: io::Write + Unpin> BlockingBatchWriter<W> {
    /// Create a synchronous writer framing parts with `boundary`.
    pub fn new(output: W, boundary: impl Into<String>, config: BatchConfig) -> Self {
        Self {
            inner: BatchWriter::with_mode(
                SyncTransport::new(output),
                boundary,
                config,
                StreamMode::Synchronous,
            ),
        }
    }

    /// See [`BatchWriter::write_start_batch`].
    ///
    /// # Errors
    ///
    /// As for the asynchronous method.
    pub fn write_start_batch(&mut self) -> Result<()> { block_on(self.inner.write_start_batch()) }

    /// See [`BatchWriter::write_start_changeset`].
    ///
    /// # Errors
    ///
    /// As for the asynchronous method.
    pub fn write_start_changeset(&mut self, boundary: Option<&str>) -> Result<String> {
        block_on(self.inner.write_start_changeset(boundary))
    }

    /// See [`BatchWriter::write_request`].
    ///
    /// # Errors
    ///
    /// As for the asynchronous method.
    pub fn write_request(&mut self, request: &OperationRequest) -> Result<()> {
        block_on(self.inner.write_request(request))
    }

    /// See [`BatchWriter::write_response`].
    ///
    /// # Errors
    ///
    /// As for the asynchronous method.
    pub fn write_response(&mut self, response: &OperationResponse) -> Result<()> {
        block_on(self.inner.write_response(response))
    }

    /// Request the body stream of the current operation.
    ///
    /// # Errors
    ///
    /// As for [`BatchWriter::content_stream`].
    pub fn content_stream(
        &mut self,
    ) -> Result<BlockingContentStream<PartSink<SyncTransport<W>>>> {
        Ok(BlockingContentStream {
            inner: self.inner.content_stream_blocking()?,
        })
    }

    /// See [`BatchWriter::write_end_changeset`].
    ///
    /// # Errors
    ///
    /// As for the asynchronous method.
    pub fn write_end_changeset(&mut self) -> Result<()> {
        block_on(self.inner.write_end_changeset())
    }

    /// See [`BatchWriter::write_end_batch`].
    ///
    /// # Errors
    ///
    /// As for the asynchronous method.
    pub fn write_end_batch(&mut self) -> Result<()> { block_on(self.inner.write_end_batch()) }

    /// Flush the output transport.
    ///
    /// # Errors
    ///
    /// As for [`BatchWriter::flush`].
    pub fn flush(&mut self) -> Result<()> { block_on(self.inner.flush()) }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BatchWriterState { self.inner.state() }

    /// Return the output transport.
    ///
    /// # Errors
    ///
    /// As for [`BatchWriter::into_inner`].
    pub fn into_inner(self) -> Result<W> { self.inner.into_inner().map(SyncTransport::into_inner) }
}
