//! Per-part body streams and their lifecycle.
//!
//! A [`ContentStream`] is the only object callers read a part body from (or
//! write one into). It owns no transport; reads go through the shared
//! [`FramedCursor`](crate::FramedCursor) and writes through the writer's
//! shared output. The stream's only state is whether it is still open, and
//! that state is represented by the listener it holds: disposing takes the
//! listener out of its slot and notifies it, so a second dispose finds the
//! slot empty and does nothing.

use std::{
    fmt,
    io::SeekFrom,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::{
    cursor::SharedCursor,
    error::{BatchError, MalformedPayload, Result},
    hooks::ContentStreamListener,
};

/// Call style fixed for a reader or writer and every stream it hands out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// Lifecycle hooks are invoked through their blocking variants.
    Synchronous,
    /// Lifecycle hooks are awaited through their async variants.
    Asynchronous,
}

impl StreamMode {
    fn dispose_method(self) -> &'static str {
        match self {
            Self::Synchronous => "dispose_blocking",
            Self::Asynchronous => "dispose",
        }
    }
}

struct Lifecycle {
    listener: Option<Arc<dyn ContentStreamListener>>,
    mode: StreamMode,
    cancellation: Option<CancellationToken>,
}

impl Lifecycle {
    fn require_mode(&self, mode: StreamMode) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(BatchError::invalid_operation(format!(
                "a {:?} content stream must be disposed with `{}`",
                self.mode,
                self.mode.dispose_method()
            )))
        }
    }

    async fn dispose(&mut self) -> Result<()> {
        self.require_mode(StreamMode::Asynchronous)?;
        if self.listener.is_none() {
            return Ok(());
        }
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(BatchError::Cancelled);
        }
        // Once the hook has been polled the stream counts as disposed, so a
        // cancelled await is never followed by a second notification.
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };
        match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                () = listener.stream_disposed_async() => {}
                () = token.cancelled() => {
                    tracing::debug!("content stream disposal cancelled after notifying");
                    return Err(BatchError::Cancelled);
                }
            },
            None => listener.stream_disposed_async().await,
        }
        tracing::debug!("content stream disposed");
        Ok(())
    }

    fn dispose_blocking(&mut self) -> Result<()> {
        self.require_mode(StreamMode::Synchronous)?;
        if let Some(listener) = self.listener.take() {
            listener.stream_disposed();
            tracing::debug!("content stream disposed");
        }
        Ok(())
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            tracing::debug!(mode = ?self.mode, "content stream dropped while open; disposing");
            listener.stream_disposed();
        }
    }
}

/// Body of one part as handed to the caller.
///
/// `B` is [`PartBody`] for streams created by a reader and [`PartSink`] for
/// streams created by a writer.
pub struct ContentStream<B> {
    body: B,
    lifecycle: Lifecycle,
}

impl<B> ContentStream<B> {
    pub(crate) fn new(
        body: B,
        listener: Arc<dyn ContentStreamListener>,
        mode: StreamMode,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            body,
            lifecycle: Lifecycle {
                listener: Some(listener),
                mode,
                cancellation,
            },
        }
    }

    /// Call style this stream was created for.
    #[must_use]
    pub fn mode(&self) -> StreamMode { self.lifecycle.mode }

    /// Whether the stream has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool { self.lifecycle.listener.is_none() }

    /// Content streams are forward-only.
    ///
    /// # Errors
    ///
    /// Always returns [`BatchError::NotSupported`].
    pub fn seek(&mut self, _position: SeekFrom) -> Result<u64> {
        Err(BatchError::NotSupported("seeking a content stream"))
    }

    /// Dispose an asynchronous stream, awaiting the listener's async hook.
    ///
    /// The first call notifies the listener; later calls return `Ok(())`
    /// without doing anything. If the configured token has already fired the
    /// call fails and the stream stays open. A token that fires while the
    /// hook is running cancels the await, but the listener has been notified
    /// and the stream is disposed.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] for a synchronous stream and
    /// [`BatchError::Cancelled`] when the token fires.
    pub async fn dispose(&mut self) -> Result<()> { self.lifecycle.dispose().await }

    /// Dispose a synchronous stream through the listener's blocking hook.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] for an asynchronous stream.
    pub fn dispose_blocking(&mut self) -> Result<()> { self.lifecycle.dispose_blocking() }

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            Err(BatchError::ObjectDisposed)
        } else {
            Ok(())
        }
    }
}

impl<B> fmt::Debug for ContentStream<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStream")
            .field("mode", &self.lifecycle.mode)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// How a [`PartBody`] knows where the body ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Framing {
    Delimited,
    Length { remaining: u64 },
}

/// Reader-side body backend.
pub struct PartBody<R> {
    cursor: SharedCursor<R>,
    framing: Framing,
}

impl<R> PartBody<R> {
    pub(crate) fn delimited(cursor: SharedCursor<R>) -> Self {
        Self {
            cursor,
            framing: Framing::Delimited,
        }
    }

    pub(crate) fn with_length(cursor: SharedCursor<R>, length: u64) -> Self {
        Self {
            cursor,
            framing: Framing::Length { remaining: length },
        }
    }
}

impl<R: AsyncRead + Unpin> ContentStream<PartBody<R>> {
    /// Read body bytes into `dest`; `Ok(0)` marks the end of the body.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::ObjectDisposed`] after disposal, a malformed
    /// error if the payload ends inside the body, or any transport error.
    pub async fn read(&mut self, dest: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let body = &mut self.body;
        let mut cursor = body.cursor.lock().await;
        match &mut body.framing {
            Framing::Delimited => cursor.read_with_delimiter(dest).await,
            Framing::Length { remaining } => {
                let want = usize::try_from(*remaining).map_or(dest.len(), |r| r.min(dest.len()));
                if want == 0 {
                    return Ok(0);
                }
                let n = cursor.read_with_length(&mut dest[..want]).await?;
                if n == 0 {
                    return Err(MalformedPayload::UnexpectedEndOfStream {
                        context: "reading a length-framed body",
                    }
                    .into());
                }
                *remaining -= n as u64;
                Ok(n)
            }
        }
    }

    /// Read the rest of the body, appending it to `out`.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read).
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = [0_u8; 1024];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }
}

/// Writer-side body backend.
pub struct PartSink<W> {
    output: Arc<Mutex<W>>,
}

impl<W> PartSink<W> {
    pub(crate) fn new(output: Arc<Mutex<W>>) -> Self { Self { output } }
}

impl<W: AsyncWrite + Unpin> ContentStream<PartSink<W>> {
    /// Write body bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::ObjectDisposed`] after disposal or any
    /// transport error.
    pub async fn write(&mut self, src: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.body.output.lock().await.write(src).await?)
    }

    /// Write all of `src`.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub async fn write_all(&mut self, src: &[u8]) -> Result<()> {
        self.ensure_open()?;
        Ok(self.body.output.lock().await.write_all(src).await?)
    }

    /// Flush the underlying transport.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        Ok(self.body.output.lock().await.flush().await?)
    }
}

/// Listener a reader or writer binds to every stream it creates.
///
/// Tracks whether the most recent stream is still open and forwards each
/// notification to the caller's observer, if one was configured.
pub(crate) struct StreamTracker {
    open: AtomicBool,
    observer: Option<Arc<dyn ContentStreamListener>>,
}

impl StreamTracker {
    pub(crate) fn new(observer: Option<Arc<dyn ContentStreamListener>>) -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(false),
            observer,
        })
    }

    pub(crate) fn is_open(&self) -> bool { self.open.load(Ordering::SeqCst) }

    pub(crate) fn mark_open(&self) { self.open.store(true, Ordering::SeqCst); }
}

#[async_trait]
impl ContentStreamListener for StreamTracker {
    fn stream_requested(&self) {
        if let Some(observer) = &self.observer {
            observer.stream_requested();
        }
    }

    async fn stream_requested_async(&self) {
        if let Some(observer) = &self.observer {
            observer.stream_requested_async().await;
        }
    }

    fn stream_disposed(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(observer) = &self.observer {
            observer.stream_disposed();
        }
    }

    async fn stream_disposed_async(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(observer) = &self.observer {
            observer.stream_disposed_async().await;
        }
    }
}

#[cfg(test)]
mod tests;
