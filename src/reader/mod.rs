//! Forward-only reader over a batch payload.
//!
//! [`BatchReader`] walks the payload one element at a time. Every call to
//! [`read`](BatchReader::read) consumes the next delimiter, parses the part
//! that follows and reports the resulting [`BatchReaderState`]. Operation
//! bodies are left in the transport until the caller asks for a
//! [`ContentStream`]; whatever the caller does not read is skipped on the
//! next advance.
//!
//! The reader refuses to advance while the content stream it handed out is
//! still open. That rule is what keeps the shared cursor's scan position
//! consistent between the reader and the stream.

use std::{collections::HashSet, sync::Arc};

use tokio::{io::AsyncRead, sync::Mutex};

use crate::{
    config::BatchConfig,
    content::{ContentStream, PartBody, StreamMode, StreamTracker},
    cursor::{FramedCursor, SharedCursor},
    error::{BatchError, MalformedPayload, Result},
    headers::{self, PartHeaders},
    hooks::ContentStreamListener,
    message::{BodyFraming, MessageHead, MessageKind, OperationMessage, RequestLine, StatusLine},
    scanner::DelimiterKind,
    uri::resolve_request_target,
};

/// Position of a [`BatchReader`] within the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchReaderState {
    /// Nothing has been read yet.
    Initial,
    /// Positioned on an operation; its body may be requested.
    Operation,
    /// A change set was opened.
    ChangesetStart,
    /// The open change set was closed.
    ChangesetEnd,
    /// The closing batch delimiter was consumed.
    Completed,
    /// A malformed payload or transport failure ended reading.
    Exception,
}

/// A part whose delimiter is consumed but whose headers are not yet parsed.
///
/// Kept across a cancelled advance so that a retry resumes where the
/// cancelled call stopped.
#[derive(Debug, Default)]
struct PendingPart {
    mime: Option<PartHeaders>,
}

/// Reader state machine over one batch payload.
///
/// # Examples
///
/// ```
/// use batchframe::{BatchConfig, BatchReader, BatchReaderState};
///
/// # futures::executor::block_on(async {
/// let payload: &[u8] = b"--b\r\n\
///     Content-Type: application/http\r\n\
///     \r\n\
///     GET http://host/svc/Customers(1) HTTP/1.1\r\n\
///     \r\n\
///     \r\n--b--\r\n";
/// let mut reader = BatchReader::new(payload, "b", BatchConfig::default());
///
/// assert!(reader.read().await.expect("first part"));
/// assert_eq!(reader.state(), BatchReaderState::Operation);
/// let op = reader.operation().expect("operation metadata");
/// assert_eq!(op.to_string(), "GET http://host/svc/Customers(1)");
///
/// assert!(!reader.read().await.expect("end of batch"));
/// assert_eq!(reader.state(), BatchReaderState::Completed);
/// # });
/// ```
pub struct BatchReader<R> {
    cursor: SharedCursor<R>,
    config: BatchConfig,
    mode: StreamMode,
    state: BatchReaderState,
    tracker: Arc<StreamTracker>,
    pending: Option<PendingPart>,
    operation: Option<OperationMessage>,
    stream_requested: bool,
    changeset: Option<String>,
    content_ids: HashSet<String>,
    parts: usize,
    changeset_operations: usize,
}

impl<R> BatchReader<R> {
    /// Create an asynchronous reader over `transport` framed by `boundary`.
    ///
    /// `boundary` must be non-empty and free of line breaks.
    pub fn new(transport: R, boundary: impl Into<String>, config: BatchConfig) -> Self {
        Self::with_mode(transport, boundary, config, StreamMode::Asynchronous)
    }

    pub(crate) fn with_mode(
        transport: R,
        boundary: impl Into<String>,
        config: BatchConfig,
        mode: StreamMode,
    ) -> Self {
        let mut cursor = FramedCursor::new(transport, boundary, config.refill_size);
        if let Some(token) = &config.cancellation {
            cursor = cursor.with_cancellation(token.clone());
        }
        let tracker = StreamTracker::new(config.listener.clone());
        Self {
            cursor: Arc::new(Mutex::new(cursor)),
            config,
            mode,
            state: BatchReaderState::Initial,
            tracker,
            pending: None,
            operation: None,
            stream_requested: false,
            changeset: None,
            content_ids: HashSet::new(),
            parts: 0,
            changeset_operations: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BatchReaderState { self.state }

    /// Stream mode fixed at construction.
    #[must_use]
    pub fn mode(&self) -> StreamMode { self.mode }

    /// Configuration the reader was built with.
    #[must_use]
    pub fn config(&self) -> &BatchConfig { &self.config }

    /// Metadata of the current operation, in the `Operation` state.
    #[must_use]
    pub fn operation(&self) -> Option<&OperationMessage> { self.operation.as_ref() }

    /// Boundary of the change set currently open, if any.
    #[must_use]
    pub fn changeset_boundary(&self) -> Option<&str> { self.changeset.as_deref() }

    fn check_entry(&self) -> Result<()> {
        if self.state == BatchReaderState::Exception {
            return Err(BatchError::Faulted("reader"));
        }
        if self.tracker.is_open() {
            return Err(BatchError::invalid_operation(
                "the content stream of the current operation must be disposed before reading on",
            ));
        }
        Ok(())
    }

    fn open_stream(&mut self, mode: StreamMode) -> Result<ContentStream<PartBody<R>>> {
        if self.state == BatchReaderState::Exception {
            return Err(BatchError::Faulted("reader"));
        }
        if mode != self.mode {
            return Err(BatchError::invalid_operation(format!(
                "reader was created in {:?} mode",
                self.mode
            )));
        }
        let Some(operation) = self
            .operation
            .as_ref()
            .filter(|_| self.state == BatchReaderState::Operation)
        else {
            return Err(BatchError::invalid_operation(format!(
                "no operation body is available in the {:?} state",
                self.state
            )));
        };
        if self.stream_requested {
            return Err(BatchError::invalid_operation(
                "the content stream of this operation was already requested",
            ));
        }
        let cursor = Arc::clone(&self.cursor);
        let body = match operation.framing() {
            BodyFraming::Delimited => PartBody::delimited(cursor),
            BodyFraming::Length(length) => PartBody::with_length(cursor, length),
        };
        self.stream_requested = true;
        self.tracker.mark_open();
        let listener: Arc<dyn ContentStreamListener> = self.tracker.clone();
        Ok(ContentStream::new(
            body,
            listener,
            mode,
            self.config.cancellation.clone(),
        ))
    }

    /// Request the body of the current operation from a synchronous reader.
    pub(crate) fn content_stream_blocking(&mut self) -> Result<ContentStream<PartBody<R>>> {
        let stream = self.open_stream(StreamMode::Synchronous)?;
        self.tracker.stream_requested();
        Ok(stream)
    }
}

impl<R: AsyncRead + Unpin> BatchReader<R> {
    /// Advance to the next element of the batch.
    ///
    /// Returns `Ok(false)` once the closing batch delimiter has been
    /// consumed, and on every call after that.
    ///
    /// # Errors
    ///
    /// - [`BatchError::InvalidOperation`] while the previous content stream
    ///   is open; nothing is consumed.
    /// - [`BatchError::Malformed`] or [`BatchError::Io`]; the reader moves to
    ///   [`BatchReaderState::Exception`].
    /// - [`BatchError::Faulted`] once the reader is in the exception state.
    /// - [`BatchError::Cancelled`] when the configured token fires during a
    ///   refill; the call may be retried.
    pub async fn read(&mut self) -> Result<bool> {
        self.check_entry()?;
        if self.state == BatchReaderState::Completed {
            return Ok(false);
        }
        match self.advance().await {
            Ok(next) => {
                tracing::debug!(from = ?self.state, to = ?next, "batch reader advanced");
                self.state = next;
                Ok(next != BatchReaderState::Completed)
            }
            Err(err) if err.faults_engine() => {
                tracing::warn!(error = %err, kind = err.error_type(), "batch reader faulted");
                self.state = BatchReaderState::Exception;
                self.operation = None;
                self.pending = None;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Request the body of the current operation.
    ///
    /// Only one stream is handed out per operation. The reader will not
    /// advance until it is disposed.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] outside the `Operation`
    /// state, for a second request, or for a synchronous reader.
    pub async fn content_stream(&mut self) -> Result<ContentStream<PartBody<R>>> {
        let stream = self.open_stream(StreamMode::Asynchronous)?;
        self.tracker.stream_requested_async().await;
        Ok(stream)
    }

    async fn advance(&mut self) -> Result<BatchReaderState> {
        let cursor = Arc::clone(&self.cursor);
        let mut cursor = cursor.lock().await;

        if self.pending.is_none() {
            let found = cursor.next_delimiter().await?;
            self.operation = None;
            let outer = found.boundary == 0;
            match (self.changeset.is_some(), outer, found.kind) {
                (false, true, DelimiterKind::End) => return Ok(BatchReaderState::Completed),
                (true, true, _) => {
                    return Err(MalformedPayload::UnexpectedBoundary {
                        boundary: cursor.boundaries()[0].clone(),
                        changeset: self.changeset.clone().unwrap_or_default(),
                    }
                    .into());
                }
                (true, false, DelimiterKind::End) => {
                    cursor.pop_boundary();
                    self.changeset = None;
                    self.content_ids.clear();
                    return Ok(BatchReaderState::ChangesetEnd);
                }
                _ => self.pending = Some(PendingPart::default()),
            }
        }

        let mime = match self.pending.as_ref().and_then(|part| part.mime.clone()) {
            Some(mime) => mime,
            None => {
                let block = cursor.read_header_block(self.config.max_header_size).await?;
                let mime = self.parse_headers(&block)?;
                if let Some(part) = self.pending.as_mut() {
                    part.mime = Some(mime.clone());
                }
                mime
            }
        };

        let content_type = mime
            .content_type()
            .ok_or(MalformedPayload::MissingHeader {
                name: headers::CONTENT_TYPE,
            })?
            .to_owned();
        match headers::media_type(&content_type) {
            media if media.eq_ignore_ascii_case(headers::MULTIPART_MIXED) => {
                let boundary = self.changeset_start(&content_type, cursor.boundaries())?;
                cursor.push_boundary(boundary.clone());
                tracing::debug!(boundary = %boundary, "change set opened");
                self.changeset = Some(boundary);
                self.pending = None;
                Ok(BatchReaderState::ChangesetStart)
            }
            media if media.eq_ignore_ascii_case(headers::APPLICATION_HTTP) => {
                let block = cursor.read_header_block(self.config.max_header_size).await?;
                let operation = self.parse_operation(mime, &block)?;
                self.register_operation(&operation)?;
                self.operation = Some(operation);
                self.stream_requested = false;
                self.pending = None;
                Ok(BatchReaderState::Operation)
            }
            _ => Err(MalformedPayload::UnsupportedContentType { content_type }.into()),
        }
    }

    fn parse_headers(&self, block: &[u8]) -> Result<PartHeaders> {
        let lines = headers::decode_lines(block, self.config.encoding)?;
        Ok(headers::parse_header_lines(lines)?)
    }

    fn changeset_start(&mut self, content_type: &str, active: &[String]) -> Result<String> {
        if self.changeset.is_some() {
            return Err(MalformedPayload::NestedChangeset.into());
        }
        let boundary = headers::boundary_parameter(content_type).ok_or_else(|| {
            MalformedPayload::InvalidHeader {
                line: format!("{}: {content_type}", headers::CONTENT_TYPE),
            }
        })?;
        if active.iter().any(|outer| *outer == boundary) {
            return Err(MalformedPayload::DuplicateBoundary { boundary }.into());
        }
        self.count_part()?;
        self.changeset_operations = 0;
        self.content_ids.clear();
        Ok(boundary)
    }

    fn parse_operation(&self, part_headers: PartHeaders, block: &[u8]) -> Result<OperationMessage> {
        let lines = headers::decode_lines(block, self.config.encoding)?;
        let (first, rest) = lines.split_first().map_or(("", &[][..]), |(first, rest)| {
            (first.as_str(), rest)
        });
        let head = match self.config.message_kind {
            MessageKind::Request => MessageHead::Request(first.parse::<RequestLine>()?),
            MessageKind::Response => MessageHead::Response(first.parse::<StatusLine>()?),
        };
        let message_headers = headers::parse_header_lines(rest)?;
        let uri = match &head {
            MessageHead::Request(line) => resolve_request_target(
                line.target(),
                message_headers.get(headers::HOST),
                self.config.base_uri.as_ref(),
                self.config.uri_option,
            )?,
            MessageHead::Response(_) => None,
        };
        let content_id = part_headers
            .content_id()
            .or_else(|| message_headers.content_id())
            .map(str::to_owned);
        let framing = message_headers
            .content_length()?
            .map_or(BodyFraming::Delimited, BodyFraming::Length);
        Ok(OperationMessage {
            part_headers,
            head,
            headers: message_headers,
            uri,
            content_id,
            changeset: self.changeset.clone(),
            framing,
        })
    }

    fn register_operation(&mut self, operation: &OperationMessage) -> Result<()> {
        if self.changeset.is_some() {
            self.changeset_operations += 1;
            let limit = self.config.limits.max_operations_per_changeset;
            if self.changeset_operations > limit {
                return Err(MalformedPayload::QuotaExceeded {
                    what: "operations per change set",
                    limit,
                }
                .into());
            }
            if let Some(id) = operation.content_id() {
                if !self.content_ids.insert(id.to_owned()) {
                    return Err(MalformedPayload::DuplicateContentId {
                        content_id: id.to_owned(),
                    }
                    .into());
                }
            }
        } else {
            self.count_part()?;
        }
        if let Some(validator) = &self.config.validator {
            validator
                .validate(operation)
                .map_err(|reason| MalformedPayload::Rejected { reason })?;
        }
        tracing::debug!(
            operation = %operation,
            content_id = operation.content_id(),
            changeset = operation.changeset(),
            "operation parsed"
        );
        Ok(())
    }

    fn count_part(&mut self) -> Result<()> {
        self.parts += 1;
        let limit = self.config.limits.max_parts_per_batch;
        if self.parts > limit {
            return Err(MalformedPayload::QuotaExceeded {
                what: "parts per batch",
                limit,
            }
            .into());
        }
        Ok(())
    }
}

impl<R> std::fmt::Debug for BatchReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchReader")
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("changeset", &self.changeset)
            .field("stream_open", &self.tracker.is_open())
            .finish_non_exhaustive()
    }
}
