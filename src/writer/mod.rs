//! Batch payload writer.
//!
//! [`BatchWriter`] frames operations and change sets onto an output
//! transport in the order the caller supplies them, rejecting any call the
//! current [`BatchWriterState`] does not allow. Operation bodies are written
//! through a [`ContentStream`]; the writer will not frame anything else
//! until that stream is disposed.

use std::{collections::HashSet, fmt, sync::Arc};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use uuid::Uuid;

use crate::{
    config::BatchConfig,
    content::{ContentStream, PartSink, StreamMode, StreamTracker},
    error::{BatchError, MalformedPayload, Result},
    headers::{self, PartHeaders},
    hooks::ContentStreamListener,
    message::{HTTP_VERSION, MessageKind, OperationRequest, OperationResponse},
    uri::format_request_target,
};

/// Position of a [`BatchWriter`] in the payload it is producing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchWriterState {
    /// Nothing written yet.
    Start,
    /// `write_start_batch` was called.
    BatchStarted,
    /// A change set envelope was written.
    ChangesetStarted,
    /// An operation's head was written; its body may be requested.
    OperationCreated,
    /// The operation's content stream is open.
    OperationStreamRequested,
    /// The operation's content stream was disposed.
    OperationStreamDisposed,
    /// The open change set was closed.
    ChangesetCompleted,
    /// The closing batch delimiter was written.
    BatchCompleted,
    /// A transport failure or invalid payload ended writing.
    Error,
}

use BatchWriterState as S;

const OPERATION_PREDECESSORS: &[BatchWriterState] = &[
    S::BatchStarted,
    S::ChangesetStarted,
    S::OperationCreated,
    S::OperationStreamDisposed,
    S::ChangesetCompleted,
];

/// Writer state machine over one batch payload.
///
/// # Examples
///
/// ```
/// use batchframe::{BatchConfig, BatchWriter, OperationRequest};
/// use url::Url;
///
/// # futures::executor::block_on(async {
/// let mut writer = BatchWriter::new(Vec::new(), "b", BatchConfig::default());
/// writer.write_start_batch().await.expect("start");
/// let uri = Url::parse("http://host/svc/Customers(1)").expect("valid uri");
/// writer.write_request(&OperationRequest::new("GET", uri)).await.expect("request");
/// writer.write_end_batch().await.expect("end");
///
/// let payload = String::from_utf8(writer.into_inner().expect("no open stream"))
///     .expect("ascii payload");
/// assert!(payload.starts_with("--b\r\nContent-Type: application/http\r\n"));
/// assert!(payload.ends_with("\r\n--b--\r\n"));
/// # });
/// ```
pub struct BatchWriter<W> {
    output: Arc<Mutex<W>>,
    boundary: String,
    config: BatchConfig,
    mode: StreamMode,
    state: BatchWriterState,
    tracker: Arc<StreamTracker>,
    changeset: Option<String>,
    content_ids: HashSet<String>,
    parts: usize,
    changeset_operations: usize,
    written: bool,
}

impl<W> BatchWriter<W> {
    /// Create an asynchronous writer framing parts with `boundary`.
    pub fn new(output: W, boundary: impl Into<String>, config: BatchConfig) -> Self {
        Self::with_mode(output, boundary, config, StreamMode::Asynchronous)
    }

    pub(crate) fn with_mode(
        output: W,
        boundary: impl Into<String>,
        config: BatchConfig,
        mode: StreamMode,
    ) -> Self {
        let tracker = StreamTracker::new(config.listener.clone());
        Self {
            output: Arc::new(Mutex::new(output)),
            boundary: boundary.into(),
            config,
            mode,
            state: S::Start,
            tracker,
            changeset: None,
            content_ids: HashSet::new(),
            parts: 0,
            changeset_operations: 0,
            written: false,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BatchWriterState { self.state }

    /// Outer batch boundary.
    #[must_use]
    pub fn boundary(&self) -> &str { &self.boundary }

    /// Boundary of the change set currently open, if any.
    #[must_use]
    pub fn changeset_boundary(&self) -> Option<&str> { self.changeset.as_deref() }

    /// Return the output transport.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] while a content stream
    /// created by this writer is still alive.
    pub fn into_inner(self) -> Result<W> {
        Arc::try_unwrap(self.output)
            .map(Mutex::into_inner)
            .map_err(|_| BatchError::invalid_operation("a content stream is still alive"))
    }

    /// Check for the terminal error state and observe stream disposal.
    fn settle(&mut self) -> Result<()> {
        if self.state == S::Error {
            return Err(BatchError::Faulted("writer"));
        }
        if self.state == S::OperationStreamRequested {
            if self.tracker.is_open() {
                return Err(BatchError::invalid_operation(
                    "the operation content stream must be disposed before writing on",
                ));
            }
            self.state = S::OperationStreamDisposed;
        }
        Ok(())
    }

    fn expect_state(&self, allowed: &[BatchWriterState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BatchError::invalid_operation(format!(
                "cannot {action} in the {:?} state",
                self.state
            )))
        }
    }

    fn transition(&mut self, next: BatchWriterState) {
        tracing::debug!(from = ?self.state, to = ?next, "batch writer advanced");
        self.state = next;
    }

    fn delimiter(&self, out: &mut String) {
        if self.written {
            out.push_str("\r\n");
        }
        let active = self.changeset.as_deref().unwrap_or(&self.boundary);
        out.push_str("--");
        out.push_str(active);
        out.push_str("\r\n");
    }

    fn open_stream(&mut self, mode: StreamMode) -> Result<ContentStream<PartSink<W>>> {
        self.settle()?;
        if mode != self.mode {
            return Err(BatchError::invalid_operation(format!(
                "writer was created in {:?} mode",
                self.mode
            )));
        }
        self.expect_state(&[S::OperationCreated], "request a content stream")?;
        self.tracker.mark_open();
        self.transition(S::OperationStreamRequested);
        let listener: Arc<dyn ContentStreamListener> = self.tracker.clone();
        Ok(ContentStream::new(
            PartSink::new(Arc::clone(&self.output)),
            listener,
            mode,
            self.config.cancellation.clone(),
        ))
    }

    /// Request the body stream of the current operation from a synchronous
    /// writer.
    pub(crate) fn content_stream_blocking(&mut self) -> Result<ContentStream<PartSink<W>>> {
        let stream = self.open_stream(StreamMode::Synchronous)?;
        self.tracker.stream_requested();
        Ok(stream)
    }

    /// Validate and count an operation before anything is written.
    fn admit_operation(&mut self, content_id: Option<&str>) -> Result<()> {
        if self.changeset.is_some() {
            let limit = self.config.limits.max_operations_per_changeset;
            if self.changeset_operations >= limit {
                return Err(MalformedPayload::QuotaExceeded {
                    what: "operations per change set",
                    limit,
                }
                .into());
            }
            if let Some(id) = content_id {
                if self.content_ids.contains(id) {
                    return Err(MalformedPayload::DuplicateContentId {
                        content_id: id.to_owned(),
                    }
                    .into());
                }
            }
        } else {
            self.admit_part()?;
        }
        Ok(())
    }

    fn admit_part(&self) -> Result<()> {
        let limit = self.config.limits.max_parts_per_batch;
        if self.parts >= limit {
            return Err(MalformedPayload::QuotaExceeded {
                what: "parts per batch",
                limit,
            }
            .into());
        }
        Ok(())
    }

    fn record_operation(&mut self, content_id: Option<&str>) {
        if self.changeset.is_some() {
            self.changeset_operations += 1;
            if let Some(id) = content_id {
                self.content_ids.insert(id.to_owned());
            }
        } else {
            self.parts += 1;
        }
    }

    fn operation_head(
        &self,
        content_id: Option<&str>,
        first_line: &str,
        headers: &PartHeaders,
    ) -> String {
        let mut out = String::new();
        self.delimiter(&mut out);
        out.push_str(&format!(
            "{}: {}\r\n{}: binary\r\n",
            headers::CONTENT_TYPE,
            headers::APPLICATION_HTTP,
            headers::CONTENT_TRANSFER_ENCODING
        ));
        if let Some(id) = content_id {
            out.push_str(&format!("{}: {id}\r\n", headers::CONTENT_ID));
        }
        out.push_str("\r\n");
        out.push_str(first_line);
        out.push_str("\r\n");
        for (name, value) in headers.iter() {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out
    }

    fn fault<E: Into<BatchError>>(&mut self, err: E) -> BatchError {
        let err = err.into();
        if err.faults_engine() {
            tracing::warn!(error = %err, kind = err.error_type(), "batch writer faulted");
            self.state = S::Error;
        }
        err
    }
}

impl<W: AsyncWrite + Unpin> BatchWriter<W> {
    async fn emit(&mut self, text: &str) -> Result<()> {
        let bytes = self
            .config
            .encoding
            .encode(text)
            .map_err(|err| self.fault(err))?;
        let result = self.output.lock().await.write_all(&bytes).await;
        result.map_err(|err| self.fault(err))?;
        self.written = true;
        Ok(())
    }

    /// Begin the batch.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] unless the writer is in
    /// [`BatchWriterState::Start`].
    pub async fn write_start_batch(&mut self) -> Result<()> {
        self.settle()?;
        self.expect_state(&[S::Start], "start the batch")?;
        self.transition(S::BatchStarted);
        Ok(())
    }

    /// Open a change set and return its boundary.
    ///
    /// A boundary of the form `changeset_<uuid>` is generated when none is
    /// given.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] when a change set is already
    /// open, the state does not allow a new part, or `boundary` is empty,
    /// contains a line break or repeats the batch boundary. Quota and
    /// transport failures fault the writer.
    pub async fn write_start_changeset(&mut self, boundary: Option<&str>) -> Result<String> {
        self.settle()?;
        if self.changeset.is_some() {
            return Err(BatchError::invalid_operation("change sets cannot be nested"));
        }
        self.expect_state(OPERATION_PREDECESSORS, "start a change set")?;
        let boundary = match boundary {
            Some(b) if b.is_empty() || b.contains(['\r', '\n']) || b == self.boundary => {
                return Err(BatchError::invalid_operation(format!(
                    "`{b}` cannot be used as a change set boundary"
                )));
            }
            Some(b) => b.to_owned(),
            None => format!("changeset_{}", Uuid::new_v4()),
        };
        self.admit_part().map_err(|err| self.fault(err))?;

        let mut out = String::new();
        self.delimiter(&mut out);
        out.push_str(&format!(
            "{}: {}; boundary={boundary}\r\n\r\n",
            headers::CONTENT_TYPE,
            headers::MULTIPART_MIXED
        ));
        self.emit(&out).await?;

        self.parts += 1;
        self.changeset = Some(boundary.clone());
        self.changeset_operations = 0;
        self.content_ids.clear();
        self.transition(S::ChangesetStarted);
        Ok(boundary)
    }

    /// Frame a request operation.
    ///
    /// The request line is written according to the configured
    /// [`PayloadUriOption`](crate::PayloadUriOption); a `Host` header is
    /// added when the option calls for one and the request has none.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] for a response writer or an
    /// illegal state. A duplicate `Content-ID` inside a change set, an
    /// exceeded quota or a transport failure faults the writer.
    pub async fn write_request(&mut self, request: &OperationRequest) -> Result<()> {
        self.settle()?;
        if self.config.message_kind != MessageKind::Request {
            return Err(BatchError::invalid_operation("response writers cannot write requests"));
        }
        self.expect_state(OPERATION_PREDECESSORS, "write an operation")?;
        let content_id = request.content_id.as_deref();
        self.admit_operation(content_id).map_err(|err| self.fault(err))?;

        let target = format_request_target(
            &request.uri,
            self.config.base_uri.as_ref(),
            self.config.uri_option,
        );
        let mut message_headers = PartHeaders::new();
        if let Some(host) = target.host {
            if !request.headers.contains(headers::HOST) {
                message_headers.append(headers::HOST, host);
            }
        }
        for (name, value) in request.headers.iter() {
            message_headers.append(name, value);
        }
        let line = format!("{} {} {HTTP_VERSION}", request.method, target.target);
        let head = self.operation_head(content_id, &line, &message_headers);
        self.emit(&head).await?;

        self.record_operation(content_id);
        tracing::debug!(method = %request.method, target = %target.target, "request framed");
        self.transition(S::OperationCreated);
        Ok(())
    }

    /// Frame a response operation.
    ///
    /// # Errors
    ///
    /// As for [`write_request`](Self::write_request), with request writers
    /// refusing responses.
    pub async fn write_response(&mut self, response: &OperationResponse) -> Result<()> {
        self.settle()?;
        if self.config.message_kind != MessageKind::Response {
            return Err(BatchError::invalid_operation("request writers cannot write responses"));
        }
        self.expect_state(OPERATION_PREDECESSORS, "write an operation")?;
        let content_id = response.content_id.as_deref();
        self.admit_operation(content_id).map_err(|err| self.fault(err))?;

        let line = if response.reason.is_empty() {
            format!("{HTTP_VERSION} {}", response.status)
        } else {
            format!("{HTTP_VERSION} {} {}", response.status, response.reason)
        };
        let head = self.operation_head(content_id, &line, &response.headers);
        self.emit(&head).await?;

        self.record_operation(content_id);
        tracing::debug!(status = response.status, "response framed");
        self.transition(S::OperationCreated);
        Ok(())
    }

    /// Request the body stream of the current operation.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] unless an operation head was
    /// just written, or for a synchronous writer.
    pub async fn content_stream(&mut self) -> Result<ContentStream<PartSink<W>>> {
        let stream = self.open_stream(StreamMode::Asynchronous)?;
        self.tracker.stream_requested_async().await;
        Ok(stream)
    }

    /// Close the open change set.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] when no change set is open;
    /// a transport failure faults the writer.
    pub async fn write_end_changeset(&mut self) -> Result<()> {
        self.settle()?;
        let Some(boundary) = self.changeset.clone() else {
            return Err(BatchError::invalid_operation("no change set is open"));
        };
        self.expect_state(
            &[S::ChangesetStarted, S::OperationCreated, S::OperationStreamDisposed],
            "end a change set",
        )?;
        self.emit(&format!("\r\n--{boundary}--")).await?;
        self.changeset = None;
        self.content_ids.clear();
        self.transition(S::ChangesetCompleted);
        Ok(())
    }

    /// Write the closing batch delimiter and flush.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidOperation`] while a change set is open
    /// or outside a started batch; a transport failure faults the writer.
    pub async fn write_end_batch(&mut self) -> Result<()> {
        self.settle()?;
        if self.changeset.is_some() {
            return Err(BatchError::invalid_operation(
                "the open change set must be ended before the batch",
            ));
        }
        self.expect_state(
            &[
                S::BatchStarted,
                S::OperationCreated,
                S::OperationStreamDisposed,
                S::ChangesetCompleted,
            ],
            "end the batch",
        )?;
        let closing = if self.written {
            format!("\r\n--{}--\r\n", self.boundary)
        } else {
            format!("--{}--\r\n", self.boundary)
        };
        self.emit(&closing).await?;
        self.flush().await?;
        self.transition(S::BatchCompleted);
        Ok(())
    }

    /// Flush the output transport.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Faulted`] after an earlier failure; a transport
    /// failure faults the writer.
    pub async fn flush(&mut self) -> Result<()> {
        if self.state == S::Error {
            return Err(BatchError::Faulted("writer"));
        }
        let result = self.output.lock().await.flush().await;
        result.map_err(|err| self.fault(err))
    }
}

impl<W> fmt::Debug for BatchWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchWriter")
            .field("boundary", &self.boundary)
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("changeset", &self.changeset)
            .finish_non_exhaustive()
    }
}
