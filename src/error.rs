//! Canonical error and result types for the crate.
//!
//! Failures fall into three groups, mirroring how the reader reacts to them:
//!
//! - [`MalformedPayload`]: the bytes on the wire do not form a valid batch. The reader moves to
//!   [`Exception`](crate::BatchReaderState::Exception) and refuses further work.
//! - Protocol misuse ([`BatchError::InvalidOperation`], [`BatchError::NotSupported`],
//!   [`BatchError::ObjectDisposed`]): the caller asked for something the current state does not
//!   allow. State and scan position are left untouched so the caller may retry correctly.
//! - Transport conditions ([`BatchError::Io`], [`BatchError::Cancelled`]).

use std::io;

use thiserror::Error;

/// Wire-level problems found while framing or parsing a batch payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MalformedPayload {
    /// A delimiter for `boundary` was required but never appeared.
    #[error("missing boundary delimiter `--{boundary}`")]
    MissingBoundary {
        /// Boundary token that was expected.
        boundary: String,
    },

    /// A delimiter of an enclosing boundary appeared inside a change set.
    #[error("unexpected delimiter `--{boundary}` inside change set `{changeset}`")]
    UnexpectedBoundary {
        /// Boundary token that was found.
        boundary: String,
        /// Boundary of the change set that was still open.
        changeset: String,
    },

    /// The transport ended before the payload was complete.
    #[error("unexpected end of stream while {context}")]
    UnexpectedEndOfStream {
        /// What the engine was doing when the stream ended.
        context: &'static str,
    },

    /// A header block grew beyond the configured maximum.
    #[error("header block exceeds {max} bytes")]
    HeadersTooLarge {
        /// Configured maximum header block size.
        max: usize,
    },

    /// Header bytes could not be decoded with the configured encoding.
    #[error("header text is not valid {encoding}")]
    InvalidHeaderEncoding {
        /// Name of the configured encoding.
        encoding: &'static str,
    },

    /// A header line lacks a `name: value` shape.
    #[error("invalid header line `{line}`")]
    InvalidHeader {
        /// Offending line as decoded.
        line: String,
    },

    /// A header required to interpret the part is absent.
    #[error("missing required header `{name}`")]
    MissingHeader {
        /// Header name.
        name: &'static str,
    },

    /// The part's `Content-Type` is neither `application/http` nor `multipart/mixed`.
    #[error("unsupported part content type `{content_type}`")]
    UnsupportedContentType {
        /// Content type as received.
        content_type: String,
    },

    /// The first line of an embedded request is not `METHOD target VERSION`.
    #[error("invalid request line `{line}`")]
    InvalidRequestLine {
        /// Offending line as decoded.
        line: String,
    },

    /// The first line of an embedded response is not `VERSION status reason`.
    #[error("invalid status line `{line}`")]
    InvalidStatusLine {
        /// Offending line as decoded.
        line: String,
    },

    /// A request target could not be turned into a URI.
    #[error("invalid request URI `{uri}`: {reason}")]
    InvalidUri {
        /// Target text as received.
        uri: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A `Content-Length` header is not a non-negative integer.
    #[error("invalid Content-Length `{value}`")]
    InvalidContentLength {
        /// Header value as received.
        value: String,
    },

    /// A change set was opened inside another change set.
    #[error("change sets must not be nested")]
    NestedChangeset,

    /// A change set declared the same boundary as its enclosing batch.
    #[error("change set boundary `{boundary}` repeats the batch boundary")]
    DuplicateBoundary {
        /// Offending boundary token.
        boundary: String,
    },

    /// Two operations in one change set share a `Content-ID`.
    #[error("duplicate Content-ID `{content_id}` in change set")]
    DuplicateContentId {
        /// Repeated identifier.
        content_id: String,
    },

    /// A configured quota was exceeded.
    #[error("{what} exceeds limit of {limit}")]
    QuotaExceeded {
        /// Quota that was hit.
        what: &'static str,
        /// Configured limit.
        limit: usize,
    },

    /// The host's operation validator rejected a part.
    #[error("operation rejected: {reason}")]
    Rejected {
        /// Reason returned by the validator.
        reason: String,
    },
}

/// Top-level error type exposed by `batchframe`.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The payload is malformed; the reader or writer is faulted.
    #[error("malformed batch payload: {0}")]
    Malformed(#[from] MalformedPayload),

    /// The call is not legal in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The call is never supported by this object.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// The content stream was already disposed.
    #[error("content stream has been disposed")]
    ObjectDisposed,

    /// A refill or disposal await observed cancellation.
    #[error("operation was cancelled")]
    Cancelled,

    /// An earlier failure left the reader or writer in its terminal error state.
    #[error("batch {0} is in the exception state after an earlier failure")]
    Faulted(&'static str),

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BatchError {
    pub(crate) fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation(reason.into())
    }

    /// Returns true if the payload itself is malformed.
    #[must_use]
    pub fn is_malformed(&self) -> bool { matches!(self, Self::Malformed(_)) }

    /// Returns true for caller mistakes that leave the engine usable.
    ///
    /// # Examples
    ///
    /// ```
    /// use batchframe::BatchError;
    ///
    /// assert!(BatchError::ObjectDisposed.is_misuse());
    /// assert!(!BatchError::Cancelled.is_misuse());
    /// ```
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperation(_) | Self::NotSupported(_) | Self::ObjectDisposed
        )
    }

    /// Returns the error category as a string for logging.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::InvalidOperation(_) | Self::NotSupported(_) | Self::ObjectDisposed => "misuse",
            Self::Cancelled => "cancelled",
            Self::Faulted(_) => "faulted",
            Self::Io(_) => "io",
        }
    }

    /// Whether the reader or writer must enter its exception state.
    pub(crate) fn faults_engine(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::Io(_))
    }
}

impl From<BatchError> for io::Error {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Io(e) => e,
            BatchError::Malformed(e @ MalformedPayload::UnexpectedEndOfStream { .. }) => {
                io::Error::new(io::ErrorKind::UnexpectedEof, e)
            }
            BatchError::Malformed(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            e @ BatchError::NotSupported(_) => io::Error::new(io::ErrorKind::Unsupported, e),
            other => io::Error::other(other),
        }
    }
}

/// Canonical result alias used by `batchframe` public APIs.
pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
