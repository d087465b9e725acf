//! Reader and writer configuration.
//!
//! [`BatchConfig`] is built once and handed to a reader or writer at
//! construction; nothing is looked up from process-wide state afterwards.

use std::{fmt, sync::Arc};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    encoding::HeaderEncoding,
    hooks::{ContentStreamListener, OperationValidator},
    message::MessageKind,
    uri::PayloadUriOption,
};

/// Default number of bytes requested from the transport per refill.
pub const DEFAULT_REFILL_SIZE: usize = 8 * 1024;

/// Smallest accepted refill size.
pub const MIN_REFILL_SIZE: usize = 16;

/// Largest accepted refill size (1 MiB).
pub const MAX_REFILL_SIZE: usize = 1024 * 1024;

/// Default cap on a single header block (64 KiB).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 64 * 1024;

/// Quotas applied while reading or writing a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum number of top-level parts (operations and change sets).
    pub max_parts_per_batch: usize,
    /// Maximum number of operations inside one change set.
    pub max_operations_per_changeset: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_parts_per_batch: 100,
            max_operations_per_changeset: 1000,
        }
    }
}

/// Construction-time settings shared by [`BatchReader`](crate::BatchReader)
/// and [`BatchWriter`](crate::BatchWriter).
///
/// # Examples
///
/// ```
/// use batchframe::{BatchConfig, HeaderEncoding, MessageKind, PayloadUriOption};
/// use url::Url;
///
/// let config = BatchConfig::default()
///     .with_message_kind(MessageKind::Response)
///     .with_encoding(HeaderEncoding::Latin1)
///     .with_uri_option(PayloadUriOption::RelativeUri)
///     .with_base_uri(Url::parse("http://host/service/$batch").expect("valid base"))
///     .with_refill_size(1);
/// assert_eq!(config.refill_size(), batchframe::config::MIN_REFILL_SIZE);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    pub(crate) encoding: HeaderEncoding,
    pub(crate) uri_option: PayloadUriOption,
    pub(crate) base_uri: Option<Url>,
    pub(crate) message_kind: MessageKind,
    pub(crate) refill_size: usize,
    pub(crate) max_header_size: usize,
    pub(crate) limits: BatchLimits,
    pub(crate) listener: Option<Arc<dyn ContentStreamListener>>,
    pub(crate) validator: Option<Arc<dyn OperationValidator>>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            encoding: HeaderEncoding::default(),
            uri_option: PayloadUriOption::default(),
            base_uri: None,
            message_kind: MessageKind::default(),
            refill_size: DEFAULT_REFILL_SIZE,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            limits: BatchLimits::default(),
            listener: None,
            validator: None,
            cancellation: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("encoding", &self.encoding)
            .field("uri_option", &self.uri_option)
            .field("base_uri", &self.base_uri.as_ref().map(Url::as_str))
            .field("message_kind", &self.message_kind)
            .field("refill_size", &self.refill_size)
            .field("max_header_size", &self.max_header_size)
            .field("limits", &self.limits)
            .field("listener", &self.listener.as_ref().map(|_| "ContentStreamListener"))
            .field("validator", &self.validator.as_ref().map(|_| "OperationValidator"))
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl BatchConfig {
    /// Set the encoding used for header text.
    #[must_use]
    pub fn with_encoding(mut self, encoding: HeaderEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the request-line URI policy.
    #[must_use]
    pub fn with_uri_option(mut self, option: PayloadUriOption) -> Self {
        self.uri_option = option;
        self
    }

    /// Set the URI of the batch request itself, used for relative targets.
    #[must_use]
    pub fn with_base_uri(mut self, base: Url) -> Self {
        self.base_uri = Some(base);
        self
    }

    /// Choose between request and response batches.
    #[must_use]
    pub fn with_message_kind(mut self, kind: MessageKind) -> Self {
        self.message_kind = kind;
        self
    }

    /// Set the transport refill size, clamped to
    /// [`MIN_REFILL_SIZE`]..=[`MAX_REFILL_SIZE`].
    #[must_use]
    pub fn with_refill_size(mut self, size: usize) -> Self {
        self.refill_size = size.clamp(MIN_REFILL_SIZE, MAX_REFILL_SIZE);
        self
    }

    /// Set the maximum size of one header block.
    #[must_use]
    pub fn with_max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size.max(1);
        self
    }

    /// Set batch quotas.
    #[must_use]
    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Observe the lifecycle of every content stream handed out.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ContentStreamListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Install an operation validator.
    #[must_use]
    pub fn with_validator(mut self, validator: impl OperationValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Abort refills and disposal awaits when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Configured header encoding.
    #[must_use]
    pub fn encoding(&self) -> HeaderEncoding { self.encoding }

    /// Configured request-line URI policy.
    #[must_use]
    pub fn uri_option(&self) -> PayloadUriOption { self.uri_option }

    /// Configured batch base URI.
    #[must_use]
    pub fn base_uri(&self) -> Option<&Url> { self.base_uri.as_ref() }

    /// Configured message kind.
    #[must_use]
    pub fn message_kind(&self) -> MessageKind { self.message_kind }

    /// Configured refill size.
    #[must_use]
    pub fn refill_size(&self) -> usize { self.refill_size }

    /// Configured maximum header block size.
    #[must_use]
    pub fn max_header_size(&self) -> usize { self.max_header_size }

    /// Configured quotas.
    #[must_use]
    pub fn limits(&self) -> BatchLimits { self.limits }
}
