//! Host-facing callback traits.
//!
//! [`ContentStreamListener`] receives lifecycle notifications from content
//! streams, while [`OperationValidator`] lets the host veto individual
//! operations as the reader parses them.

use async_trait::async_trait;

use crate::message::OperationMessage;

/// Lifecycle observer bound to a content stream.
///
/// A stream holds exactly one listener for its whole life and notifies it
/// at most once per event. Streams created in synchronous mode only call
/// the plain methods; streams created in asynchronous mode await the
/// `_async` variants, which default to the plain ones.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use batchframe::ContentStreamListener;
///
/// #[derive(Default)]
/// struct CountingListener {
///     disposed: AtomicUsize,
/// }
///
/// impl ContentStreamListener for CountingListener {
///     fn stream_disposed(&self) { self.disposed.fetch_add(1, Ordering::SeqCst); }
/// }
/// ```
#[async_trait]
pub trait ContentStreamListener: Send + Sync {
    /// A content stream is about to be handed to the caller.
    fn stream_requested(&self) {}

    /// Asynchronous form of [`stream_requested`](Self::stream_requested).
    async fn stream_requested_async(&self) { self.stream_requested(); }

    /// The content stream was disposed.
    fn stream_disposed(&self);

    /// Asynchronous form of [`stream_disposed`](Self::stream_disposed).
    async fn stream_disposed_async(&self) { self.stream_disposed(); }
}

/// Validation hook run on every operation the reader parses.
///
/// A returned `Err` is reported as a malformed payload and faults the
/// reader. Closures of the right shape implement the trait.
///
/// # Examples
///
/// ```
/// use batchframe::{BatchConfig, OperationMessage};
///
/// let config = BatchConfig::default().with_validator(|op: &OperationMessage| {
///     match op.request() {
///         Some(line) if line.method() == "DELETE" => Err("deletes are disabled".to_owned()),
///         _ => Ok(()),
///     }
/// });
/// # let _ = config;
/// ```
pub trait OperationValidator: Send + Sync {
    /// Accept or reject `operation`.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the operation is rejected.
    fn validate(&self, operation: &OperationMessage) -> Result<(), String>;
}

impl<F> OperationValidator for F
where
    F: Fn(&OperationMessage) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, operation: &OperationMessage) -> Result<(), String> { self(operation) }
}
