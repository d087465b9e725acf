//! Content stream listener that records every notification.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use batchframe::ContentStreamListener;
use rstest::fixture;

/// Counts synchronous and asynchronous lifecycle notifications separately.
#[derive(Debug, Default)]
pub struct RecordingListener {
    requested: AtomicUsize,
    requested_async: AtomicUsize,
    disposed: AtomicUsize,
    disposed_async: AtomicUsize,
}

impl RecordingListener {
    /// Synchronous `stream_requested` calls.
    #[must_use]
    pub fn requested(&self) -> usize { self.requested.load(Ordering::SeqCst) }

    /// Asynchronous `stream_requested_async` calls.
    #[must_use]
    pub fn requested_async(&self) -> usize { self.requested_async.load(Ordering::SeqCst) }

    /// Synchronous `stream_disposed` calls.
    #[must_use]
    pub fn disposed(&self) -> usize { self.disposed.load(Ordering::SeqCst) }

    /// Asynchronous `stream_disposed_async` calls.
    #[must_use]
    pub fn disposed_async(&self) -> usize { self.disposed_async.load(Ordering::SeqCst) }

    /// Disposal notifications of either kind.
    #[must_use]
    pub fn total_disposed(&self) -> usize { self.disposed() + self.disposed_async() }
}

#[async_trait]
impl ContentStreamListener for RecordingListener {
    fn stream_requested(&self) { self.requested.fetch_add(1, Ordering::SeqCst); }

    async fn stream_requested_async(&self) {
        self.requested_async.fetch_add(1, Ordering::SeqCst);
    }

    fn stream_disposed(&self) { self.disposed.fetch_add(1, Ordering::SeqCst); }

    async fn stream_disposed_async(&self) { self.disposed_async.fetch_add(1, Ordering::SeqCst); }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
/// Fresh shared [`RecordingListener`].
#[fixture]
pub fn recording_listener() -> Arc<RecordingListener> { Arc::new(RecordingListener::default()) }
