//! Unit tests for content streams and the stream tracker.

use std::{
    future,
    sync::atomic::{AtomicUsize, Ordering},
};

use batchframe_testing::ChunkedReader;
use rstest::{fixture, rstest};
use tracing_test::traced_test;

use super::*;
use crate::cursor::FramedCursor;

#[derive(Default)]
struct Counter {
    sync_disposed: AtomicUsize,
    async_disposed: AtomicUsize,
}

#[async_trait]
impl ContentStreamListener for Counter {
    fn stream_disposed(&self) { self.sync_disposed.fetch_add(1, Ordering::SeqCst); }

    async fn stream_disposed_async(&self) { self.async_disposed.fetch_add(1, Ordering::SeqCst); }
}

/// Listener whose async disposal never completes.
struct Hanging;

#[async_trait]
impl ContentStreamListener for Hanging {
    fn stream_disposed(&self) {}

    async fn stream_disposed_async(&self) { future::pending::<()>().await }
}

/// Listener that counts disposal, then never completes the async hook.
#[derive(Default)]
struct Stalling {
    disposed: AtomicUsize,
}

#[async_trait]
impl ContentStreamListener for Stalling {
    fn stream_disposed(&self) { self.disposed.fetch_add(1, Ordering::SeqCst); }

    async fn stream_disposed_async(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        future::pending::<()>().await;
    }
}

#[fixture]
fn counter() -> Arc<Counter> { Arc::new(Counter::default()) }

fn shared(payload: &'static [u8]) -> SharedCursor<ChunkedReader> {
    Arc::new(Mutex::new(FramedCursor::new(
        ChunkedReader::new(payload, 4),
        "b1",
        16,
    )))
}

fn body_stream(
    payload: &'static [u8],
    listener: Arc<dyn ContentStreamListener>,
    mode: StreamMode,
) -> ContentStream<PartBody<ChunkedReader>> {
    ContentStream::new(PartBody::delimited(shared(payload)), listener, mode, None)
}

#[rstest]
#[tokio::test]
async fn second_dispose_is_a_no_op(counter: Arc<Counter>) {
    let mut stream = body_stream(b"x\r\n--b1--", counter.clone(), StreamMode::Asynchronous);
    stream.dispose().await.expect("first dispose");
    stream.dispose().await.expect("second dispose");
    drop(stream);
    assert_eq!(counter.async_disposed.load(Ordering::SeqCst), 1);
    assert_eq!(counter.sync_disposed.load(Ordering::SeqCst), 0);
}

#[rstest]
fn synchronous_stream_only_uses_blocking_hook(counter: Arc<Counter>) {
    let mut stream = body_stream(b"x\r\n--b1--", counter.clone(), StreamMode::Synchronous);
    let err = futures::executor::block_on(stream.dispose()).expect_err("wrong call style");
    assert!(err.is_misuse());
    assert!(!stream.is_disposed());

    stream.dispose_blocking().expect("dispose");
    stream.dispose_blocking().expect("idempotent");
    assert_eq!(counter.sync_disposed.load(Ordering::SeqCst), 1);
    assert_eq!(counter.async_disposed.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn asynchronous_stream_rejects_blocking_dispose(counter: Arc<Counter>) {
    let mut stream = body_stream(b"--b1--", counter, StreamMode::Asynchronous);
    assert!(matches!(
        stream.dispose_blocking(),
        Err(BatchError::InvalidOperation(_))
    ));
    stream.dispose().await.expect("dispose");
}

#[rstest]
#[tokio::test]
async fn reads_after_dispose_fail(counter: Arc<Counter>) {
    let mut stream = body_stream(b"abc\r\n--b1--", counter, StreamMode::Asynchronous);
    let mut buf = [0_u8; 2];
    assert_eq!(stream.read(&mut buf).await.expect("open read"), 2);
    stream.dispose().await.expect("dispose");
    assert!(matches!(
        stream.read(&mut buf).await,
        Err(BatchError::ObjectDisposed)
    ));
}

#[rstest]
fn seek_is_not_supported(counter: Arc<Counter>) {
    let mut stream = body_stream(b"--b1--", counter, StreamMode::Synchronous);
    assert!(matches!(
        stream.seek(SeekFrom::Start(0)),
        Err(BatchError::NotSupported(_))
    ));
    stream.dispose_blocking().expect("dispose");
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn dropping_open_stream_disposes_through_blocking_hook(counter: Arc<Counter>) {
    let stream = body_stream(b"--b1--", counter.clone(), StreamMode::Asynchronous);
    drop(stream);
    assert_eq!(counter.sync_disposed.load(Ordering::SeqCst), 1);
    assert!(logs_contain("content stream dropped while open"));
}

#[rstest]
#[tokio::test]
async fn cancelled_dispose_leaves_stream_open() {
    let token = CancellationToken::new();
    token.cancel();
    let mut stream = ContentStream::new(
        PartBody::delimited(shared(b"--b1--")),
        Arc::new(Hanging),
        StreamMode::Asynchronous,
        Some(token),
    );
    assert!(matches!(stream.dispose().await, Err(BatchError::Cancelled)));
    assert!(!stream.is_disposed());
}

#[rstest]
#[tokio::test]
async fn disposal_cancelled_mid_hook_notifies_once() {
    let token = CancellationToken::new();
    let observer = Arc::new(Stalling::default());
    let tracker = StreamTracker::new(Some(observer.clone()));
    tracker.mark_open();
    let mut stream = ContentStream::new(
        PartBody::delimited(shared(b"--b1--")),
        tracker.clone(),
        StreamMode::Asynchronous,
        Some(token.clone()),
    );

    let (result, ()) = tokio::join!(stream.dispose(), async {
        tokio::task::yield_now().await;
        token.cancel();
    });
    assert!(matches!(result, Err(BatchError::Cancelled)));
    assert!(stream.is_disposed());
    assert!(!tracker.is_open());

    stream.dispose().await.expect("already disposed");
    drop(stream);
    assert_eq!(observer.disposed.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn delimited_body_reads_to_delimiter(counter: Arc<Counter>) {
    let mut stream = body_stream(
        b"{\"name\":\"--b\"}\r\n--b1--\r\n",
        counter,
        StreamMode::Asynchronous,
    );
    let mut body = Vec::new();
    stream.read_to_end(&mut body).await.expect("body");
    assert_eq!(body, b"{\"name\":\"--b\"}");
    stream.dispose().await.expect("dispose");
}

#[rstest]
#[tokio::test]
async fn length_body_stops_at_length(counter: Arc<Counter>) {
    let mut stream = ContentStream::new(
        PartBody::with_length(shared(b"0123456789--b1--"), 6),
        counter,
        StreamMode::Asynchronous,
        None,
    );
    let mut body = Vec::new();
    assert_eq!(stream.read_to_end(&mut body).await.expect("body"), 6);
    assert_eq!(body, b"012345");
    stream.dispose().await.expect("dispose");
}

#[rstest]
#[tokio::test]
async fn short_length_body_is_malformed(counter: Arc<Counter>) {
    let mut stream = ContentStream::new(
        PartBody::with_length(shared(b"0123"), 6),
        counter,
        StreamMode::Asynchronous,
        None,
    );
    let mut body = Vec::new();
    let err = stream.read_to_end(&mut body).await.expect_err("truncated");
    assert!(err.is_malformed());
    assert_eq!(body, b"0123");
    stream.dispose().await.expect("dispose");
}

#[rstest]
#[tokio::test]
async fn sink_writes_to_shared_output(counter: Arc<Counter>) {
    let output = Arc::new(Mutex::new(Vec::new()));
    let mut stream = ContentStream::new(
        PartSink::new(output.clone()),
        counter,
        StreamMode::Asynchronous,
        None,
    );
    stream.write_all(b"{\"id\":1}").await.expect("write");
    stream.flush().await.expect("flush");
    stream.dispose().await.expect("dispose");
    assert!(matches!(
        stream.write(b"late").await,
        Err(BatchError::ObjectDisposed)
    ));
    assert_eq!(output.lock().await.as_slice(), b"{\"id\":1}");
}

#[rstest]
#[tokio::test]
async fn tracker_follows_stream_lifecycle(counter: Arc<Counter>) {
    let tracker = StreamTracker::new(Some(counter.clone()));
    tracker.mark_open();
    let mut stream = body_stream(b"--b1--", tracker.clone(), StreamMode::Asynchronous);
    assert!(tracker.is_open());
    stream.dispose().await.expect("dispose");
    assert!(!tracker.is_open());
    assert_eq!(counter.async_disposed.load(Ordering::SeqCst), 1);
}
