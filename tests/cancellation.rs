//! Cancellation of refills and disposal awaits.

use batchframe::{BatchConfig, BatchError, BatchReader, BatchReaderState, FramedCursor};
use batchframe_testing::{BatchBuilder, ChunkedReader, Tail};
use tokio_util::sync::CancellationToken;

fn describe_operation<R>(reader: &BatchReader<R>) -> Option<String> {
    reader.operation().map(ToString::to_string)
}

#[tokio::test]
async fn cancelling_a_stalled_read_fails_without_faulting() {
    let token = CancellationToken::new();
    let payload = BatchBuilder::new("batch_1")
        .operation(None, "GET http://h/svc/A HTTP/1.1", &[], "")
        .unterminated();
    let transport = ChunkedReader::new(payload, 4096).with_tail(Tail::Stall);
    let mut reader = BatchReader::new(
        transport,
        "batch_1",
        BatchConfig::default().with_cancellation(token.clone()),
    );
    assert!(reader.read().await.expect("operation is fully buffered"));
    let before = describe_operation(&reader);
    assert_eq!(before.as_deref(), Some("GET http://h/svc/A"));

    let (result, ()) = tokio::join!(reader.read(), async {
        tokio::task::yield_now().await;
        token.cancel();
    });
    assert!(matches!(result, Err(BatchError::Cancelled)));
    assert_eq!(reader.state(), BatchReaderState::Operation);
    assert_eq!(describe_operation(&reader), before);

    assert!(matches!(reader.read().await, Err(BatchError::Cancelled)));
    assert_eq!(reader.state(), BatchReaderState::Operation);
    assert_eq!(describe_operation(&reader), before);
    let stream = reader
        .content_stream()
        .await
        .expect("body of the current operation is still available");
    drop(stream);
}

#[tokio::test]
async fn cancelled_header_read_keeps_buffered_bytes() {
    let token = CancellationToken::new();
    let payload: &'static [u8] = b"--b\r\nContent-Type: app";
    let transport = ChunkedReader::new(payload, 4096).with_tail(Tail::Stall);
    let mut cursor = FramedCursor::new(transport, "b", 64).with_cancellation(token.clone());
    cursor.next_delimiter().await.expect("opening delimiter");

    let (result, ()) = tokio::join!(cursor.read_header_block(1024), async {
        tokio::task::yield_now().await;
        token.cancel();
    });
    assert!(matches!(result, Err(BatchError::Cancelled)));
    assert_eq!(cursor.buffered(), b"Content-Type: app");
}

#[tokio::test]
async fn cancelled_skip_keeps_unread_body() {
    let token = CancellationToken::new();
    let payload: &'static [u8] = b"unread body bytes of the current part";
    let transport = ChunkedReader::new(payload, 4096).with_tail(Tail::Stall);
    let mut cursor = FramedCursor::new(transport, "b", 64).with_cancellation(token.clone());

    let (result, ()) = tokio::join!(cursor.next_delimiter(), async {
        tokio::task::yield_now().await;
        token.cancel();
    });
    assert!(matches!(result, Err(BatchError::Cancelled)));
    assert_eq!(cursor.buffered(), payload);
}
