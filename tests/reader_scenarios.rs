//! End-to-end reader behaviour over hand-built payloads.

mod common;

use std::sync::Arc;

use batchframe::{BatchConfig, BatchError, BatchReader, BatchReaderState};
use batchframe_testing::{BatchBuilder, ChunkedReader, RecordingListener, recording_listener};
use common::{describe, walk};
use rstest::rstest;

fn two_gets() -> Vec<u8> {
    BatchBuilder::new("batch_123")
        .operation(None, "GET /Customers(1) HTTP/1.1", &[], "")
        .operation(None, "GET /Orders(2) HTTP/1.1", &[], "")
        .finish()
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(13)]
#[case(8192)]
#[tokio::test]
async fn two_top_level_gets_then_completed(
    #[case] chunk: usize,
    #[from(recording_listener)] listener: Arc<RecordingListener>,
) {
    let config = BatchConfig::default().with_listener(listener.clone());
    let mut reader = BatchReader::new(ChunkedReader::new(two_gets(), chunk), "batch_123", config);
    assert_eq!(describe(&reader), "Initial");

    let seen = walk(&mut reader).await.expect("well-formed batch");
    assert_eq!(
        seen,
        [
            "Operation(GET /Customers(1)) ",
            "Operation(GET /Orders(2)) ",
            "Completed",
        ]
    );
    assert_eq!(listener.requested_async(), 2);
    assert_eq!(listener.disposed_async(), 2);
    assert_eq!(listener.disposed(), 0);
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(64)]
#[tokio::test]
async fn early_abandon_does_not_leak_into_next_part(#[case] chunk: usize) {
    let long_body = "x".repeat(300);
    let payload = BatchBuilder::new("batch_1")
        .operation(None, "POST http://h/svc/Blobs HTTP/1.1", &[], &long_body)
        .start_changeset("cs_1")
        .operation(Some("a"), "POST http://h/svc/Blobs HTTP/1.1", &[], &long_body)
        .operation(Some("b"), "PATCH http://h/svc/Blobs(1) HTTP/1.1", &[], "{\"k\":1}")
        .end_changeset()
        .finish();
    let mut reader = BatchReader::new(
        ChunkedReader::new(payload, chunk),
        "batch_1",
        BatchConfig::default(),
    );

    let mut bodies = Vec::new();
    while reader.read().await.expect("well-formed batch") {
        if reader.state() != BatchReaderState::Operation {
            continue;
        }
        let mut stream = reader.content_stream().await.expect("stream");
        let mut prefix = [0_u8; 7];
        let n = stream.read(&mut prefix).await.expect("prefix");
        bodies.push(String::from_utf8_lossy(&prefix[..n]).into_owned());
        stream.dispose().await.expect("abandon body");
    }
    assert_eq!(bodies.len(), 3);
    assert!(bodies[0].starts_with('x'));
    assert!(bodies[1].starts_with('x'));
    assert!(bodies[2].starts_with('{'));
}

#[rstest]
#[tokio::test]
async fn dispose_twice_notifies_once(
    #[from(recording_listener)] listener: Arc<RecordingListener>,
) {
    let config = BatchConfig::default().with_listener(listener.clone());
    let payload = two_gets();
    let mut reader = BatchReader::new(payload.as_slice(), "batch_123", config);
    assert!(reader.read().await.expect("operation"));
    let mut stream = reader.content_stream().await.expect("stream");
    stream.dispose().await.expect("first");
    stream.dispose().await.expect("second");
    drop(stream);
    assert_eq!(listener.total_disposed(), 1);
}

#[rstest]
#[tokio::test]
async fn out_of_order_read_keeps_scan_position() {
    let payload = BatchBuilder::new("batch_1")
        .operation(None, "POST http://h/svc/Notes HTTP/1.1", &[], "note body")
        .operation(None, "GET http://h/svc/Notes HTTP/1.1", &[], "")
        .finish();
    let mut reader = BatchReader::new(
        ChunkedReader::new(payload, 2),
        "batch_1",
        BatchConfig::default(),
    );
    assert!(reader.read().await.expect("first"));
    let mut stream = reader.content_stream().await.expect("stream");

    for _ in 0..3 {
        let err = reader.read().await.expect_err("stream still open");
        assert!(err.is_misuse());
        assert_eq!(reader.state(), BatchReaderState::Operation);
    }

    let mut body = Vec::new();
    stream.read_to_end(&mut body).await.expect("body");
    assert_eq!(body, b"note body");
    stream.dispose().await.expect("dispose");
    assert!(reader.read().await.expect("second"));
    assert_eq!(describe(&reader), "Operation(GET http://h/svc/Notes)");
}

#[rstest]
#[tokio::test]
async fn dropped_stream_releases_reader(
    #[from(recording_listener)] listener: Arc<RecordingListener>,
) {
    let config = BatchConfig::default().with_listener(listener.clone());
    let payload = two_gets();
    let mut reader = BatchReader::new(payload.as_slice(), "batch_123", config);
    assert!(reader.read().await.expect("operation"));
    drop(reader.content_stream().await.expect("stream"));
    assert_eq!(listener.disposed(), 1);
    assert!(reader.read().await.expect("second operation"));
}

#[rstest]
#[tokio::test]
async fn faulted_reader_rejects_every_call() {
    let payload = BatchBuilder::new("batch_1")
        .operation(None, "GET http://h/svc/A HTTP/1.1", &[], "")
        .unterminated();
    let mut reader = BatchReader::new(payload.as_slice(), "batch_1", BatchConfig::default());
    assert!(reader.read().await.expect("operation"));
    let err = reader.read().await.expect_err("missing closing delimiter");
    assert!(err.is_malformed());
    assert_eq!(reader.state(), BatchReaderState::Exception);
    assert!(matches!(reader.read().await, Err(BatchError::Faulted(_))));
    assert!(matches!(
        reader.content_stream().await,
        Err(BatchError::Faulted(_))
    ));
}
