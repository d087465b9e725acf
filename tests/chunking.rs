//! Delimiter framing is independent of how the transport splits bytes.

use batchframe::{FramedCursor, scanner::DelimiterKind};
use batchframe_testing::ChunkedReader;
use futures::executor::block_on;
use proptest::{
    prelude::{Strategy, any},
    prop_assert_eq,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestCaseError, TestRng, TestRunner},
};

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    TestRunner::new_with_rng(config, TestRng::deterministic_rng(RngAlgorithm::ChaCha))
}

/// Body bytes without `-`, so no delimiter can appear by accident.
fn body() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>().prop_filter("no dashes", |b| *b != b'-'), 0..256)
}

fn boundary() -> impl Strategy<Value = String> { "[a-z0-9_]{1,24}" }

async fn frame(
    body: &[u8],
    boundary: &str,
    end: bool,
    chunk: usize,
    step: usize,
) -> batchframe::Result<(Vec<u8>, DelimiterKind)> {
    let mut payload = body.to_vec();
    payload.extend_from_slice(format!("\r\n--{boundary}").as_bytes());
    payload.extend_from_slice(if end { b"--\r\n" } else { b"\r\nrest" });

    let mut cursor = FramedCursor::new(ChunkedReader::new(payload, chunk), boundary, chunk);
    let mut out = Vec::new();
    let mut buf = vec![0_u8; step];
    loop {
        let n = cursor.read_with_delimiter(&mut buf).await?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    let found = cursor.next_delimiter().await?;
    Ok((out, found.kind))
}

#[test]
fn body_and_delimiter_survive_any_chunking() {
    let mut runner = deterministic_runner(256);
    let strategy = (body(), boundary(), any::<bool>(), 1_usize..64, 1_usize..64);
    runner
        .run(&strategy, |(body, boundary, end, chunk, step)| {
            let (framed, kind) = block_on(frame(&body, &boundary, end, chunk, step))
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
            let (whole, whole_kind) = block_on(frame(&body, &boundary, end, 4096, 4096))
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
            prop_assert_eq!(&framed, &body);
            prop_assert_eq!(&whole, &body);
            prop_assert_eq!(kind, whole_kind);
            let expected = if end { DelimiterKind::End } else { DelimiterKind::Part };
            prop_assert_eq!(kind, expected);
            Ok(())
        })
        .expect("framing is chunking invariant");
}
