//! Generated writer-to-reader round trips under arbitrary chunking.

mod common;

use batchframe::{BatchConfig, BatchReader, BatchWriter, OperationRequest, Result};
use batchframe_testing::ChunkedReader;
use futures::executor::block_on;
use proptest::{
    collection::vec,
    prelude::{Strategy, prop_oneof},
    prop_assert_eq,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestCaseError, TestRng, TestRunner},
};
use url::Url;

#[derive(Clone, Debug)]
enum Element {
    Operation(String),
    Changeset(Vec<String>),
}

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    TestRunner::new_with_rng(config, TestRng::deterministic_rng(RngAlgorithm::ChaCha))
}

fn body() -> impl Strategy<Value = String> { "[a-zA-Z0-9 {}:,\"\r\n]{0,48}" }

fn batch() -> impl Strategy<Value = Vec<Element>> {
    vec(
        prop_oneof![
            body().prop_map(Element::Operation),
            vec(body(), 0..4).prop_map(Element::Changeset),
        ],
        0..6,
    )
}

fn target() -> Url { Url::parse("http://host/svc/Items").expect("valid url") }

async fn write_batch(elements: &[Element]) -> Result<Vec<u8>> {
    let mut writer = BatchWriter::new(Vec::new(), "batch_rt", BatchConfig::default());
    writer.write_start_batch().await?;
    for element in elements {
        match element {
            Element::Operation(body) => write_operation(&mut writer, None, body).await?,
            Element::Changeset(bodies) => {
                writer.write_start_changeset(None).await?;
                for (index, body) in bodies.iter().enumerate() {
                    write_operation(&mut writer, Some(index.to_string()), body).await?;
                }
                writer.write_end_changeset().await?;
            }
        }
    }
    writer.write_end_batch().await?;
    writer.into_inner()
}

async fn write_operation(
    writer: &mut BatchWriter<Vec<u8>>,
    content_id: Option<String>,
    body: &str,
) -> Result<()> {
    let mut request = OperationRequest::new("POST", target());
    if let Some(id) = content_id {
        request = request.content_id(id);
    }
    writer.write_request(&request).await?;
    let mut stream = writer.content_stream().await?;
    stream.write_all(body.as_bytes()).await?;
    stream.dispose().await
}

fn expected(elements: &[Element]) -> Vec<String> {
    let operation = |body: &str| format!("Operation(POST http://host/svc/Items) {body}");
    let mut seen = Vec::new();
    for element in elements {
        match element {
            Element::Operation(body) => seen.push(operation(body)),
            Element::Changeset(bodies) => {
                seen.push("ChangesetStart".to_owned());
                seen.extend(bodies.iter().map(|body| operation(body)));
                seen.push("ChangesetEnd".to_owned());
            }
        }
    }
    seen.push("Completed".to_owned());
    seen
}

#[test]
fn written_batches_read_back_in_order() {
    let mut runner = deterministic_runner(96);
    runner
        .run(&(batch(), 1_usize..96), |(elements, chunk)| {
            let payload = block_on(write_batch(&elements))
                .map_err(|err| TestCaseError::fail(format!("write failed: {err}")))?;
            let mut reader = BatchReader::new(
                ChunkedReader::new(payload, chunk),
                "batch_rt",
                BatchConfig::default().with_refill_size(chunk),
            );
            let seen = block_on(common::walk(&mut reader))
                .map_err(|err| TestCaseError::fail(format!("read failed: {err}")))?;
            prop_assert_eq!(seen, expected(&elements));
            Ok(())
        })
        .expect("round trip preserves structure and bodies");
}
