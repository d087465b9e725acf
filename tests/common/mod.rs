//! Shared utilities for integration tests.
//!
//! Walks a reader to completion and renders each transition as a short
//! label, so tests can compare whole transition sequences at once.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use batchframe::{BatchReader, BatchReaderState, Result};
use tokio::io::AsyncRead;

/// Label for the reader's current position.
pub fn describe<R>(reader: &BatchReader<R>) -> String {
    match reader.state() {
        BatchReaderState::Operation => reader
            .operation()
            .map_or_else(|| "Operation(?)".to_owned(), |op| format!("Operation({op})")),
        other => format!("{other:?}"),
    }
}

/// Read every element, draining and disposing each operation body.
///
/// Operations are labelled `Operation(<head>) <body>` where the body is
/// decoded lossily as UTF-8.
pub async fn walk<R: AsyncRead + Unpin>(reader: &mut BatchReader<R>) -> Result<Vec<String>> {
    let mut seen = Vec::new();
    while reader.read().await? {
        let mut label = describe(reader);
        if reader.state() == BatchReaderState::Operation {
            let mut stream = reader.content_stream().await?;
            let mut body = Vec::new();
            stream.read_to_end(&mut body).await?;
            stream.dispose().await?;
            label.push(' ');
            label.push_str(&String::from_utf8_lossy(&body));
        }
        seen.push(label);
    }
    seen.push(describe(reader));
    Ok(seen)
}
