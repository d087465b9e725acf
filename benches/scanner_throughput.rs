//! Criterion benchmarks for delimiter scanning and body framing throughput.
//!
//! Covers the raw scanner over dash-heavy and dash-free windows and a full
//! batch walk through the reader at several transport chunk sizes.

use batchframe::{
    BatchConfig,
    BatchReader,
    BatchReaderState,
    scanner::{scan, scan_any},
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box};
use futures::executor::block_on;

const WINDOW_LEN: usize = 64 * 1024;

fn dash_free_window() -> Vec<u8> { b"abcdefgh".repeat(WINDOW_LEN / 8) }

/// Lots of near misses: `--` followed by a token that almost matches.
fn dash_heavy_window() -> Vec<u8> { b"--batch_x".repeat(WINDOW_LEN / 9) }

fn batch_payload(operations: usize, body_len: usize) -> Vec<u8> {
    let body = "y".repeat(body_len);
    let mut out = String::new();
    for index in 0..operations {
        if index > 0 {
            out.push_str("\r\n");
        }
        out.push_str("--batch_bench\r\nContent-Type: application/http\r\n\r\n");
        out.push_str("POST http://host/svc/Items HTTP/1.1\r\nContent-Type: text/plain\r\n\r\n");
        out.push_str(&body);
    }
    out.push_str("\r\n--batch_bench--\r\n");
    out.into_bytes()
}

async fn drain(payload: &[u8], refill: usize) -> usize {
    let config = BatchConfig::default().with_refill_size(refill);
    let mut reader = BatchReader::new(payload, "batch_bench", config);
    let mut total = 0;
    let mut buf = vec![0_u8; 8 * 1024];
    while reader.read().await.unwrap_or_else(|err| panic!("bench payload rejected: {err}")) {
        if reader.state() != BatchReaderState::Operation {
            continue;
        }
        let mut stream = reader
            .content_stream()
            .await
            .unwrap_or_else(|err| panic!("no content stream: {err}"));
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) => panic!("body read failed: {err}"),
            }
        }
        if let Err(err) = stream.dispose().await {
            panic!("dispose failed: {err}");
        }
    }
    total
}

fn benchmark_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanner/scan");
    group.throughput(Throughput::Bytes(WINDOW_LEN as u64));

    for (label, window) in [
        ("dash_free", dash_free_window()),
        ("dash_heavy", dash_heavy_window()),
    ] {
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter(|| black_box(scan(black_box(&window), "batch_bench")));
        });
    }

    let window = dash_heavy_window();
    let stack = ["batch_bench", "changeset_bench"];
    group.bench_function(BenchmarkId::new("nested", "dash_heavy"), |b| {
        b.iter(|| black_box(scan_any(black_box(&window), &stack)));
    });

    group.finish();
}

fn benchmark_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("reader/drain");
    let payload = batch_payload(64, 4096);
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for refill in [512, 4096, 64 * 1024] {
        group.bench_function(BenchmarkId::from_parameter(refill), |b| {
            b.iter(|| black_box(block_on(drain(&payload, refill))));
        });
    }

    group.finish();
}

/// Entrypoint for scanner and reader throughput benchmarks.
fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    benchmark_scan(&mut criterion);
    benchmark_reader(&mut criterion);
    criterion.final_summary();
}
