//! # Block Sync Benchmarks
//!
//! | Stage | Measured |
//! |-------|----------|
//! | Fetch | NDJSON block stream decoding |
//! | Validate | Structural rules + batch persist into the in-memory store |
//! | Watch | Watermark over a large peer set |

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qc_18_block_sync::test_utils::{chain_fixture, sync_info_for};
use qc_18_block_sync::{
    compute_watermark, encode_block_stream, parse_block_stream, BlockValidator,
    InMemoryBlockStore, Validator,
};
use shared_types::PeerAddress;

fn bench_stream_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-18-stream");
    let chain = chain_fixture(64);

    let bodies: Vec<(u64, String)> = chain
        .iter()
        .map(|b| {
            let body = encode_block_stream(&b.block, &b.transactions, &b.operations).unwrap();
            (b.block.height, body)
        })
        .collect();

    group.throughput(Throughput::Elements(bodies.len() as u64));
    group.bench_function("parse_chain_of_65", |b| {
        b.iter(|| {
            for (height, body) in &bodies {
                black_box(parse_block_stream(*height, body).unwrap());
            }
        })
    });
    group.finish();
}

fn bench_validate_and_persist(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-18-validate");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for tip in [16u64, 128] {
        let chain = chain_fixture(tip);
        let infos: Vec<_> = (1..=tip).map(|h| sync_info_for(&chain, h)).collect();

        group.throughput(Throughput::Elements(tip));
        group.bench_with_input(BenchmarkId::new("fresh_store", tip), &infos, |b, infos| {
            b.iter(|| {
                let store = Arc::new(InMemoryBlockStore::new());
                store.insert_bundle(&chain[0]);
                let validator = Validator::new(store);
                rt.block_on(async {
                    for info in infos {
                        validator.validate(info).await.unwrap();
                    }
                });
            })
        });

        // Second pass over a populated store hits the existence short-circuit
        let store = Arc::new(InMemoryBlockStore::new());
        for bundle in &chain {
            store.insert_bundle(bundle);
        }
        let validator = Validator::new(store);
        group.bench_with_input(BenchmarkId::new("already_stored", tip), &infos, |b, infos| {
            b.iter(|| {
                rt.block_on(async {
                    for info in infos {
                        validator.validate(info).await.unwrap();
                    }
                });
            })
        });
    }
    group.finish();
}

fn bench_watermark(c: &mut Criterion) {
    let reports: Vec<(PeerAddress, u64)> = (0..300u64)
        .map(|i| (PeerAddress::new(format!("peer-{}", i)), 1_000 + i % 17))
        .collect();

    c.bench_function("qc-18-watermark/300_peers", |b| {
        b.iter(|| black_box(compute_watermark(black_box(&reports))))
    });
}

criterion_group!(
    benches,
    bench_stream_parsing,
    bench_validate_and_persist,
    bench_watermark
);
criterion_main!(benches);
