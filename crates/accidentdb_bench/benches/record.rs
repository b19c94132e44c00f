//! Record codec benchmarks.

use accidentdb_core::record::{content_hash, RecordHeader, StoredRecord, HEADER_SIZE};
use accidentdb_core::RecordId;
use accidentdb_testkit::sample_accident;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// Benchmark payload encoding and decoding.
fn bench_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload");
    let record = sample_accident(3);
    let payload = record.to_payload().unwrap();
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(black_box(&record).to_payload().unwrap()));
    });
    group.bench_function("decode", |b| {
        b.iter(|| {
            black_box(accidentdb_core::TrafficAccident::from_payload(black_box(&payload), 0).unwrap())
        });
    });
    group.bench_function("hash", |b| {
        b.iter(|| black_box(content_hash(black_box(&payload))));
    });

    group.finish();
}

/// Benchmark header encoding and decoding.
fn bench_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("header");
    let payload = sample_accident(5).to_payload().unwrap();
    let stored = StoredRecord::live(RecordId::new(42), payload);
    let bytes = stored.header.encode();
    group.throughput(Throughput::Bytes(HEADER_SIZE as u64));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(black_box(&stored.header).encode()));
    });
    group.bench_function("decode", |b| {
        b.iter(|| black_box(RecordHeader::decode(black_box(&bytes), 0, u32::MAX).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_payload, bench_header);
criterion_main!(benches);
