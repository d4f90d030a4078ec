//! Codec benchmarks for kite-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use kite_protocol::{codec, Payload};

fn bench_encode_plaintext(c: &mut Criterion) {
    let payload = Payload::plaintext("m-1", "a".repeat(64));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("plaintext_64B", |b| {
        b.iter(|| codec::encode(black_box(&payload)))
    });
    group.finish();
}

fn bench_decode_plaintext(c: &mut Criterion) {
    let payload = Payload::plaintext("m-1", "a".repeat(64));
    let encoded = codec::encode(&payload).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("plaintext_64B", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let payload = Payload::plaintext("m-1", "Привіт! ".repeat(32));

    c.bench_function("roundtrip_plaintext_utf8", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&payload)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_plaintext,
    bench_decode_plaintext,
    bench_roundtrip
);
criterion_main!(benches);
