//! Codec benchmarks for parley-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parley_protocol::{codec, Encoding, Envelope, InboundMessage};

fn bench_encode(c: &mut Criterion) {
    let envelope = Envelope::from_sender("alice", "x".repeat(64));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("json_64B", |b| {
        b.iter(|| codec::encode(black_box(&envelope), Encoding::Json))
    });
    group.bench_function("msgpack_64B", |b| {
        b.iter(|| codec::encode(black_box(&envelope), Encoding::Msgpack))
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let message = InboundMessage::room("lobby", "x".repeat(64));
    let json = codec::encode_inbound(&message, Encoding::Json).unwrap();
    let msgpack = codec::encode_inbound(&message, Encoding::Msgpack).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(json.len() as u64));
    group.bench_function("json_64B", |b| b.iter(|| codec::decode(black_box(&json))));
    group.throughput(Throughput::Bytes(msgpack.len() as u64));
    group.bench_function("msgpack_64B", |b| {
        b.iter(|| codec::decode(black_box(&msgpack)))
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
