//! Frame codec benchmarks: encode and reassemble messages of various sizes.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tether_core::options::TransportMode;
use tether_core::status::MessageKind;
use tether_wire::codec::{encode, Decoded, Decoder};

const MESSAGE_SIZES: &[usize] = &[64, 1024, 16 * 1024, 256 * 1024];
const FRAME_PAYLOAD: usize = 4096;
const READ_CHUNK: usize = 8192;

fn encode_framed(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/encode");
    for &size in MESSAGE_SIZES {
        let payload = Bytes::from(vec![0xA5u8; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                encode(
                    TransportMode::Framed,
                    MessageKind::Binary,
                    black_box(payload.clone()),
                    Some(FRAME_PAYLOAD),
                )
            });
        });
    }
    group.finish();
}

fn decode_framed(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode");
    for &size in MESSAGE_SIZES {
        let wire = encode(
            TransportMode::Framed,
            MessageKind::Binary,
            Bytes::from(vec![0x5Au8; size]),
            Some(FRAME_PAYLOAD),
        );
        let mut out = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut decoder = Decoder::new(TransportMode::Framed, None);
                let mut filled = 0;
                // simulate transport reads of READ_CHUNK bytes
                for chunk in wire.chunks(READ_CHUNK) {
                    decoder.feed(chunk);
                    while let Ok(Some(Decoded::Chunk { count, .. })) = decoder.decode_into(&mut out[filled..]) {
                        filled += count;
                        if count == 0 {
                            break;
                        }
                    }
                }
                black_box(filled)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, encode_framed, decode_framed);
criterion_main!(benches);
