//! Micro-benchmarks for the hot codec paths: varints, column bodies, and
//! compression frames.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ch_native::column::{ColumnString, ColumnUInt64, ColumnData};
use ch_native::compression;
use ch_native::protocol::CompressionMethod;
use ch_native::wire::{self, WireReader};

fn bench_varint(c: &mut Criterion) {
    let values: Vec<u64> =
        (0..1_000).map(|i| (i as u64).wrapping_mul(0x9E37_79B9)).collect();

    c.bench_function("varint_encode_1k", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(10 * values.len());
            for &v in &values {
                wire::put_varint(&mut buf, black_box(v));
            }
            buf
        })
    });

    let mut encoded = BytesMut::new();
    for &v in &values {
        wire::put_varint(&mut encoded, v);
    }
    c.bench_function("varint_decode_1k", |b| {
        b.iter(|| {
            let mut reader = WireReader::new(&encoded);
            for _ in 0..values.len() {
                black_box(reader.read_varint().unwrap());
            }
        })
    });
}

fn bench_columns(c: &mut Criterion) {
    let mut numeric = ColumnUInt64::new();
    for i in 0..65_536u64 {
        numeric.append(i);
    }
    let mut numeric_body = BytesMut::new();
    numeric.write_body(&mut numeric_body).unwrap();

    c.bench_function("uint64_column_encode_64k", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(numeric_body.len());
            numeric.write_body(&mut buf).unwrap();
            buf
        })
    });
    c.bench_function("uint64_column_decode_64k", |b| {
        b.iter(|| {
            let mut col = ColumnUInt64::new();
            col.read_body(&mut WireReader::new(&numeric_body), 65_536)
                .unwrap();
            col
        })
    });

    let mut strings = ColumnString::new();
    for i in 0..16_384 {
        strings.append(format!("value-{:08}", i));
    }
    let mut string_body = BytesMut::new();
    strings.write_body(&mut string_body).unwrap();

    c.bench_function("string_column_decode_16k", |b| {
        b.iter(|| {
            let mut col = ColumnString::new();
            col.read_body(&mut WireReader::new(&string_body), 16_384)
                .unwrap();
            col
        })
    });
}

fn bench_compression(c: &mut Criterion) {
    let mut payload = BytesMut::new();
    let mut col = ColumnUInt64::new();
    for i in 0..65_536u64 {
        col.append(i % 1_024);
    }
    col.write_body(&mut payload).unwrap();

    for method in [CompressionMethod::Lz4, CompressionMethod::Zstd] {
        let framed = compression::compress(method, &payload).unwrap();
        c.bench_function(&format!("compress_512k_{:?}", method), |b| {
            b.iter(|| compression::compress(method, black_box(&payload)))
        });
        c.bench_function(&format!("decompress_512k_{:?}", method), |b| {
            b.iter(|| compression::decompress(black_box(&framed)))
        });
    }
}

criterion_group!(benches, bench_varint, bench_columns, bench_compression);
criterion_main!(benches);
