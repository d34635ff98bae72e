//! Wire Codec Benchmarks
//!
//! Measures frame decoding from a byte stream and the FILEGROUPDESCRIPTORW
//! codec at typical clipboard sizes.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};

use cliprdr_bridge::clipboard::formats::{build_file_group, parse_file_group};
use cliprdr_bridge::clipboard::FileDescriptor;
use cliprdr_bridge::protocol::{
    ClipboardPdu, CliprdrCodec, FileContentsResponse, FormatListEntry, NameEncoding,
    ResponseStatus,
};

fn contents_frame(len: usize) -> ClipboardPdu {
    ClipboardPdu::FileContentsResponse(FileContentsResponse {
        status: ResponseStatus::Ok,
        stream_id: 7,
        data: Bytes::from(vec![0x5Au8; len]),
    })
}

/// Encode then decode FILECONTENTS_RESPONSE frames of growing size
fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");

    for (len, name) in [(4 * 1024, "4K"), (64 * 1024, "64K"), (1024 * 1024, "1M")] {
        let frame = contents_frame(len).to_frame(1, NameEncoding::Long);
        group.throughput(Throughput::Bytes(len as u64));

        group.bench_with_input(BenchmarkId::new("encode", name), &frame, |b, frame| {
            let mut codec = CliprdrCodec::default();
            b.iter(|| {
                let mut dst = BytesMut::new();
                codec.encode(black_box(frame.clone()), &mut dst).unwrap();
                black_box(dst)
            })
        });

        let mut wire = BytesMut::new();
        CliprdrCodec::default().encode(frame.clone(), &mut wire).unwrap();
        let wire = wire.freeze();
        group.bench_with_input(BenchmarkId::new("decode", name), &wire, |b, wire| {
            let mut codec = CliprdrCodec::default();
            b.iter(|| {
                let mut src = BytesMut::from(&wire[..]);
                black_box(codec.decode(&mut src).unwrap())
            })
        });
    }

    group.finish();
}

/// FORMAT_LIST with long names, the most common control message
fn bench_format_list(c: &mut Criterion) {
    let entries: Vec<FormatListEntry> = [
        (13, None),
        (1, None),
        (49356, Some("FileGroupDescriptorW")),
        (49357, Some("FileContents")),
        (49358, Some("HTML Format")),
        (49359, Some("Rich Text Format")),
        (49360, Some("PNG")),
    ]
    .iter()
    .map(|(id, name)| FormatListEntry::new(*id, *name))
    .collect();
    let frame = ClipboardPdu::FormatList(entries).to_frame(1, NameEncoding::Long);

    c.bench_function("format_list_decode", |b| {
        b.iter(|| black_box(ClipboardPdu::from_frame(black_box(&frame), NameEncoding::Long)))
    });
}

/// Descriptor tables for drops of 1 to 1000 files
fn bench_file_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_group");

    for count in [1usize, 100, 1000] {
        let descriptors: Vec<FileDescriptor> = (0..count)
            .map(|i| FileDescriptor::file(format!("folder\\file-{i:04}.dat"), i as u64 * 1024))
            .collect();
        let blob = build_file_group(&descriptors);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("build", count), &descriptors, |b, d| {
            b.iter(|| black_box(build_file_group(black_box(d))))
        });
        group.bench_with_input(BenchmarkId::new("parse", count), &blob, |b, blob| {
            b.iter(|| black_box(parse_file_group(black_box(blob)).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frame_codec, bench_format_list, bench_file_group);
criterion_main!(benches);
