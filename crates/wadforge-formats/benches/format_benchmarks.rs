//! Benchmarks for wadforge formats
//!
//! Run with: cargo bench -p wadforge-formats

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use wadforge_formats::compression::{deflate, inflate};
use wadforge_formats::image::{DoomGfxCodec, ImgzCodec, PcxCodec};
use wadforge_formats::{
    Archive, ArchiveEntry, Codec, Image, ImageCodec, Level, OpenOptions, WadFormat, WriteOptions, BUILTIN,
};

fn sample_image(width: u32, height: u32) -> Image {
    let pixels = (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x ^ y) % 251) as u8))
        .collect();
    Image::paletted(width, height, pixels, None, None).unwrap()
}

fn sample_wad(lumps: usize, lump_size: usize) -> Vec<u8> {
    let mut archive = Archive::new(Arc::new(WadFormat));
    for i in 0..lumps {
        let data: Vec<u8> = (0..lump_size).map(|b| ((b + i) % 256) as u8).collect();
        archive
            .add_entry("", ArchiveEntry::new(format!("LUMP{i:04}"), data), None)
            .unwrap();
    }
    archive.write(&WriteOptions::default()).unwrap()
}

/// Benchmark content detection across the whole registry
fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("detection");

    let mut mus = b"MUS\x1a".to_vec();
    mus.extend_from_slice(&[4, 0, 16, 0]);
    mus.resize(20, 0);

    let inputs: [(&str, Vec<u8>); 4] = [
        ("mus", mus),
        ("pcx", PcxCodec.encode(&sample_image(64, 64), None).unwrap()),
        ("wad", sample_wad(16, 256)),
        ("noise", (0..4096u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect()),
    ];

    for (name, data) in &inputs {
        group.bench_with_input(BenchmarkId::new("detect", name), data, |b, data| {
            b.iter(|| BUILTIN.formats.detect_with_confidence(black_box(data)))
        });
    }

    group.finish();
}

/// Benchmark opening and rebuilding WAD archives
fn bench_wad(c: &mut Criterion) {
    let mut group = c.benchmark_group("wad");

    for lumps in [64, 1024] {
        let bytes = sample_wad(lumps, 512);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("open_lazy", lumps), &bytes, |b, bytes| {
            b.iter(|| {
                Archive::open(Arc::new(WadFormat), bytes.clone().into(), OpenOptions::default(), None).unwrap()
            })
        });

        let archive = Archive::open(Arc::new(WadFormat), bytes.clone().into(), OpenOptions::default(), None).unwrap();
        group.bench_with_input(BenchmarkId::new("write", lumps), &archive, |b, archive| {
            b.iter(|| archive.write(&WriteOptions::default()).unwrap())
        });
    }

    group.finish();
}

/// Benchmark image encoders and decoders
fn bench_images(c: &mut Criterion) {
    let mut group = c.benchmark_group("images");

    for size in [64u32, 256] {
        let image = sample_image(size, size);
        group.throughput(Throughput::Elements(u64::from(size * size)));

        let codecs: [(&str, &dyn ImageCodec); 3] = [("doom_gfx", &DoomGfxCodec), ("pcx", &PcxCodec), ("imgz", &ImgzCodec)];
        for (name, codec) in codecs {
            group.bench_with_input(BenchmarkId::new(format!("{name}_encode"), size), &image, |b, image| {
                b.iter(|| codec.encode(black_box(image), None).unwrap())
            });

            let encoded = codec.encode(&image, None).unwrap();
            group.bench_with_input(BenchmarkId::new(format!("{name}_decode"), size), &encoded, |b, encoded| {
                b.iter(|| codec.decode(black_box(encoded)).unwrap())
            });
        }
    }

    group.finish();
}

/// Benchmark the deflate path used by ZIP and gzip
fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");

    for size in [1024usize, 102_400] {
        let data: Vec<u8> = (0..size).map(|i| (i % 97) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("deflate", size), &data, |b, data| {
            b.iter(|| deflate(Codec::Deflate, black_box(data), Level::DEFAULT).unwrap())
        });

        let compressed = deflate(Codec::Deflate, &data, Level::DEFAULT).unwrap();
        group.bench_with_input(BenchmarkId::new("inflate", size), &compressed, |b, compressed| {
            b.iter(|| inflate(Codec::Deflate, black_box(compressed), Some(size)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_detection, bench_wad, bench_images, bench_compression);
criterion_main!(benches);
