use criterion::{criterion_group, criterion_main, Criterion, black_box};

use brickstream::compression::{compress_brick, decompress_brick, CodecId};
use brickstream::layout::{Layout, LayoutKind, SpatialLayout};
use brickstream::store::minmax::compute_minmax;

use glam::UVec3;

/// Smooth scalar field with some noise, the shape real volume bricks have
fn test_brick(size: u32) -> Vec<u8> {
    let mut state = 0x2545_f491u32;
    (0..size * size * size)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let (x, y, z) = (i % size, (i / size) % size, i / (size * size));
            let smooth = ((x + y + z) * 255 / (3 * size)) as u8;
            smooth.wrapping_add((state & 0x7) as u8)
        })
        .collect()
}

fn bench_layout_roundtrip(c: &mut Criterion, kind: LayoutKind, name: &str) {
    let dims = UVec3::new(32, 24, 16);
    let layout = Layout::new(kind, dims).unwrap();

    c.bench_function(name, |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for z in 0..dims.z {
                for y in 0..dims.y {
                    for x in 0..dims.x {
                        let index = layout.to_index(dims, UVec3::new(x, y, z)).unwrap();
                        let pos = layout.to_position(dims, black_box(index)).unwrap();
                        sum += index + pos.x as u64;
                    }
                }
            }
            sum
        });
    });
}

fn bench_layouts(c: &mut Criterion) {
    bench_layout_roundtrip(c, LayoutKind::Scanline, "layout_scanline_32x24x16");
    bench_layout_roundtrip(c, LayoutKind::Morton, "layout_morton_32x24x16");
    bench_layout_roundtrip(c, LayoutKind::Hilbert, "layout_hilbert_32x24x16");
    bench_layout_roundtrip(c, LayoutKind::Random { seed: 7 }, "layout_random_32x24x16");
}

fn bench_compress(c: &mut Criterion) {
    let brick = test_brick(64);
    for (codec, level) in [
        (CodecId::Lz4, 1),
        (CodecId::Lz4, 9),
        (CodecId::Zstd, 3),
        (CodecId::Bzip2, 6),
        (CodecId::Zlib, 6),
    ] {
        c.bench_function(&format!("compress_{}_l{}_64", codec.name(), level), |b| {
            b.iter(|| compress_brick(codec, black_box(&brick), level));
        });
    }
}

fn bench_decompress(c: &mut Criterion) {
    let brick = test_brick(64);
    for codec in [CodecId::Lz4, CodecId::Zstd, CodecId::Bzip2, CodecId::Zlib] {
        let compressed = compress_brick(codec, &brick, 1);
        c.bench_function(&format!("decompress_{}_64", codec.name()), |b| {
            b.iter(|| decompress_brick(black_box(&compressed)).unwrap());
        });
    }
}

fn bench_minmax_32(c: &mut Criterion) {
    let values: Vec<f64> = test_brick(32).into_iter().map(|v| v as f64).collect();

    c.bench_function("minmax_32", |b| {
        b.iter(|| compute_minmax(black_box(&values), UVec3::splat(32)));
    });
}

criterion_group!(
    benches,
    bench_layouts,
    bench_compress,
    bench_decompress,
    bench_minmax_32,
);

criterion_main!(benches);
