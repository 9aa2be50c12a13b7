// benches/roundtrip.rs
//! Seal → open round-trip benchmarks over in-memory buffers

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cryption_rs::aliases::Aes256Key32;
use cryption_rs::engine::{open, seal};
use std::hint::black_box;

// --- Size constants ---
const KB: usize = 1024;
const MB: usize = 1024 * 1024;

fn format_size(bytes: usize) -> String {
    if bytes >= MB {
        format!("{} MiB", bytes / MB)
    } else if bytes >= KB {
        format!("{} KiB", bytes / KB)
    } else {
        format!("{bytes} B")
    }
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");
    let key = Aes256Key32::new([0x5Au8; 32]);

    for &size in &[16, KB, 64 * KB, MB] {
        let input = vec![0x41u8; size]; // repeating 'A'

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("size", format_size(size)),
            &input,
            |b, input| {
                b.iter(|| {
                    let sealed = seal(black_box(input), &key).unwrap();
                    let plain = open(black_box(&sealed), &key).unwrap();
                    black_box(plain);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_roundtrip);
criterion_main!(benches);
