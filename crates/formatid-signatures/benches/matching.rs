//! Benchmarks for signature compilation and matching.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use formatid_core::MemoryResource;
use formatid_signatures::{compile, Anchor, ByteSource, Registry, ScanLimits};

/// Expressions in the shape of real PRONOM signatures.
const EXPRESSIONS: &[(&str, &str)] = &[
    ("literal", "504B0304"),
    ("offset", "{32768} 01 'CD001' 01"),
    ("alternation", "{257} 'ustar' (00 '00'|'  ' 00)"),
    ("fragments", "FFD8FFE0 {2} 'JFIF' 00 0101"),
    ("split", "'%PDF-1.' [30:37] * 'endobj' {0-64} 'xref' * 'trailer'"),
];

/// Deterministic filler bytes that do not contain the signatures above.
fn generate_data(size: usize) -> Vec<u8> {
    let mut state = 0x2545_F491u32;
    (0..size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 200) as u8 + 0x30
        })
        .collect()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for (name, expr) in EXPRESSIONS {
        group.bench_with_input(BenchmarkId::from_parameter(name), expr, |b, expr| {
            b.iter(|| compile(black_box(expr), Anchor::Bof))
        });
    }
    group.finish();
}

fn bench_variable_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("variable_scan");
    let seq = compile("'endobj' {0-64} 'xref' * 'trailer'", Anchor::Variable).unwrap();
    for size in [4 * 1024usize, 64 * 1024, 1024 * 1024] {
        let resource = MemoryResource::new(generate_data(size));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &resource, |b, resource| {
            b.iter(|| {
                let source = ByteSource::new(resource);
                seq.matches(black_box(&source), &ScanLimits::unlimited())
            })
        });
    }
    group.finish();
}

fn bench_builtin_registry(c: &mut Criterion) {
    let registry = Registry::builtin();
    let resource = MemoryResource::new(generate_data(256 * 1024));

    c.bench_function("builtin_all_signatures", |b| {
        b.iter(|| {
            let source = ByteSource::new(&resource);
            let limits = ScanLimits::unlimited();
            registry
                .signatures()
                .iter()
                .filter(|sig| sig.matches(&source, &limits).unwrap_or(false))
                .count()
        })
    });
}

criterion_group!(benches, bench_compile, bench_variable_scan, bench_builtin_registry);
criterion_main!(benches);
