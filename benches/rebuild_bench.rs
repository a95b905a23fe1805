use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::thread;
use tempfile::TempDir;

use pkgdb::rebuild::enumeration_channel;
use pkgdb::{DatabaseConfig, PackageDatabase, PackageRecord};

fn make_records(count: usize) -> Vec<PackageRecord> {
    (0..count)
        .map(|i| {
            PackageRecord::new(format!("package-{}", i), "2.4.1-1", "x86_64", "extra")
                .with_size(1024 * (i as u64 % 97))
                .with_metadata("group", "base")
        })
        .collect()
}

fn bench_rebuild_in_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_in_memory");
    for &count in &[1_000usize, 10_000, 50_000] {
        let records = make_records(count);
        let db = PackageDatabase::in_memory();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &records, |b, records| {
            b.iter(|| db.rebuild_from_records(records.iter().cloned()).unwrap())
        });
    }
    group.finish();
}

fn bench_rebuild_streamed(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_streamed");
    let count = 10_000;
    let records = make_records(count);
    group.throughput(Throughput::Elements(count as u64));

    for &capacity in &[16usize, 1024] {
        let db = PackageDatabase::open(DatabaseConfig::default().with_stream_capacity(capacity))
            .unwrap();
        group.bench_with_input(
            BenchmarkId::new("capacity", capacity),
            &records,
            |b, records| {
                b.iter(|| {
                    let (sender, receiver) = enumeration_channel(capacity);
                    thread::scope(|scope| {
                        scope.spawn(move || {
                            for record in records.iter().cloned() {
                                sender.package(record).unwrap();
                            }
                            sender.finished().unwrap();
                        });
                        db.rebuild_from(receiver).unwrap()
                    })
                })
            },
        );
    }
    group.finish();
}

fn bench_rebuild_persisted(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let db = PackageDatabase::open(
        DatabaseConfig::default().with_snapshot_path(tmp.path().join("bench.snapshot")),
    )
    .unwrap();
    let records = make_records(10_000);

    c.bench_function("rebuild_persisted_10000", |b| {
        b.iter(|| db.rebuild_from_records(records.iter().cloned()).unwrap())
    });
}

criterion_group!(
    benches,
    bench_rebuild_in_memory,
    bench_rebuild_streamed,
    bench_rebuild_persisted
);
criterion_main!(benches);
