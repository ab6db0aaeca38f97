//! Performance benchmarks for the feed engine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dialog_feed::{
    Dialog, DialogId, DialogPatch, DialogStatus, EventKind, FeedConfig, FeedEvent, FeedStore,
    SourceVersion, Timestamp, Version,
};

fn make_dialogs(count: u64) -> Vec<Dialog> {
    (0..count)
        .map(|i| Dialog {
            id: DialogId(i),
            status: DialogStatus::WaitingOperator,
            last_message_at: Timestamp(i as i64 * 1000),
            version: Version(1),
            assigned_operator: None,
        })
        .collect()
}

fn seeded_store(count: u64) -> FeedStore {
    let store = FeedStore::new(FeedConfig::default());
    let epoch = store.begin_sync();
    store.seed(epoch, make_dialogs(count), Timestamp(0)).unwrap();
    store
}

/// Benchmark applying updates against queue sizes
fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");

    for queue_size in [100, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("queue_size", queue_size),
            &queue_size,
            |b, &size| {
                let store = seeded_store(size);
                let mut version = 2u64;
                let mut sv = 1u64;

                b.iter(|| {
                    let event = FeedEvent {
                        kind: EventKind::Updated,
                        dialog: DialogPatch {
                            id: DialogId(version % size),
                            version: Version(version),
                            status: None,
                            last_message_at: Some(Timestamp(version as i64 * 1000)),
                            assigned_operator: None,
                        },
                        source_version: SourceVersion(sv),
                    };
                    version += 1;
                    sv += 1;
                    black_box(store.apply(&event, Timestamp(0)));
                });
            },
        );
    }

    group.finish();
}

/// Benchmark view materialization (sorted, tombstones filtered)
fn bench_current_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("current_view");

    for queue_size in [100, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("queue_size", queue_size),
            &queue_size,
            |b, &size| {
                let store = seeded_store(size);

                b.iter(|| {
                    black_box(store.current_view());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark full reseed, the reconnect hot path
fn bench_seed(c: &mut Criterion) {
    let mut group = c.benchmark_group("seed");

    for queue_size in [100, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("queue_size", queue_size),
            &queue_size,
            |b, &size| {
                let store = seeded_store(size);
                let dialogs = make_dialogs(size);

                b.iter(|| {
                    let epoch = store.begin_sync();
                    store
                        .seed(epoch, black_box(dialogs.clone()), Timestamp(0))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_apply, bench_current_view, bench_seed);
criterion_main!(benches);
