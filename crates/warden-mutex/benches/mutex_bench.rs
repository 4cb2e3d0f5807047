// Benchmarks for MutexContext
// Measures uncontended acquire/release cost in local and distributed mode

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use warden_common::{MutexSettings, WardenError};
use warden_mutex::{MutexContext, MutexOptions, normalize};
use warden_store::MemoryStore;

fn context() -> MutexContext {
    MutexContext::new(Arc::new(MemoryStore::new()), MutexSettings::default())
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for identifier in ["node-1", "mutex-node-1", "pool-mutex-operation"] {
        group.bench_with_input(BenchmarkId::from_parameter(identifier), identifier, |b, id| {
            b.iter(|| normalize(black_box(id)))
        });
    }
    group.finish();
}

fn bench_with_mutex_local(c: &mut Criterion) {
    let context = context();
    let options = MutexOptions::local();

    c.bench_function("with_mutex_local", |b| {
        b.iter(|| {
            context.with_mutex(black_box("bench"), &options, || Ok::<_, WardenError>(()))
        })
    });
}

fn bench_with_mutex_distributed(c: &mut Criterion) {
    let context = context();
    let options = MutexOptions::persisted();

    c.bench_function("with_mutex_distributed", |b| {
        b.iter(|| {
            context.with_mutex(black_box("bench"), &options, || Ok::<_, WardenError>(()))
        })
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_with_mutex_local,
    bench_with_mutex_distributed
);
criterion_main!(benches);
