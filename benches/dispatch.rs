use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::*;

use strata_ecs::prelude::*;

const WORK_ITEMS: usize = 1 << 16;

fn dispatch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for &group_size in &[64usize, 512, 4096] {
        group.bench_with_input(
            BenchmarkId::new("sum_64k", group_size),
            &group_size,
            |b, &group_size| {
                let composer = TaskComposer::new(4);
                b.iter_batched(
                    || Arc::new(AtomicU64::new(0)),
                    |sum| {
                        let task_group = TaskGroup::new();
                        let acc = sum.clone();
                        composer.dispatch(&task_group, WORK_ITEMS, group_size, move |args| {
                            acc.fetch_add(args.global_index as u64, Ordering::Relaxed);
                        });
                        composer.wait(&task_group);
                        black_box(sum.load(Ordering::Relaxed));
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.bench_function("execute_single_1k", |b| {
        let composer = TaskComposer::new(4);
        b.iter(|| {
            let task_group = TaskGroup::new();
            let sum = Arc::new(AtomicU64::new(0));
            for i in 0..1024u64 {
                let acc = sum.clone();
                composer.execute(&task_group, move || {
                    acc.fetch_add(i, Ordering::Relaxed);
                });
            }
            composer.wait(&task_group);
            black_box(sum.load(Ordering::Relaxed));
        });
    });

    group.finish();
}

criterion_group!(benches, dispatch_benchmark);
criterion_main!(benches);
