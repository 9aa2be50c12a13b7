// benches/queue.rs
//! Enqueue/dequeue throughput for the in-process and shared-memory queues

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use cryption_rs::{Action, LocalQueue, TaskDescriptor, TaskQueue};
use std::hint::black_box;

const BATCH: usize = 256;

fn cycle(queue: &dyn TaskQueue, task: &TaskDescriptor) {
    for _ in 0..BATCH {
        queue.enqueue(task).unwrap();
    }
    while let Some(t) = queue.try_drain_once().unwrap() {
        black_box(t);
    }
}

fn bench_queues(c: &mut Criterion) {
    let task = TaskDescriptor::new(Action::Encrypt, "/var/data/reports/2024/q1/summary.csv").unwrap();
    let mut group = c.benchmark_group("queue");
    group.throughput(Throughput::Elements(BATCH as u64));

    let local = LocalQueue::new(BATCH).unwrap();
    group.bench_function("local", |b| b.iter(|| cycle(&local, &task)));

    #[cfg(unix)]
    {
        let shared = cryption_rs::SharedQueue::create_unique(BATCH).unwrap();
        group.bench_function("shared", |b| b.iter(|| cycle(&shared, &task)));
    }

    group.finish();
}

criterion_group!(benches, bench_queues);
criterion_main!(benches);
