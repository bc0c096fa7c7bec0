//! Event queue throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strato_core::{Event, EventKind, EventQueue, EntityId, SimTime};

fn queue_event(at: u64, priority: i64) -> Event<u32> {
    Event {
        at: SimTime::from_ticks(at),
        priority,
        owner: EntityId::from_raw(at % 64),
        tag: None,
        kind: EventKind::Instant,
        action: 0,
    }
}

fn bench_push_pop(c: &mut Criterion) {
    c.bench_function("push_pop_10k", |b| {
        b.iter(|| {
            let mut queue = EventQueue::default();
            for i in 0..10_000u64 {
                queue.push(queue_event((i * 37) % 5000, (i % 7) as i64));
            }
            while let Some((_, event)) = queue.pop() {
                black_box(event.at);
            }
        })
    });
}

fn bench_cancel_owner(c: &mut Criterion) {
    c.bench_function("cancel_owner_10k", |b| {
        b.iter(|| {
            let mut queue = EventQueue::default();
            for i in 0..10_000u64 {
                queue.push(queue_event(i, 0));
            }
            for owner in 0..64u64 {
                queue.cancel_owner(EntityId::from_raw(owner));
            }
            while queue.pop().is_some() {}
        })
    });
}

criterion_group!(benches, bench_push_pop, bench_cancel_owner);
criterion_main!(benches);
