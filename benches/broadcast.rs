use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use subpub::Engine;

const SUBSCRIBERS: usize = 16;
const MESSAGES: u64 = 20_000;

fn bench_fanout_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout_throughput");
    group.throughput(Throughput::Elements(MESSAGES * SUBSCRIBERS as u64));

    group.bench_function(format!("{}_subscribers", SUBSCRIBERS), |b| {
        b.iter_custom(|iters| {
            let engine = Engine::<u64>::new();
            let received = Arc::new(AtomicU64::new(0));
            let mut subs = Vec::with_capacity(SUBSCRIBERS);

            for _ in 0..SUBSCRIBERS {
                let received = Arc::clone(&received);
                let sub = engine
                    .subscribe(
                        "bench",
                        Box::new(move |_msg| {
                            received.fetch_add(1, Ordering::Relaxed);
                        }),
                    )
                    .expect("subscribe");
                subs.push(sub);
            }

            let total = MESSAGES * iters;
            let start = Instant::now();
            for i in 0..total {
                engine.publish("bench", black_box(i)).expect("publish");
            }

            let expected = total * SUBSCRIBERS as u64;
            while received.load(Ordering::Relaxed) < expected {
                std::thread::sleep(Duration::from_micros(50));
            }
            let elapsed = start.elapsed();

            for sub in subs {
                sub.unsubscribe();
            }

            elapsed
        });
    });
}

criterion_group!(benches, bench_fanout_throughput);
criterion_main!(benches);
