use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use flat_pool::FlatPool;
use std::thread;
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

fn bench_acquire_insert(c: &mut Criterion) {
    c.bench_function("flat_pool_acquire_insert_10k", |b| {
        b.iter_batched(
            FlatPool::<String, u64>::new,
            |pool| {
                // Hold handles so every acquire inserts.
                let mut held = Vec::with_capacity(10_000);
                for (i, x) in lcg(1).take(10_000).enumerate() {
                    held.push(pool.acquire_with(key(x), i as u64));
                }
                black_box(held.len());
                drop(held);
                pool
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_acquire_hit(c: &mut Criterion) {
    c.bench_function("flat_pool_acquire_hit", |b| {
        let pool: FlatPool<String, u64> = FlatPool::new();
        let keys: Vec<_> = lcg(7).take(20_000).map(key).collect();
        let _held: Vec<_> = keys
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, k)| pool.acquire_with(k, i as u64))
            .collect();
        let mut it = keys.iter().cycle();
        b.iter(|| {
            let k = it.next().unwrap();
            black_box(pool.find(k.as_str()));
        })
    });
}

fn bench_find_miss(c: &mut Criterion) {
    c.bench_function("flat_pool_find_miss", |b| {
        let pool: FlatPool<String, u64> = FlatPool::new();
        let _held: Vec<_> = lcg(11)
            .take(10_000)
            .enumerate()
            .map(|(i, x)| pool.acquire_with(key(x), i as u64))
            .collect();
        let mut miss = lcg(0xdead_beef);
        b.iter(|| {
            let k = key(miss.next().unwrap());
            black_box(pool.find(&k).is_null());
        })
    });
}

fn bench_clone_drop_handle(c: &mut Criterion) {
    c.bench_function("flat_pool_clone_drop_handle", |b| {
        let pool: FlatPool<String> = FlatPool::new();
        let h = pool.acquire("key".to_string());
        b.iter(|| {
            let x = h.clone();
            black_box(&x);
            drop(x);
        })
    });
}

fn bench_churn_reuse(c: &mut Criterion) {
    c.bench_function("flat_pool_churn_reuse", |b| {
        let pool: FlatPool<u64> = FlatPool::new();
        let mut keys = lcg(3);
        b.iter(|| {
            // Released at once; the next iteration reuses the slot.
            let h = pool.acquire(keys.next().unwrap());
            black_box(h.index());
        })
    });
}

fn bench_contended_acquire(c: &mut Criterion) {
    c.bench_function("flat_pool_contended_acquire_4x1k", |b| {
        let pool: FlatPool<u64, u64> = FlatPool::new();
        let _hot: Vec<_> = (0..64).map(|k| pool.acquire_with(k, k)).collect();
        b.iter(|| {
            thread::scope(|s| {
                for t in 0..4_u64 {
                    let pool = &pool;
                    s.spawn(move || {
                        for i in 0..1_000_u64 {
                            black_box(pool.acquire_with((i + t) % 64, 0_u64));
                        }
                    });
                }
            });
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_acquire_insert, bench_acquire_hit, bench_find_miss,
        bench_clone_drop_handle, bench_churn_reuse, bench_contended_acquire
}
criterion_main!(benches);
