use core::hint::black_box;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use futures::future::try_join_all;
use rangeid::{
    AllocationRequest, AllocationService, Clock, ConsumptionLedger, MemoryStore, Range,
    StorageKey, claim, find_available_per_range, find_first_available,
};
use std::{sync::Arc, time::Instant};
use tokio::runtime::Builder;

#[derive(Clone, Copy)]
struct FixedMockTime {
    millis: u64,
}

impl Clock for FixedMockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

// Number of ids reserved per benchmark iteration (in total for the contended
// benchmarks).
const TOTAL_IDS: usize = 1024;

fn ranges() -> Vec<Range> {
    vec![
        Range::named(50_000, 54_999, "core").unwrap(),
        Range::named(60_000, 64_999, "extensions").unwrap(),
    ]
}

/// Benchmarks the candidate scan against an increasingly full first range.
fn benchmark_find_first_available(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator/find_first_available");
    let ranges = ranges();

    for consumed in [0, 100, 1_000, 4_999] {
        let ids: Vec<u32> = (50_000..50_000 + consumed).collect();
        group.bench_function(format!("consumed/{consumed}"), |b| {
            b.iter(|| black_box(find_first_available(black_box(&ranges), black_box(&ids))));
        });
    }

    group.finish();
}

fn benchmark_find_available_per_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator/find_available_per_range");
    let ranges = ranges();
    let ids: Vec<u32> = (50_000..52_500).chain(60_000..62_500).collect();

    group.bench_function("consumed/5000", |b| {
        b.iter(|| black_box(find_available_per_range(black_box(&ranges), black_box(&ids))));
    });

    group.finish();
}

/// Benchmarks claiming ids one after another in an in-memory ledger.
fn benchmark_claim(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/claim");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));
    let ranges = ranges();
    let key = StorageKey::object("table");

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_batched(
            ConsumptionLedger::default,
            |mut ledger| {
                for _ in 0..TOTAL_IDS {
                    black_box(claim(&mut ledger, &key, 50_000, &ranges));
                }
                ledger
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmarks sequential reservations against a memory store on one Tokio
/// worker.
fn benchmark_reserve_sequential_tokio(c: &mut Criterion) {
    let mut group = c.benchmark_group("service/reserve/sequential");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        let rt = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(1)
            .build()
            .unwrap();

        b.to_async(&rt).iter_custom(|iters| async move {
            let request = AllocationRequest::new("bench", StorageKey::object("table"), ranges())
                .reserve(true);
            let start = Instant::now();

            for _ in 0..iters {
                let service = AllocationService::new(MemoryStore::new())
                    .with_clock(FixedMockTime { millis: 1 });
                for _ in 0..TOTAL_IDS {
                    let response = service.allocate(&request).await.unwrap();
                    black_box(response);
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks many clients reserving from the same ledger at once. Every lost
/// race costs a re-read and a re-encode of the whole ledger.
fn benchmark_reserve_contended_tokio(c: &mut Criterion) {
    let mut group = c.benchmark_group("service/reserve/contended");
    group.sample_size(10);
    group.sampling_mode(criterion::SamplingMode::Flat);

    for clients in [1, 2, 4, 8, 16] {
        let ids_per_client = TOTAL_IDS / clients;

        group.throughput(Throughput::Elements(TOTAL_IDS as u64));
        group.bench_function(format!("elems/{TOTAL_IDS}/clients/{clients}"), |b| {
            let rt = Builder::new_multi_thread().enable_all().build().unwrap();

            b.to_async(&rt).iter_custom(move |iters| async move {
                let start = Instant::now();

                for _ in 0..iters {
                    let service = AllocationService::new(Arc::new(MemoryStore::new()))
                        .with_clock(FixedMockTime { millis: 1 });
                    let tasks = (0..clients).map(|_| {
                        let service = service.clone();
                        tokio::spawn(async move {
                            let request = AllocationRequest::new(
                                "bench",
                                StorageKey::object("table"),
                                ranges(),
                            )
                            .reserve(true);
                            for _ in 0..ids_per_client {
                                black_box(service.allocate(&request).await?);
                            }
                            Ok::<_, rangeid::Error>(())
                        })
                    });

                    for result in try_join_all(tasks).await.unwrap() {
                        result.unwrap();
                    }
                }

                start.elapsed()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    // Pure computation
    benchmark_find_first_available,
    benchmark_find_available_per_range,
    benchmark_claim,
    // Optimistic updates against a memory store
    benchmark_reserve_sequential_tokio,
    benchmark_reserve_contended_tokio,
);
criterion_main!(benches);
