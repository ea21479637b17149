use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use kvscope_storage::{scan_page, KvStore, MemoryStore, PageRequest};

fn synthetic_store(count: usize) -> MemoryStore {
    let store = MemoryStore::new();
    for i in 0..count {
        let prefix = if i % 2 == 0 { "even" } else { "odd" };
        store
            .put(format!("{prefix}:{i:08}").as_bytes(), b"value")
            .expect("seed key");
    }
    store
}

fn walk_all_pages(store: &MemoryStore, request: PageRequest) -> usize {
    let mut request = request;
    let mut seen = 0;
    loop {
        let page = scan_page(store, &request).expect("scan page");
        seen += page.keys.len();
        match page.next_key {
            Some(next) => request = request.with_start_key(next),
            None => return seen,
        }
    }
}

fn bench_page_scan(c: &mut Criterion) {
    c.bench_function("memory_store_full_walk_limit_50", |b| {
        b.iter_batched(
            || synthetic_store(2_000),
            |store| walk_all_pages(&store, PageRequest::new()),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("memory_store_prefix_walk_limit_100", |b| {
        b.iter_batched(
            || synthetic_store(2_000),
            |store| walk_all_pages(&store, PageRequest::new().with_prefix("odd:").with_limit(100)),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(storage_benches, bench_page_scan);
criterion_main!(storage_benches);
