// Copyright 2025 Stoolap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hot-path cost of counting a scan
//!
//! Run with: cargo bench --bench observe_scan
//!
//! The relation is large enough that no observation ever crosses the build
//! threshold, so every iteration measures counting plus the cost decision.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::tempdir;

use autoindex::{AutoIndexer, FrequencyStore, MemoryCatalog, ScanFilter};

const REL: u32 = 16384;
const ROWS: u64 = u64::MAX / 2;

fn catalog() -> Arc<MemoryCatalog> {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.add_relation(REL, 1..=16, ROWS, ROWS / 100);
    catalog
}

fn bench_memory_store(c: &mut Criterion) {
    let store = FrequencyStore::in_memory().unwrap();
    c.bench_function("record_and_get/memory", |b| {
        b.iter(|| black_box(store.record_and_get(black_box(REL), black_box(1)).unwrap()))
    });
}

fn bench_observe_scan(c: &mut Criterion) {
    let advisor = AutoIndexer::open("memory://", catalog()).unwrap();
    let filter = ScanFilter::new(REL, [3]);
    c.bench_function("observe_scan/memory", |b| {
        b.iter(|| black_box(advisor.observe_scan(black_box(&filter))))
    });

    let mut attribute = 0i16;
    c.bench_function("observe_scan/memory_rotating_keys", |b| {
        b.iter(|| {
            attribute = attribute % 16 + 1;
            black_box(advisor.observe(REL, attribute))
        })
    });
}

fn bench_file_store(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let dsn = format!("file://{}?sync=none", dir.path().display());
    let advisor = AutoIndexer::open(&dsn, catalog()).unwrap();
    let filter = ScanFilter::new(REL, [3]);
    c.bench_function("observe_scan/file_sync_none", |b| {
        b.iter(|| black_box(advisor.observe_scan(black_box(&filter))))
    });

    let dir = tempdir().unwrap();
    let dsn = format!("file://{}?sync=normal", dir.path().display());
    let advisor = AutoIndexer::open(&dsn, catalog()).unwrap();
    c.bench_function("observe_scan/file_sync_normal", |b| {
        b.iter(|| black_box(advisor.observe_scan(black_box(&filter))))
    });
}

criterion_group!(
    benches,
    bench_memory_store,
    bench_observe_scan,
    bench_file_store
);
criterion_main!(benches);
