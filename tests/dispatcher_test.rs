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

//! Index dispatcher and build worker tests
//!
//! `GatedCatalog` holds a build inside `create_index` until the test releases
//! it, which keeps a key in flight for as long as a test needs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use autoindex::{
    AttributeId, BuildJob, BuildMode, BuildOutcome, Catalog, CreateIndexOutcome, Error,
    FrequencyKey, IndexDispatcher, LockMode, MemoryCatalog, RelationId, RelationLock,
    RelationStats, RequestOutcome, Result, ThreadSpawner, WorkerSpawner,
};

const REL: RelationId = 16384;
const WAIT: Duration = Duration::from_secs(10);

struct GatedCatalog {
    inner: MemoryCatalog,
    entered: Sender<FrequencyKey>,
    release: Receiver<()>,
    gated: AtomicBool,
    fail_on_build: AtomicBool,
    panic_on_build: AtomicBool,
}

struct Gate {
    catalog: Arc<GatedCatalog>,
    entered: Receiver<FrequencyKey>,
    release: Sender<()>,
}

impl Gate {
    fn new() -> Self {
        let inner = MemoryCatalog::new();
        inner.add_relation(REL, [1, 2, 3], 300, 3);
        let (entered_tx, entered_rx) = channel::unbounded();
        let (release_tx, release_rx) = channel::unbounded();
        Self {
            catalog: Arc::new(GatedCatalog {
                inner,
                entered: entered_tx,
                release: release_rx,
                gated: AtomicBool::new(true),
                fail_on_build: AtomicBool::new(false),
                panic_on_build: AtomicBool::new(false),
            }),
            entered: entered_rx,
            release: release_tx,
        }
    }

    fn ungated() -> Self {
        let gate = Self::new();
        gate.catalog.gated.store(false, Ordering::SeqCst);
        gate
    }

    fn dispatcher(&self, spawner: Arc<dyn WorkerSpawner>) -> IndexDispatcher {
        IndexDispatcher::new(self.catalog.clone(), spawner, BuildMode::Async)
    }

    /// Wait until a worker is blocked inside create_index
    fn wait_entered(&self) -> FrequencyKey {
        self.entered.recv_timeout(WAIT).expect("worker never started")
    }

    fn release_one(&self) {
        self.release.send(()).unwrap();
    }
}

impl Catalog for GatedCatalog {
    fn relation_stats(&self, relation_id: RelationId) -> Result<RelationStats> {
        self.inner.relation_stats(relation_id)
    }

    fn index_exists(&self, relation_id: RelationId, name: &str) -> Result<bool> {
        self.inner.index_exists(relation_id, name)
    }

    fn create_index(
        &self,
        relation_id: RelationId,
        attribute_id: AttributeId,
        name: &str,
    ) -> Result<CreateIndexOutcome> {
        if self.gated.load(Ordering::SeqCst) {
            let _ = self
                .entered
                .send(FrequencyKey::new(relation_id, attribute_id));
            let _ = self.release.recv_timeout(WAIT);
        }
        if self.panic_on_build.load(Ordering::SeqCst) {
            panic!("index build crashed");
        }
        if self.fail_on_build.load(Ordering::SeqCst) {
            return Err(Error::internal("out of disk space"));
        }
        self.inner.create_index(relation_id, attribute_id, name)
    }

    fn lock_relation(&self, relation_id: RelationId, mode: LockMode) -> Result<RelationLock> {
        self.inner.lock_relation(relation_id, mode)
    }
}

/// Spawner that counts jobs and refuses after `limit`
struct CountingSpawner {
    inner: ThreadSpawner,
    spawned: AtomicUsize,
    limit: usize,
}

impl CountingSpawner {
    fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: ThreadSpawner::new(64),
            spawned: AtomicUsize::new(0),
            limit,
        })
    }

    fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl WorkerSpawner for CountingSpawner {
    fn spawn(&self, name: &str, job: BuildJob) -> Result<()> {
        if self.spawned.load(Ordering::SeqCst) >= self.limit {
            return Err(Error::spawn_failed("no background worker slots"));
        }
        self.spawned.fetch_add(1, Ordering::SeqCst);
        self.inner.spawn(name, job)
    }
}

#[test_log::test]
fn test_concurrent_requests_spawn_once() {
    let gate = Gate::new();
    let spawner = CountingSpawner::new(usize::MAX);
    let dispatcher = Arc::new(gate.dispatcher(spawner.clone()));

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                dispatcher.request_build(REL, 2).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<RequestOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let started = outcomes
        .iter()
        .filter(|o| **o == RequestOutcome::Started)
        .count();
    let deduplicated = outcomes
        .iter()
        .filter(|o| **o == RequestOutcome::AlreadyInFlight)
        .count();
    assert_eq!(started, 1);
    assert_eq!(deduplicated, threads - 1);
    assert_eq!(spawner.spawned(), 1);

    assert_eq!(gate.wait_entered(), FrequencyKey::new(REL, 2));
    assert!(dispatcher.is_in_flight(REL, 2));
    gate.release_one();

    assert!(dispatcher.wait_idle(WAIT));
    assert!(gate.catalog.inner.index("auto_16384_2").is_some());
    assert_eq!(gate.catalog.inner.create_calls(), 1);

    let stats = dispatcher.stats();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.deduplicated, threads as u64 - 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn test_distinct_attributes_build_in_parallel() {
    let gate = Gate::new();
    let dispatcher = gate.dispatcher(CountingSpawner::new(usize::MAX));

    assert_eq!(dispatcher.request_build(REL, 1).unwrap(), RequestOutcome::Started);
    assert_eq!(dispatcher.request_build(REL, 3).unwrap(), RequestOutcome::Started);

    let mut entered = vec![gate.wait_entered(), gate.wait_entered()];
    entered.sort();
    assert_eq!(
        entered,
        vec![FrequencyKey::new(REL, 1), FrequencyKey::new(REL, 3)]
    );
    assert_eq!(
        dispatcher.in_flight(),
        vec![FrequencyKey::new(REL, 1), FrequencyKey::new(REL, 3)]
    );

    gate.release_one();
    gate.release_one();
    assert!(dispatcher.wait_idle(WAIT));
    assert_eq!(gate.catalog.inner.indexes().len(), 2);
}

#[test]
fn test_existing_index_is_not_rebuilt() {
    let gate = Gate::ungated();
    let spawner = CountingSpawner::new(usize::MAX);
    let dispatcher = gate.dispatcher(spawner.clone());
    let reports = dispatcher.subscribe();

    assert_eq!(dispatcher.request_build(REL, 2).unwrap(), RequestOutcome::Started);
    let report = reports.recv_timeout(WAIT).unwrap();
    assert!(matches!(report.outcome, BuildOutcome::Created(_)));

    assert_eq!(
        dispatcher.request_build(REL, 2).unwrap(),
        RequestOutcome::AlreadyExists
    );
    assert_eq!(spawner.spawned(), 1);
    assert!(!dispatcher.is_in_flight(REL, 2));
    assert_eq!(dispatcher.stats().already_exists, 1);
}

#[test]
fn test_key_released_after_failure() {
    let gate = Gate::ungated();
    gate.catalog.fail_on_build.store(true, Ordering::SeqCst);
    let dispatcher = gate.dispatcher(CountingSpawner::new(usize::MAX));
    let reports = dispatcher.subscribe();

    assert_eq!(dispatcher.request_build(REL, 2).unwrap(), RequestOutcome::Started);
    let report = reports.recv_timeout(WAIT).unwrap();
    match &report.outcome {
        BuildOutcome::Failed(message) => assert!(message.contains("out of disk space")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!dispatcher.is_in_flight(REL, 2));
    assert!(gate.catalog.inner.indexes().is_empty());

    // A later request may try again
    gate.catalog.fail_on_build.store(false, Ordering::SeqCst);
    assert_eq!(dispatcher.request_build(REL, 2).unwrap(), RequestOutcome::Started);
    assert!(reports.recv_timeout(WAIT).unwrap().outcome.is_success());
    assert!(gate.catalog.inner.index("auto_16384_2").is_some());

    let stats = dispatcher.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
}

#[test]
fn test_key_released_after_worker_panic() {
    let gate = Gate::ungated();
    gate.catalog.panic_on_build.store(true, Ordering::SeqCst);
    let dispatcher = gate.dispatcher(CountingSpawner::new(usize::MAX));
    let reports = dispatcher.subscribe();

    assert_eq!(dispatcher.request_build(REL, 1).unwrap(), RequestOutcome::Started);
    let report = reports.recv_timeout(WAIT).unwrap();
    match &report.outcome {
        BuildOutcome::Failed(message) => assert!(message.contains("index build crashed")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(dispatcher.wait_idle(WAIT));
    assert!(!dispatcher.is_in_flight(REL, 1));
}

#[test]
fn test_spawn_failure_is_reported_and_released() {
    let gate = Gate::ungated();
    let dispatcher = gate.dispatcher(CountingSpawner::new(0));

    let err = dispatcher.request_build(REL, 2).unwrap_err();
    assert!(matches!(err, Error::SpawnFailed(_)));
    assert!(dispatcher.in_flight().is_empty());
    assert!(gate.catalog.inner.indexes().is_empty());

    // Nothing stays claimed, so the next request tries again
    assert!(dispatcher.request_build(REL, 2).is_err());
    assert_eq!(dispatcher.stats().spawn_failures, 2);
}

#[test]
fn test_thread_spawner_slot_limit() {
    let gate = Gate::new();
    let spawner = Arc::new(ThreadSpawner::new(1));
    let dispatcher = gate.dispatcher(spawner.clone());

    assert_eq!(dispatcher.request_build(REL, 1).unwrap(), RequestOutcome::Started);
    gate.wait_entered();
    assert_eq!(spawner.active(), 1);

    let err = dispatcher.request_build(REL, 2).unwrap_err();
    assert!(err.to_string().contains("max_workers"));
    assert!(!dispatcher.is_in_flight(REL, 2));

    gate.release_one();
    assert!(dispatcher.wait_idle(WAIT));
    // Slot is returned once the worker thread exits
    for _ in 0..100 {
        if spawner.active() == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(spawner.active(), 0);
}

#[test]
fn test_sync_mode_builds_inline() {
    let gate = Gate::ungated();
    let spawner = CountingSpawner::new(0);
    let dispatcher = IndexDispatcher::new(gate.catalog.clone(), spawner.clone(), BuildMode::Sync);

    match dispatcher.request_build(REL, 3).unwrap() {
        RequestOutcome::Built(BuildOutcome::Created(index)) => {
            assert_eq!(index.name, "auto_16384_3");
            assert_eq!(index.attribute_id, 3);
        }
        other => panic!("expected inline build, got {:?}", other),
    }
    assert_eq!(spawner.spawned(), 0);
    assert!(dispatcher.in_flight().is_empty());
}

#[test]
fn test_unknown_relation_surfaces_catalog_error() {
    let gate = Gate::ungated();
    let dispatcher = gate.dispatcher(CountingSpawner::new(usize::MAX));

    let err = dispatcher.request_build(1, 1).unwrap_err();
    assert!(err.is_not_found());
    assert!(dispatcher.in_flight().is_empty());
}

#[test]
fn test_writer_waits_for_build() {
    let gate = Gate::new();
    let dispatcher = gate.dispatcher(CountingSpawner::new(usize::MAX));

    assert_eq!(dispatcher.request_build(REL, 2).unwrap(), RequestOutcome::Started);
    gate.wait_entered();

    // The worker holds a share lock, so an exclusive locker blocks
    let catalog = gate.catalog.clone();
    let (done_tx, done_rx) = channel::bounded(1);
    let writer = thread::spawn(move || {
        let _lock = catalog.lock_relation(REL, LockMode::Exclusive).unwrap();
        done_tx.send(()).unwrap();
    });
    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

    gate.release_one();
    done_rx.recv_timeout(WAIT).unwrap();
    writer.join().unwrap();
    assert!(dispatcher.wait_idle(WAIT));
}
