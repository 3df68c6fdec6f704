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

//! Index build dispatcher
//!
//! Turns a positive build decision into at most one running build per
//! (relation, attribute). The in-flight set is the single point of dedup:
//! whoever inserts the key owns the build, everyone else gets
//! [`RequestOutcome::AlreadyInFlight`].
//!
//! The key is owned by an [`InFlightGuard`] that travels with the job and
//! removes it on drop, so the key is released exactly once whether the build
//! succeeds, fails, panics, or never runs because spawning failed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use super::worker::{
    BuildOutcome, BuildReport, BuildRequest, BuildWorker, WorkerSpawner, BUILD_WORKER_NAME,
    DEFAULT_MAX_WORKERS,
};
use crate::catalog::Catalog;
use crate::common::KeySet;
use crate::core::{AttributeId, FrequencyKey, RelationId, Result};

/// Where builds run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Hand the build to a spawned worker and return immediately
    #[default]
    Async,
    /// Build on the calling thread
    Sync,
}

impl BuildMode {
    /// Parse a DSN/CLI value, falling back to Async for unknown input
    pub fn parse_lossy(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "sync" | "inline" => BuildMode::Sync,
            _ => BuildMode::Async,
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Default: Async
    pub mode: BuildMode,
    /// Cap on concurrently running workers for the default spawner
    /// Default: 8
    pub max_workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: BuildMode::Async,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl DispatchConfig {
    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }
}

/// Result of a build request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A worker was spawned
    Started,
    /// Another request for the same key is still building
    AlreadyInFlight,
    /// The catalog already has the index
    AlreadyExists,
    /// Built inline (`BuildMode::Sync`)
    Built(BuildOutcome),
}

/// Operator-facing dispatcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    pub requested: u64,
    pub started: u64,
    pub deduplicated: u64,
    pub already_exists: u64,
    pub completed: u64,
    pub failed: u64,
    pub spawn_failures: u64,
    pub in_flight: usize,
}

/// State shared between the dispatcher and its running jobs
#[derive(Default)]
struct Shared {
    in_flight: Mutex<KeySet>,
    idle: Condvar,
    subscribers: Mutex<Vec<Sender<BuildReport>>>,
    requested: AtomicU64,
    started: AtomicU64,
    deduplicated: AtomicU64,
    already_exists: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    spawn_failures: AtomicU64,
}

impl Shared {
    /// Account for a finished build, release its key, then notify subscribers
    fn finish(&self, guard: InFlightGuard, report: BuildReport) {
        if report.outcome.is_success() {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        // Subscribers see the report only after the key is free again
        drop(guard);

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(report.clone()).is_ok());
    }
}

/// Exclusive claim on one in-flight key
struct InFlightGuard {
    shared: Arc<Shared>,
    key: FrequencyKey,
}

impl InFlightGuard {
    /// Atomically claim `key`; None if someone else holds it
    fn acquire(shared: &Arc<Shared>, key: FrequencyKey) -> Option<Self> {
        if !shared.in_flight.lock().insert(key) {
            return None;
        }
        Some(Self {
            shared: Arc::clone(shared),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.shared.in_flight.lock();
        in_flight.remove(&self.key);
        if in_flight.is_empty() {
            self.shared.idle.notify_all();
        }
    }
}

/// Deduplicating front end for index builds
pub struct IndexDispatcher {
    catalog: Arc<dyn Catalog>,
    spawner: Arc<dyn WorkerSpawner>,
    mode: BuildMode,
    shared: Arc<Shared>,
}

impl IndexDispatcher {
    pub fn new(catalog: Arc<dyn Catalog>, spawner: Arc<dyn WorkerSpawner>, mode: BuildMode) -> Self {
        Self {
            catalog,
            spawner,
            mode,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Request an index on (relation, attribute).
    ///
    /// Never waits for a build in `Async` mode. Errors come from the catalog
    /// lookup or from the spawner; in both cases nothing stays in flight.
    pub fn request_build(
        &self,
        relation_id: RelationId,
        attribute_id: AttributeId,
    ) -> Result<RequestOutcome> {
        self.shared.requested.fetch_add(1, Ordering::Relaxed);
        let key = FrequencyKey::new(relation_id, attribute_id);

        let Some(guard) = InFlightGuard::acquire(&self.shared, key) else {
            self.shared.deduplicated.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(relation_id, attribute_id, "index build already in flight");
            return Ok(RequestOutcome::AlreadyInFlight);
        };

        let request = BuildRequest::new(relation_id, attribute_id);
        if self.catalog.index_exists(relation_id, &request.index_name())? {
            self.shared.already_exists.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(relation_id, attribute_id, "index already exists");
            return Ok(RequestOutcome::AlreadyExists);
        }

        match self.mode {
            BuildMode::Sync => {
                let report = run_guarded(self.catalog.as_ref(), &request);
                let outcome = report.outcome.clone();
                self.shared.finish(guard, report);
                Ok(RequestOutcome::Built(outcome))
            }
            BuildMode::Async => self.spawn(guard, request),
        }
    }

    fn spawn(&self, guard: InFlightGuard, request: BuildRequest) -> Result<RequestOutcome> {
        let catalog = Arc::clone(&self.catalog);
        let shared = Arc::clone(&self.shared);
        let (relation_id, attribute_id) = (request.relation_id, request.attribute_id);

        let job = Box::new(move || {
            let report = run_guarded(catalog.as_ref(), &request);
            shared.finish(guard, report);
        });

        match self.spawner.spawn(BUILD_WORKER_NAME, job) {
            Ok(()) => {
                self.shared.started.fetch_add(1, Ordering::Relaxed);
                tracing::info!(relation_id, attribute_id, "index build started");
                Ok(RequestOutcome::Started)
            }
            Err(err) => {
                // The job and its guard were dropped, so the key is free
                self.shared.spawn_failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    /// Keys with a build in progress, sorted
    pub fn in_flight(&self) -> Vec<FrequencyKey> {
        let mut keys: Vec<FrequencyKey> = self.shared.in_flight.lock().iter().copied().collect();
        keys.sort();
        keys
    }

    pub fn is_in_flight(&self, relation_id: RelationId, attribute_id: AttributeId) -> bool {
        self.shared
            .in_flight
            .lock()
            .contains(&FrequencyKey::new(relation_id, attribute_id))
    }

    /// Block until no build is in flight or `timeout` passes.
    ///
    /// Returns true if the dispatcher went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut in_flight = self.shared.in_flight.lock();
        while !in_flight.is_empty() {
            if self
                .shared
                .idle
                .wait_until(&mut in_flight, deadline)
                .timed_out()
            {
                return in_flight.is_empty();
            }
        }
        true
    }

    /// Receive a report for every build that finishes from now on
    pub fn subscribe(&self) -> Receiver<BuildReport> {
        let (tx, rx) = channel::unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    pub fn stats(&self) -> DispatchStats {
        let shared = &self.shared;
        DispatchStats {
            requested: shared.requested.load(Ordering::Relaxed),
            started: shared.started.load(Ordering::Relaxed),
            deduplicated: shared.deduplicated.load(Ordering::Relaxed),
            already_exists: shared.already_exists.load(Ordering::Relaxed),
            completed: shared.completed.load(Ordering::Relaxed),
            failed: shared.failed.load(Ordering::Relaxed),
            spawn_failures: shared.spawn_failures.load(Ordering::Relaxed),
            in_flight: shared.in_flight.lock().len(),
        }
    }
}

/// Run a build, turning a panic into a failed report
fn run_guarded(catalog: &dyn Catalog, request: &BuildRequest) -> BuildReport {
    let start = Instant::now();
    panic::catch_unwind(AssertUnwindSafe(|| BuildWorker::run(catalog, request))).unwrap_or_else(
        |payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!(
                relation_id = request.relation_id,
                attribute_id = request.attribute_id,
                "index build worker panicked: {}",
                message
            );
            BuildReport {
                request: request.clone(),
                outcome: BuildOutcome::Failed(format!("worker panicked: {}", message)),
                elapsed: start.elapsed(),
            }
        },
    )
}
