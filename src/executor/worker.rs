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

//! Index build worker
//!
//! A build is a single-shot unit of work: take a share lock on the relation,
//! ask the catalog to create the index, release the lock and finish. Nothing
//! is retried here; a failed build is reported and abandoned, and the next
//! qualifying observation will request it again.
//!
//! Where the work runs is decided by a [`WorkerSpawner`]. [`ThreadSpawner`]
//! runs each build on its own named OS thread.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::catalog::{Catalog, CreateIndexOutcome, LockMode};
use crate::core::{
    auto_index_name, AttributeId, Error, FrequencyKey, IndexDescriptor, RelationId, Result,
};

/// Thread name given to every build worker
pub const BUILD_WORKER_NAME: &str = "auto index creator";

/// Default cap on concurrently running build workers
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// One requested index build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub relation_id: RelationId,
    pub attribute_id: AttributeId,
    pub requested_at: DateTime<Utc>,
}

impl BuildRequest {
    pub fn new(relation_id: RelationId, attribute_id: AttributeId) -> Self {
        Self {
            relation_id,
            attribute_id,
            requested_at: Utc::now(),
        }
    }

    pub fn key(&self) -> FrequencyKey {
        FrequencyKey::new(self.relation_id, self.attribute_id)
    }

    pub fn index_name(&self) -> String {
        auto_index_name(self.relation_id, self.attribute_id)
    }
}

/// How a build ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Created(IndexDescriptor),
    /// The catalog already had an index with this name
    AlreadyExists(String),
    Failed(String),
}

impl BuildOutcome {
    /// True unless the build failed
    pub fn is_success(&self) -> bool {
        !matches!(self, BuildOutcome::Failed(_))
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOutcome::Created(index) => write!(f, "created {}", index.name),
            BuildOutcome::AlreadyExists(name) => write!(f, "{} already exists", name),
            BuildOutcome::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

/// Completion record delivered to the dispatcher
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub request: BuildRequest,
    pub outcome: BuildOutcome,
    pub elapsed: Duration,
}

/// Performs one index build against the catalog
pub struct BuildWorker;

impl BuildWorker {
    /// Run `request` to completion on the current thread
    pub fn run(catalog: &dyn Catalog, request: &BuildRequest) -> BuildReport {
        let start = Instant::now();
        let name = request.index_name();

        tracing::info!(
            relation_id = request.relation_id,
            attribute_id = request.attribute_id,
            index = %name,
            "building index"
        );

        let outcome = match Self::build(catalog, request, &name) {
            Ok(CreateIndexOutcome::Created(descriptor)) => BuildOutcome::Created(descriptor),
            Ok(CreateIndexOutcome::AlreadyExists) => BuildOutcome::AlreadyExists(name),
            Err(err) => BuildOutcome::Failed(
                Error::build_failed(request.relation_id, request.attribute_id, err.to_string())
                    .to_string(),
            ),
        };

        let elapsed = start.elapsed();
        match &outcome {
            BuildOutcome::Failed(message) => tracing::warn!(
                relation_id = request.relation_id,
                attribute_id = request.attribute_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                message
            ),
            done => tracing::info!(
                relation_id = request.relation_id,
                attribute_id = request.attribute_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "index build finished: {}",
                done
            ),
        }

        BuildReport {
            request: request.clone(),
            outcome,
            elapsed,
        }
    }

    fn build(
        catalog: &dyn Catalog,
        request: &BuildRequest,
        name: &str,
    ) -> Result<CreateIndexOutcome> {
        // Readers keep scanning; writers wait until the build is registered
        let _lock = catalog.lock_relation(request.relation_id, LockMode::Share)?;
        catalog.create_index(request.relation_id, request.attribute_id, name)
    }
}

/// A unit of background work handed to a spawner
pub type BuildJob = Box<dyn FnOnce() + Send + 'static>;

/// Host process-management facility
///
/// `spawn` either starts `job` somewhere and returns Ok, or returns an error
/// without ever running it. A job that is dropped unrun must be harmless.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, name: &str, job: BuildJob) -> Result<()>;
}

/// Runs each job on a fresh named OS thread, at most `max_workers` at a time
#[derive(Debug)]
pub struct ThreadSpawner {
    max_workers: usize,
    active: Arc<AtomicUsize>,
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl ThreadSpawner {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Workers currently running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    fn reserve_slot(&self) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.max_workers).then_some(active + 1)
            })
            .is_ok()
    }
}

/// Returns a worker slot when the thread finishes, even by panic
struct SlotGuard(Arc<AtomicUsize>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self, name: &str, job: BuildJob) -> Result<()> {
        if !self.reserve_slot() {
            return Err(Error::spawn_failed(format!(
                "all {} worker slots are in use; consider increasing max_workers",
                self.max_workers
            )));
        }

        let slot = SlotGuard(Arc::clone(&self.active));
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _slot = slot;
                job();
            })
            .map(|_| ())
            // On failure the closure, slot and job are dropped unrun
            .map_err(|e| Error::spawn_failed(e.to_string()))
    }
}
