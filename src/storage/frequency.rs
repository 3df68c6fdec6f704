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

//! Frequency store
//!
//! Counts how often each (relation, attribute) pair was filtered on during a
//! full scan. Counters live in a sharded concurrent map; every increment is
//! persisted to the backend before it becomes visible.
//!
//! Locking, outermost first:
//! 1. the per-key cell lock serializes read-increment-append-publish for
//!    one key, so same-key increments never lose updates
//! 2. the compaction gate, held shared by increments and exclusively while a
//!    checkpoint seals the log and copies the counters, so a snapshot never
//!    misses an append that already reached the log
//!
//! Checkpoint never takes a cell lock, so the order cannot invert. The
//! snapshot itself is written after the gate is released.
//!
//! Automatic compaction runs on a background thread. An increment that
//! finds the log over `compact_after_records` only wakes that thread.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};

use crate::common::{new_concurrent_key_map, ConcurrentKeyMap};
use crate::core::{AttributeId, Error, FrequencyEntry, FrequencyKey, RelationId, Result};
use crate::storage::backend::{CounterBackend, FileBackend, MemoryBackend};
use crate::storage::legacy;
use crate::storage::{Config, PersistenceConfig};

/// Name of the background compaction thread
pub const COMPACTOR_THREAD_NAME: &str = "autoindex-compactor";

/// One counter and the lock that orders its writers
#[derive(Debug, Default)]
struct CounterCell {
    lock: Mutex<()>,
    value: AtomicU64,
}

/// Operator-facing store counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Distinct (relation, attribute) pairs with a non-zero counter
    pub keys: usize,
    /// Successful increments since open
    pub increments: u64,
    /// Increments rejected because the backend failed
    pub failures: u64,
    /// Completed compactions since open
    pub compactions: u64,
    /// Backend records not yet folded into a snapshot
    pub pending_records: u64,
    /// Whether counters survive a restart
    pub durable: bool,
}

/// State shared between the store handle and its compactor thread
struct StoreShared {
    counters: ConcurrentKeyMap<Arc<CounterCell>>,
    backend: Box<dyn CounterBackend>,
    gate: RwLock<()>,
    /// Serializes checkpoints
    compaction: Mutex<()>,
    /// Set while a compaction request is queued or running
    compacting: AtomicBool,
    closed: AtomicBool,
    increments: AtomicU64,
    failures: AtomicU64,
    compactions: AtomicU64,
}

impl StoreShared {
    /// Every non-zero counter, unsorted
    fn collect_entries(&self) -> Vec<FrequencyEntry> {
        self.counters
            .iter()
            .filter_map(|item| {
                let value = item.value().value.load(Ordering::Acquire);
                (value > 0).then(|| FrequencyEntry::new(*item.key(), value))
            })
            .collect()
    }

    fn checkpoint(&self) -> Result<usize> {
        let _compaction = self.compaction.lock();

        let mut entries = {
            let _gate = self.gate.write();
            self.backend.seal().map_err(normalize_backend_error)?;
            self.collect_entries()
        };
        entries.sort_by_key(|e| e.key());

        self.backend
            .compact(&entries)
            .map_err(normalize_backend_error)?;
        self.compactions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counters = entries.len(), "frequency store compacted");
        Ok(entries.len())
    }
}

/// Stop-on-drop handle for the background compaction thread
struct Compactor {
    wake: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Compactor {
    fn start(shared: Arc<StoreShared>) -> Result<Self> {
        let (wake, requests) = channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name(COMPACTOR_THREAD_NAME.to_string())
            .spawn(move || {
                while requests.recv().is_ok() {
                    if shared.closed.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(err) = shared.checkpoint() {
                        tracing::warn!(error = %err, "automatic frequency store compaction failed");
                    }
                    shared.compacting.store(false, Ordering::Release);
                }
            })
            .map_err(|e| Error::internal(format!("failed to start compactor thread: {}", e)))?;

        Ok(Self {
            wake: Some(wake),
            thread: Some(thread),
        })
    }

    /// Queue one compaction; false if one is already queued
    fn wake(&self) -> bool {
        self.wake
            .as_ref()
            .is_some_and(|wake| wake.try_send(()).is_ok())
    }

    /// Wait for a running compaction, then end the thread
    fn stop(&mut self) {
        // Dropping the sender ends the receive loop
        self.wake.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Compactor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Durable, concurrent (relation, attribute) -> count table
pub struct FrequencyStore {
    shared: Arc<StoreShared>,
    compactor: Mutex<Option<Compactor>>,
    compact_after: u64,
    compact_on_close: bool,
}

impl FrequencyStore {
    /// Open the store described by `config`
    ///
    /// A configured path opens (or creates) a durable store directory;
    /// otherwise the store is memory-only.
    pub fn open(config: &Config) -> Result<Self> {
        match config.path.as_deref() {
            Some(path) if config.is_persistent() => {
                let backend = FileBackend::open(path, &config.persistence)?;
                Self::with_backend(Box::new(backend), &config.persistence)
            }
            _ => Self::in_memory(),
        }
    }

    /// Memory-only store
    pub fn in_memory() -> Result<Self> {
        Self::with_backend(Box::new(MemoryBackend::new()), &PersistenceConfig::default())
    }

    /// Build a store over an arbitrary backend, loading what it persisted
    ///
    /// Durable backends with a compaction threshold get a compactor thread.
    pub fn with_backend(
        backend: Box<dyn CounterBackend>,
        config: &PersistenceConfig,
    ) -> Result<Self> {
        let entries = backend.load().map_err(normalize_backend_error)?;

        let counters = new_concurrent_key_map();
        for entry in entries.iter().filter(|e| e.counter > 0) {
            counters.insert(
                entry.key(),
                Arc::new(CounterCell {
                    lock: Mutex::new(()),
                    value: AtomicU64::new(entry.counter),
                }),
            );
        }

        tracing::debug!(
            counters = counters.len(),
            durable = backend.is_durable(),
            "frequency store ready"
        );

        let auto_compact = config.compact_after_records > 0 && backend.is_durable();
        let shared = Arc::new(StoreShared {
            counters,
            backend,
            gate: RwLock::new(()),
            compaction: Mutex::new(()),
            compacting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            increments: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
        });
        let compactor = if auto_compact {
            Some(Compactor::start(Arc::clone(&shared))?)
        } else {
            None
        };

        Ok(Self {
            shared,
            compactor: Mutex::new(compactor),
            compact_after: config.compact_after_records,
            compact_on_close: config.compact_on_close,
        })
    }

    /// Increment the counter for (relation, attribute) and return the new value.
    ///
    /// The first observation of a pair yields 1. On a backend failure the
    /// counter is left unchanged and [`Error::StoreUnavailable`] is returned.
    pub fn record_and_get(&self, relation_id: RelationId, attribute_id: AttributeId) -> Result<u64> {
        self.ensure_open()?;
        let shared = &self.shared;
        let key = FrequencyKey::new(relation_id, attribute_id);
        let cell = self.cell(key);

        let next = {
            let _key_guard = cell.lock.lock();
            let _gate = shared.gate.read();

            let next = cell.value.load(Ordering::Acquire).saturating_add(1);
            if let Err(err) = shared.backend.append(&FrequencyEntry::new(key, next)) {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                return Err(normalize_backend_error(err));
            }
            cell.value.store(next, Ordering::Release);
            next
        };

        shared.increments.fetch_add(1, Ordering::Relaxed);
        self.maybe_compact();
        Ok(next)
    }

    /// Current counter for (relation, attribute), 0 if never observed
    pub fn get(&self, relation_id: RelationId, attribute_id: AttributeId) -> Result<u64> {
        self.ensure_open()?;
        let key = FrequencyKey::new(relation_id, attribute_id);
        Ok(self
            .shared
            .counters
            .get(&key)
            .map(|cell| cell.value.load(Ordering::Acquire))
            .unwrap_or(0))
    }

    /// Snapshot of every non-zero counter, sorted by key
    pub fn entries(&self) -> Vec<FrequencyEntry> {
        let mut entries = self.shared.collect_entries();
        entries.sort_by_key(|e| e.key());
        entries
    }

    /// Number of pairs with a non-zero counter
    pub fn len(&self) -> usize {
        self.shared
            .counters
            .iter()
            .filter(|item| item.value().value.load(Ordering::Acquire) > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_durable(&self) -> bool {
        self.shared.backend.is_durable()
    }

    /// Raise counters to at least the given values.
    ///
    /// Used to import legacy snapshot files. A counter already above the
    /// imported value is kept. Returns how many counters changed.
    pub fn merge_entries(&self, entries: &[FrequencyEntry]) -> Result<usize> {
        self.ensure_open()?;
        let shared = &self.shared;
        let mut changed = 0;
        for entry in entries.iter().filter(|e| e.counter > 0) {
            let key = entry.key();
            let cell = self.cell(key);
            let _key_guard = cell.lock.lock();
            let _gate = shared.gate.read();

            if cell.value.load(Ordering::Acquire) >= entry.counter {
                continue;
            }
            shared
                .backend
                .append(&FrequencyEntry::new(key, entry.counter))
                .map_err(normalize_backend_error)?;
            cell.value.store(entry.counter, Ordering::Release);
            changed += 1;
        }

        if changed > 0 {
            tracing::info!(imported = changed, "merged counters into frequency store");
        }
        self.maybe_compact();
        Ok(changed)
    }

    /// Import a legacy `attributeId relationId counter` file
    pub fn import_legacy(&self, path: impl AsRef<Path>) -> Result<usize> {
        let entries = legacy::read_file(path)?;
        self.merge_entries(&entries)
    }

    /// Write every counter to `path` in the legacy line format
    pub fn export_legacy(&self, path: impl AsRef<Path>) -> Result<usize> {
        let entries = self.entries();
        legacy::write_file(path, &entries)?;
        Ok(entries.len())
    }

    /// Fold all counters into the backend snapshot and empty its log.
    ///
    /// Runs on the caller's thread. Returns the number of counters written.
    pub fn checkpoint(&self) -> Result<usize> {
        self.ensure_open()?;
        self.shared.checkpoint()
    }

    /// Force persisted records to stable storage
    pub fn sync(&self) -> Result<()> {
        self.shared.backend.sync().map_err(normalize_backend_error)
    }

    /// Stop background compaction, then compact (if configured), sync and
    /// release the backend. Idempotent.
    pub fn close(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let compactor = self.compactor.lock().take();
        if let Some(mut compactor) = compactor {
            compactor.stop();
        }

        let compacted = if self.compact_on_close && shared.backend.is_durable() {
            shared.checkpoint().map(|_| ())
        } else {
            Ok(())
        };
        let closed = shared
            .backend
            .sync()
            .and_then(|_| shared.backend.close())
            .map_err(normalize_backend_error);
        compacted.and(closed)
    }

    pub fn stats(&self) -> StoreStats {
        let shared = &self.shared;
        StoreStats {
            keys: self.len(),
            increments: shared.increments.load(Ordering::Relaxed),
            failures: shared.failures.load(Ordering::Relaxed),
            compactions: shared.compactions.load(Ordering::Relaxed),
            pending_records: shared.backend.pending_records(),
            durable: shared.backend.is_durable(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::StoreClosed);
        }
        Ok(())
    }

    fn cell(&self, key: FrequencyKey) -> Arc<CounterCell> {
        let counters = &self.shared.counters;
        if let Some(cell) = counters.get(&key) {
            return Arc::clone(cell.value());
        }
        // Clone out so the shard lock is released before the cell lock is taken
        Arc::clone(counters.entry(key).or_default().value())
    }

    /// Wake the compactor once the backend has accumulated enough records.
    ///
    /// Only one request is outstanding at a time; the caller never waits.
    fn maybe_compact(&self) {
        let shared = &self.shared;
        if self.compact_after == 0 || shared.backend.pending_records() < self.compact_after {
            return;
        }
        if shared.compacting.swap(true, Ordering::AcqRel) {
            return;
        }
        let queued = self
            .compactor
            .try_lock()
            .is_some_and(|compactor| compactor.as_ref().is_some_and(Compactor::wake));
        if !queued {
            shared.compacting.store(false, Ordering::Release);
        }
    }
}

impl Drop for FrequencyStore {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to close frequency store cleanly");
        }
    }
}

impl std::fmt::Debug for FrequencyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyStore")
            .field("counters", &self.shared.counters.len())
            .field("durable", &self.shared.backend.is_durable())
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Every backend failure surfaces as StoreUnavailable
fn normalize_backend_error(err: Error) -> Error {
    match err {
        Error::StoreUnavailable(_) | Error::StoreClosed | Error::DatabaseLocked => err,
        other => Error::store_unavailable(other.to_string()),
    }
}
