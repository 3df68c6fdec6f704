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

//! Durable backings for the frequency store

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::common::KeyMap;
use crate::core::{FrequencyEntry, Result};
use crate::storage::counter_log::{read_log_file, CounterLog, ReplayInfo, COUNTER_LOG_FILE};
use crate::storage::file_lock::StoreLock;
use crate::storage::legacy::{self, SNAPSHOT_FILE};
use crate::storage::PersistenceConfig;

/// Storage behind a [`FrequencyStore`](crate::storage::FrequencyStore).
///
/// Implementations only persist; the store owns concurrency. `append` is
/// called with the post-increment value while the caller holds that key's
/// lock. A checkpoint calls `seal` while no append is in progress, copies
/// the counters, then calls `compact` with that copy while appends go on.
pub trait CounterBackend: Send + Sync {
    /// Load every persisted counter
    fn load(&self) -> Result<Vec<FrequencyEntry>>;

    /// Persist a new value for one counter
    fn append(&self, entry: &FrequencyEntry) -> Result<()>;

    /// Number of appends since the last compaction
    fn pending_records(&self) -> u64;

    /// Close the current run of appends; the next `compact` covers them
    fn seal(&self) -> Result<()> {
        Ok(())
    }

    /// Replace everything persisted up to the last `seal` with `entries`
    fn compact(&self, entries: &[FrequencyEntry]) -> Result<()>;

    /// Force appended data to stable storage
    fn sync(&self) -> Result<()>;

    /// Release resources; later appends fail
    fn close(&self) -> Result<()>;

    /// Whether data survives a restart
    fn is_durable(&self) -> bool;
}

/// Non-durable backing for `memory://` stores
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl MemoryBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CounterBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<FrequencyEntry>> {
        Ok(Vec::new())
    }

    fn append(&self, _entry: &FrequencyEntry) -> Result<()> {
        Ok(())
    }

    fn pending_records(&self) -> u64 {
        // Nothing to compact
        0
    }

    fn compact(&self, _entries: &[FrequencyEntry]) -> Result<()> {
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Directory-backed store: a counter log plus a flat-file snapshot
///
/// ```text
/// <dir>/advisor.lock   exclusive process lock
/// <dir>/seq_attr.txt   compacted snapshot, legacy line format
/// <dir>/counter.log    increments since the snapshot
/// <dir>/counter.log.sealed
///                      increments being folded into the snapshot
/// ```
pub struct FileBackend {
    dir: PathBuf,
    log: CounterLog,
    /// Counters recovered during open, handed out by the first `load`
    recovered: Mutex<Option<Vec<FrequencyEntry>>>,
    _lock: StoreLock,
}

impl FileBackend {
    /// Lock `dir`, read the snapshot and replay the log
    pub fn open(dir: impl AsRef<Path>, config: &PersistenceConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let lock = StoreLock::acquire(&dir)?;

        let snapshot = legacy::read_file(dir.join(SNAPSHOT_FILE))?;
        let (log, replay) = CounterLog::open(dir.join(COUNTER_LOG_FILE), config)?;
        let sealed = log.read_sealed()?;

        let records = log_entries(&[&sealed, &replay]);
        let recovered = merge_max(&snapshot, &records);

        tracing::debug!(
            dir = ?dir,
            snapshot_entries = snapshot.len(),
            log_records = records.len(),
            counters = recovered.len(),
            "opened frequency store"
        );

        Ok(Self {
            dir,
            log,
            recovered: Mutex::new(Some(recovered)),
            _lock: lock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }
}

fn log_entries(segments: &[&ReplayInfo]) -> Vec<FrequencyEntry> {
    segments
        .iter()
        .flat_map(|info| info.records.iter().map(|r| r.entry))
        .collect()
}

/// Merge snapshot and log values, keeping the largest value per key
fn merge_max(snapshot: &[FrequencyEntry], records: &[FrequencyEntry]) -> Vec<FrequencyEntry> {
    let mut merged: KeyMap<u64> = KeyMap::default();
    for entry in snapshot.iter().chain(records) {
        let slot = merged.entry(entry.key()).or_insert(0);
        *slot = (*slot).max(entry.counter);
    }
    merged
        .into_iter()
        .map(|(key, counter)| FrequencyEntry::new(key, counter))
        .collect()
}

impl CounterBackend for FileBackend {
    fn load(&self) -> Result<Vec<FrequencyEntry>> {
        if let Some(entries) = self.recovered.lock().take() {
            return Ok(entries);
        }

        // Already handed out once: reread what is on disk
        self.log.sync()?;
        let snapshot = legacy::read_file(self.snapshot_path())?;
        let sealed = self.log.read_sealed()?;
        let live = read_log_file(self.log.path())?;
        Ok(merge_max(&snapshot, &log_entries(&[&sealed, &live])))
    }

    fn append(&self, entry: &FrequencyEntry) -> Result<()> {
        self.log.append(entry).map(|_| ())
    }

    fn pending_records(&self) -> u64 {
        self.log.record_count()
    }

    fn seal(&self) -> Result<()> {
        self.log.seal()
    }

    fn compact(&self, entries: &[FrequencyEntry]) -> Result<()> {
        // Snapshot first: if we crash before the sealed segment is removed,
        // every sealed value is <= its snapshot value and replay keeps the
        // maximum
        legacy::write_file(self.snapshot_path(), entries)?;
        self.log.discard_sealed()
    }

    fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    fn close(&self) -> Result<()> {
        self.log.close()
    }

    fn is_durable(&self) -> bool {
        true
    }
}
