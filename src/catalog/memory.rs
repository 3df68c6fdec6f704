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

//! In-process reference catalog

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::{Catalog, CreateIndexOutcome, LockMode, RelationLock};
use crate::core::{AttributeId, Error, IndexDescriptor, RelationId, RelationStats, Result};

struct RelationEntry {
    attributes: Vec<AttributeId>,
    row_estimate: AtomicU64,
    page_estimate: AtomicU64,
    lock: Arc<RwLock<()>>,
}

/// Relations with attribute lists and estimates, plus an index registry
#[derive(Default)]
pub struct MemoryCatalog {
    relations: RwLock<FxHashMap<RelationId, Arc<RelationEntry>>>,
    /// Index name -> descriptor
    indexes: Mutex<BTreeMap<String, IndexDescriptor>>,
    create_calls: AtomicU64,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a relation
    pub fn add_relation(
        &self,
        relation_id: RelationId,
        attributes: impl IntoIterator<Item = AttributeId>,
        row_estimate: u64,
        page_estimate: u64,
    ) {
        let entry = RelationEntry {
            attributes: attributes.into_iter().collect(),
            row_estimate: AtomicU64::new(row_estimate),
            page_estimate: AtomicU64::new(page_estimate),
            lock: Arc::new(RwLock::new(())),
        };
        self.relations.write().insert(relation_id, Arc::new(entry));
    }

    /// Refresh statistics, as ANALYZE would
    pub fn set_row_estimate(&self, relation_id: RelationId, row_estimate: u64) -> Result<()> {
        let entry = self.relation(relation_id)?;
        entry.row_estimate.store(row_estimate, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_page_estimate(&self, relation_id: RelationId, page_estimate: u64) -> Result<()> {
        let entry = self.relation(relation_id)?;
        entry.page_estimate.store(page_estimate, Ordering::Relaxed);
        Ok(())
    }

    /// All registered indexes, ordered by name
    pub fn indexes(&self) -> Vec<IndexDescriptor> {
        self.indexes.lock().values().cloned().collect()
    }

    pub fn index(&self, name: &str) -> Option<IndexDescriptor> {
        self.indexes.lock().get(name).cloned()
    }

    /// Number of `create_index` calls, including no-op duplicates
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::Relaxed)
    }

    fn relation(&self, relation_id: RelationId) -> Result<Arc<RelationEntry>> {
        self.relations
            .read()
            .get(&relation_id)
            .cloned()
            .ok_or(Error::RelationNotFound(relation_id))
    }
}

impl Catalog for MemoryCatalog {
    fn relation_stats(&self, relation_id: RelationId) -> Result<RelationStats> {
        let entry = self.relation(relation_id)?;
        Ok(RelationStats::new(
            relation_id,
            entry.row_estimate.load(Ordering::Relaxed),
            entry.page_estimate.load(Ordering::Relaxed),
        ))
    }

    fn index_exists(&self, relation_id: RelationId, name: &str) -> Result<bool> {
        self.relation(relation_id)?;
        Ok(self
            .indexes
            .lock()
            .get(name)
            .is_some_and(|index| index.relation_id == relation_id))
    }

    fn create_index(
        &self,
        relation_id: RelationId,
        attribute_id: AttributeId,
        name: &str,
    ) -> Result<CreateIndexOutcome> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);

        let entry = self.relation(relation_id)?;
        if !entry.attributes.contains(&attribute_id) {
            return Err(Error::AttributeNotFound {
                relation_id,
                attribute_id,
            });
        }

        let mut indexes = self.indexes.lock();
        if indexes.contains_key(name) {
            return Ok(CreateIndexOutcome::AlreadyExists);
        }
        let descriptor = IndexDescriptor::single_attribute(name, relation_id, attribute_id);
        indexes.insert(name.to_string(), descriptor.clone());
        Ok(CreateIndexOutcome::Created(descriptor))
    }

    fn lock_relation(&self, relation_id: RelationId, mode: LockMode) -> Result<RelationLock> {
        let entry = self.relation(relation_id)?;
        let lock = match mode {
            LockMode::Share => RelationLock::new(relation_id, mode, entry.lock.read_arc()),
            LockMode::Exclusive => RelationLock::new(relation_id, mode, entry.lock.write_arc()),
        };
        Ok(lock)
    }
}
