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

//! Catalog interface
//!
//! The advisor never owns relations or indexes. It reads statistics, checks
//! for existing indexes, takes relation locks and asks for index creation
//! through [`Catalog`], which the host database implements.
//! [`MemoryCatalog`] is the in-process reference implementation.

pub mod memory;

use std::any::Any;
use std::fmt;

use crate::core::{AttributeId, IndexDescriptor, RelationId, RelationStats, Result};

pub use memory::MemoryCatalog;

/// Relation lock strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Concurrent readers allowed, writers excluded
    Share,
    /// Sole access
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Share => write!(f, "SHARE"),
            LockMode::Exclusive => write!(f, "EXCLUSIVE"),
        }
    }
}

/// A held relation lock, released on drop
pub struct RelationLock {
    relation_id: RelationId,
    mode: LockMode,
    _guard: Box<dyn Any>,
}

impl RelationLock {
    /// Wrap whatever guard object the catalog uses to hold the lock
    pub fn new(relation_id: RelationId, mode: LockMode, guard: impl Any) -> Self {
        Self {
            relation_id,
            mode,
            _guard: Box::new(guard),
        }
    }

    pub fn relation_id(&self) -> RelationId {
        self.relation_id
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl fmt::Debug for RelationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationLock")
            .field("relation_id", &self.relation_id)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Result of an idempotent create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateIndexOutcome {
    Created(IndexDescriptor),
    /// An index with the requested name was already registered
    AlreadyExists,
}

/// Host catalog operations used by the advisor
///
/// Implementations must be safe to call from query threads and build workers
/// concurrently.
pub trait Catalog: Send + Sync {
    /// Fresh planner statistics for a relation
    fn relation_stats(&self, relation_id: RelationId) -> Result<RelationStats>;

    /// Whether an index named `name` exists on the relation
    fn index_exists(&self, relation_id: RelationId, name: &str) -> Result<bool>;

    /// Create a single-attribute default-ordering index named `name`.
    ///
    /// Must be atomic: on error no partial index may remain registered, and a
    /// duplicate name returns [`CreateIndexOutcome::AlreadyExists`].
    fn create_index(
        &self,
        relation_id: RelationId,
        attribute_id: AttributeId,
        name: &str,
    ) -> Result<CreateIndexOutcome>;

    /// Block until the relation lock is granted in `mode`
    fn lock_relation(&self, relation_id: RelationId, mode: LockMode) -> Result<RelationLock>;
}
