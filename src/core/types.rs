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

//! Identifiers and records shared by every advisor component

use std::fmt;

use chrono::{DateTime, Utc};

/// Catalog identifier of a relation
pub type RelationId = u32;

/// Attribute number within a relation (1-based, as the catalog numbers them)
pub type AttributeId = i16;

/// Prefix of every index the advisor creates
pub const AUTO_INDEX_PREFIX: &str = "auto_";

/// Deterministic index name for a (relation, attribute) pair
///
/// Repeated decisions for the same pair always produce the same name, which
/// is what makes catalog-level create-if-not-exists idempotent.
pub fn auto_index_name(relation_id: RelationId, attribute_id: AttributeId) -> String {
    format!("{}{}_{}", AUTO_INDEX_PREFIX, relation_id, attribute_id)
}

/// Key of a frequency counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrequencyKey {
    pub relation_id: RelationId,
    pub attribute_id: AttributeId,
}

impl FrequencyKey {
    pub const fn new(relation_id: RelationId, attribute_id: AttributeId) -> Self {
        Self {
            relation_id,
            attribute_id,
        }
    }

    /// Name of the index the advisor would build for this key
    pub fn index_name(&self) -> String {
        auto_index_name(self.relation_id, self.attribute_id)
    }
}

impl fmt::Display for FrequencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel={} attr={}", self.relation_id, self.attribute_id)
    }
}

/// One persisted counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyEntry {
    pub relation_id: RelationId,
    pub attribute_id: AttributeId,
    pub counter: u64,
}

impl FrequencyEntry {
    pub fn new(key: FrequencyKey, counter: u64) -> Self {
        Self {
            relation_id: key.relation_id,
            attribute_id: key.attribute_id,
            counter,
        }
    }

    pub fn key(&self) -> FrequencyKey {
        FrequencyKey::new(self.relation_id, self.attribute_id)
    }
}

/// Planner statistics snapshot for one relation
///
/// Borrowed from the catalog for a single decision and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationStats {
    pub relation_id: RelationId,
    /// Estimated row count
    pub row_estimate: u64,
    /// Estimated number of pages
    pub page_estimate: u64,
}

impl RelationStats {
    pub fn new(relation_id: RelationId, row_estimate: u64, page_estimate: u64) -> Self {
        Self {
            relation_id,
            row_estimate,
            page_estimate,
        }
    }
}

/// Index access method
///
/// The advisor only ever builds the default ordering index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexKind {
    #[default]
    BTree,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::BTree => write!(f, "btree"),
        }
    }
}

/// An index registered in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    pub relation_id: RelationId,
    pub attribute_id: AttributeId,
    pub kind: IndexKind,
    pub created_at: DateTime<Utc>,
}

impl IndexDescriptor {
    /// Descriptor for a single-attribute default-ordering index
    pub fn single_attribute(
        name: impl Into<String>,
        relation_id: RelationId,
        attribute_id: AttributeId,
    ) -> Self {
        Self {
            name: name.into(),
            relation_id,
            attribute_id,
            kind: IndexKind::BTree,
            created_at: Utc::now(),
        }
    }
}
