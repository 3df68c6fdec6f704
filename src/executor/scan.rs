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

//! Scan-node input to the advisor

use crate::core::{AttributeId, RelationId};

/// Predicate attributes of one full-relation scan
///
/// Supplied once per scan-node initialization, in the order the executor
/// evaluates the qualifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    pub relation_id: RelationId,
    pub attributes: Vec<AttributeId>,
}

impl ScanFilter {
    pub fn new(relation_id: RelationId, attributes: impl IntoIterator<Item = AttributeId>) -> Self {
        Self {
            relation_id,
            attributes: attributes.into_iter().collect(),
        }
    }

    /// Scan with no predicate
    pub fn unfiltered(relation_id: RelationId) -> Self {
        Self {
            relation_id,
            attributes: Vec::new(),
        }
    }

    /// The attribute the advisor counts for this scan.
    ///
    /// Only the first filtered attribute is considered. Later qualifiers of
    /// a multi-predicate scan are not counted and never get an index.
    pub fn primary_attribute(&self) -> Option<AttributeId> {
        self.attributes.first().copied()
    }

    pub fn has_predicate(&self) -> bool {
        !self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_attribute_is_first() {
        let filter = ScanFilter::new(10, [3, 1, 2]);
        assert_eq!(filter.primary_attribute(), Some(3));
        assert!(filter.has_predicate());
    }

    #[test]
    fn test_unfiltered_scan() {
        let filter = ScanFilter::unfiltered(10);
        assert_eq!(filter.primary_attribute(), None);
        assert!(!filter.has_predicate());
    }
}
