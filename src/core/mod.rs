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

//! Core types and definitions
//!
//! - [`FrequencyKey`] / [`FrequencyEntry`] - Counter identity and value
//! - [`RelationStats`] - Catalog statistics snapshot
//! - [`IndexDescriptor`] - An index registered in the catalog
//! - [`Error`] - Error types for all advisor operations

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    auto_index_name, AttributeId, FrequencyEntry, FrequencyKey, IndexDescriptor, IndexKind,
    RelationId, RelationStats, AUTO_INDEX_PREFIX,
};
