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

//! # autoindex - Workload-driven automatic index advisor
//!
//! autoindex sits in a database's scan path. Every full-relation scan that
//! evaluates a predicate is counted per (relation, attribute); once the count
//! crosses a cost-based threshold the advisor asks the catalog to build a
//! B-tree index on that attribute, on a background worker, exactly once.
//!
//! ## Key Features
//!
//! - **Durable counters** - CRC-framed counter log with snapshot compaction
//! - **Lock-light hot path** - per-key counter cells in a sharded map
//! - **Tunable cost model** - linear build-vs-scan threshold
//! - **Deduplicated builds** - at most one build per attribute in flight
//! - **Legacy import/export** - `attributeId relationId counter` snapshots
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use autoindex::{AutoIndexer, MemoryCatalog, ScanFilter};
//!
//! let catalog = Arc::new(MemoryCatalog::new());
//! catalog.add_relation(16384, [1, 2, 3], 10_000, 120);
//!
//! let advisor = AutoIndexer::open("memory://", catalog).unwrap();
//! let observation = advisor.observe_scan(&ScanFilter::new(16384, [2]));
//! assert!(!observation.triggered_build());
//! assert_eq!(advisor.frequency(16384, 2).unwrap(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Advisor facade ([`AutoIndexer`])
//! - [`core`] - Identifiers, records and [`Error`]
//! - [`storage`] - Frequency store, counter log and legacy snapshots
//! - [`optimizer`] - Build cost model ([`CostAdvisor`])
//! - [`executor`] - Build dispatch and workers
//! - [`catalog`] - Host catalog interface and an in-memory implementation
//! - [`common`] - Collections and version info

pub mod api;
pub mod catalog;
pub mod common;
pub mod core;
pub mod executor;
pub mod optimizer;
pub mod storage;

// Re-export main types for convenience
pub use core::{
    auto_index_name, AttributeId, Error, FrequencyEntry, FrequencyKey, IndexDescriptor, IndexKind,
    RelationId, RelationStats, Result,
};

// Re-export API types
pub use api::{AdvisorConfig, AutoIndexer, Observation, SkipReason};

// Re-export catalog types
pub use catalog::{Catalog, CreateIndexOutcome, LockMode, MemoryCatalog, RelationLock};

// Re-export storage types
pub use storage::{
    Config, CounterBackend, FileBackend, FrequencyStore, MemoryBackend, PersistenceConfig,
    StoreStats, SyncMode,
};

// Re-export optimizer types
pub use optimizer::{BuildCostEstimate, CostAdvisor, CostConstants};

// Re-export executor types
pub use executor::{
    BuildJob, BuildMode, BuildOutcome, BuildReport, BuildRequest, BuildWorker, DispatchConfig,
    DispatchStats, IndexDispatcher, RequestOutcome, ScanFilter, ThreadSpawner, WorkerSpawner,
};
