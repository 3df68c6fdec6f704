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

//! Storage layer for the advisor
//!
//! This module contains the persistence components:
//! - Frequency store (concurrent counters with durable backing)
//! - Counter backends (file-backed and in-memory)
//! - Counter log (CRC-framed append-only records)
//! - Legacy flat-file snapshot format
//! - Store directory locking
//! - Configuration types

pub mod backend;
pub mod config;
pub mod counter_log;
pub mod file_lock;
pub mod frequency;
pub mod legacy;

// Re-export config types
pub use config::{Config, PersistenceConfig, SyncMode};

// Re-export backend types
pub use backend::{CounterBackend, FileBackend, MemoryBackend};

// Re-export store types
pub use frequency::{FrequencyStore, StoreStats, COMPACTOR_THREAD_NAME};

// Re-export persistence building blocks
pub use counter_log::{CounterLog, CounterRecord, ReplayInfo, COUNTER_LOG_FILE, SEALED_SUFFIX};
pub use file_lock::{StoreLock, LOCK_FILE_NAME};
pub use legacy::SNAPSHOT_FILE;
