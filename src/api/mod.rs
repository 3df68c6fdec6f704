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

//! Top-level advisor API
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use autoindex::{AutoIndexer, Observation, ScanFilter};
//!
//! // The host implements Catalog over its own system catalog
//! let advisor = AutoIndexer::open("file:///var/lib/db/advisor?sync=normal", catalog)?;
//!
//! // Called by the executor once per full-scan node initialization
//! match advisor.observe_scan(&ScanFilter::new(rel_oid, [attnum])) {
//!     Observation::Dispatched(outcome) => { /* build requested */ }
//!     _ => {}
//! }
//!
//! // On shutdown
//! advisor.close()?;
//! ```

pub mod advisor;

pub use advisor::{AdvisorConfig, AutoIndexer, Observation, SkipReason};
