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

//! Build execution for the advisor
//!
//! This module turns build decisions into catalog indexes:
//!
//! - [`ScanFilter`]: what the executor tells the advisor about a scan
//! - [`IndexDispatcher`]: deduplicates requests and hands them to workers
//! - [`BuildWorker`]: performs one build under a share lock
//! - [`WorkerSpawner`]: where workers run ([`ThreadSpawner`] by default)

pub mod dispatcher;
pub mod scan;
pub mod worker;

pub use dispatcher::{BuildMode, DispatchConfig, DispatchStats, IndexDispatcher, RequestOutcome};
pub use scan::ScanFilter;
pub use worker::{
    BuildJob, BuildOutcome, BuildReport, BuildRequest, BuildWorker, ThreadSpawner, WorkerSpawner,
    BUILD_WORKER_NAME, DEFAULT_MAX_WORKERS,
};
