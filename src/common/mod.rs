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

//! Shared utilities
//!
//! - [`maps`] - Hash collections keyed by (relation, attribute)
//! - [`version`] - Version information and constants

pub mod maps;
pub mod version;

pub use maps::{new_concurrent_key_map, ConcurrentKeyMap, FxBuildHasher, KeyMap, KeySet};
pub use version::{version, version_info, GIT_COMMIT, VERSION};
