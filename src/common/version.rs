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

//! Version information for autoindex

/// Crate version in semver format (e.g., "0.1.0")
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash at build time
/// Set via AUTOINDEX_GIT_COMMIT environment variable during compilation
pub const GIT_COMMIT: &str = match option_env!("AUTOINDEX_GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

/// Returns the full version string
pub fn version() -> &'static str {
    VERSION
}

/// Returns version info as a formatted string
pub fn version_info() -> String {
    format!("autoindex {} (commit: {})", VERSION, GIT_COMMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_package() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_version_info() {
        let info = version_info();
        assert!(info.starts_with("autoindex "));
        assert!(info.contains(VERSION));
        assert!(!GIT_COMMIT.is_empty());
    }
}
