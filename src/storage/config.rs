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

//! Frequency store configuration
//!

/// Counter log sync mode for controlling durability vs performance tradeoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fastest but least durable - records are buffered in process and
    /// handed to the OS every `sync_batch` records (or `flush_trigger`
    /// bytes). A process crash loses the increments still in the buffer,
    /// so recovery may report less than was acknowledged.
    None = 0,
    /// Every record reaches the OS before the increment is published;
    /// fsync every `sync_batch` records
    #[default]
    Normal = 1,
    /// Forces an fsync on every record - slowest but most durable
    Full = 2,
}

impl From<i32> for SyncMode {
    fn from(value: i32) -> Self {
        match value {
            0 => SyncMode::None,
            2 => SyncMode::Full,
            _ => SyncMode::Normal,
        }
    }
}

impl From<SyncMode> for i32 {
    fn from(mode: SyncMode) -> Self {
        mode as i32
    }
}

impl SyncMode {
    /// Parse a DSN/CLI value, falling back to Normal for unknown input
    pub fn parse_lossy(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "none" | "off" | "0" => SyncMode::None,
            "full" | "2" => SyncMode::Full,
            _ => SyncMode::Normal,
        }
    }
}

/// Configuration options for the persistence layer
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Whether persistence is enabled
    /// Default: true if path is set
    pub enabled: bool,

    /// Counter log sync strategy
    /// Default: Normal
    pub sync_mode: SyncMode,

    /// Buffered bytes that trigger a write in SyncMode::None
    /// Default: 16384 (16KB)
    pub flush_trigger: usize,

    /// Records between fsyncs in SyncMode::Normal, and between writes to
    /// the OS in SyncMode::None
    /// Default: 64
    pub sync_batch: u32,

    /// Log records after which the store compacts into the snapshot file
    /// Default: 65536
    pub compact_after_records: u64,

    /// Compact into the snapshot file when the store is closed
    /// Default: true
    pub compact_on_close: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sync_mode: SyncMode::Normal,
            flush_trigger: 16 * 1024,     // 16KB
            sync_batch: 64,               // fsync every 64 records
            compact_after_records: 65536, // ~2.5MB of log
            compact_on_close: true,
        }
    }
}

impl PersistenceConfig {
    /// Creates a new PersistenceConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a PersistenceConfig optimized for maximum durability
    pub fn durable() -> Self {
        Self {
            enabled: true,
            sync_mode: SyncMode::Full,
            flush_trigger: 0,
            sync_batch: 1,
            compact_after_records: 16384,
            compact_on_close: true,
        }
    }

    /// Creates a PersistenceConfig optimized for maximum performance
    ///
    /// Uses [`SyncMode::None`]: a crash can lose up to `sync_batch`
    /// acknowledged increments.
    pub fn fast() -> Self {
        Self {
            enabled: true,
            sync_mode: SyncMode::None,
            flush_trigger: 64 * 1024, // 64KB
            sync_batch: 1024,
            compact_after_records: 262144,
            compact_on_close: true,
        }
    }

    /// Builder method to set sync mode
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Builder method to set the fsync batch size
    pub fn with_sync_batch(mut self, records: u32) -> Self {
        self.sync_batch = records.max(1);
        self
    }

    /// Builder method to set the compaction threshold
    pub fn with_compact_after(mut self, records: u64) -> Self {
        self.compact_after_records = records;
        self
    }

    /// Builder method to enable/disable compaction on close
    pub fn with_compact_on_close(mut self, enabled: bool) -> Self {
        self.compact_on_close = enabled;
        self
    }
}

/// Configuration for the frequency store
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Path to the store directory
    /// If empty, the store operates in memory-only mode
    pub path: Option<String>,

    /// Configuration options for disk persistence
    /// Only used if path is Some
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Creates a new in-memory configuration (no persistence)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            persistence: PersistenceConfig {
                enabled: false,
                ..Default::default()
            },
        }
    }

    /// Creates a new configuration with persistence at the given path
    pub fn with_path<P: Into<String>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            persistence: PersistenceConfig::default(),
        }
    }

    /// Returns true if persistence is enabled
    pub fn is_persistent(&self) -> bool {
        self.path.is_some() && self.persistence.enabled
    }

    /// Builder method to set persistence config
    pub fn with_persistence(mut self, config: PersistenceConfig) -> Self {
        self.persistence = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode_default() {
        assert_eq!(SyncMode::default(), SyncMode::Normal);
    }

    #[test]
    fn test_sync_mode_from_i32() {
        assert_eq!(SyncMode::from(0), SyncMode::None);
        assert_eq!(SyncMode::from(1), SyncMode::Normal);
        assert_eq!(SyncMode::from(2), SyncMode::Full);
        assert_eq!(SyncMode::from(99), SyncMode::Normal);
    }

    #[test]
    fn test_sync_mode_parse_lossy() {
        assert_eq!(SyncMode::parse_lossy("off"), SyncMode::None);
        assert_eq!(SyncMode::parse_lossy("FULL"), SyncMode::Full);
        assert_eq!(SyncMode::parse_lossy("normal"), SyncMode::Normal);
        assert_eq!(SyncMode::parse_lossy("bogus"), SyncMode::Normal);
    }

    #[test]
    fn test_persistence_config_default() {
        let config = PersistenceConfig::default();
        assert!(config.enabled);
        assert_eq!(config.sync_mode, SyncMode::Normal);
        assert_eq!(config.flush_trigger, 16 * 1024);
        assert_eq!(config.sync_batch, 64);
        assert_eq!(config.compact_after_records, 65536);
        assert!(config.compact_on_close);
    }

    #[test]
    fn test_persistence_config_presets() {
        let durable = PersistenceConfig::durable();
        assert_eq!(durable.sync_mode, SyncMode::Full);
        assert_eq!(durable.sync_batch, 1);

        let fast = PersistenceConfig::fast();
        assert_eq!(fast.sync_mode, SyncMode::None);
        assert_eq!(fast.flush_trigger, 64 * 1024);
    }

    #[test]
    fn test_persistence_config_builder() {
        let config = PersistenceConfig::new()
            .with_sync_mode(SyncMode::Full)
            .with_sync_batch(0)
            .with_compact_after(10)
            .with_compact_on_close(false);

        assert_eq!(config.sync_mode, SyncMode::Full);
        assert_eq!(config.sync_batch, 1); // clamped
        assert_eq!(config.compact_after_records, 10);
        assert!(!config.compact_on_close);
    }

    #[test]
    fn test_config_in_memory() {
        let config = Config::in_memory();
        assert!(config.path.is_none());
        assert!(!config.persistence.enabled);
        assert!(!config.is_persistent());
    }

    #[test]
    fn test_config_with_path() {
        let config = Config::with_path("/tmp/advisor");
        assert_eq!(config.path, Some("/tmp/advisor".to_string()));
        assert!(config.is_persistent());

        let config = config.with_persistence(PersistenceConfig::durable());
        assert_eq!(config.persistence.sync_mode, SyncMode::Full);
    }
}
