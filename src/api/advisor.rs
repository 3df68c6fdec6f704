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

//! AutoIndexer - the advisor facade
//!
//! Wires the frequency store, cost advisor and dispatcher behind a single
//! hot-path call made by the executor at scan-node initialization.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::core::{AttributeId, Error, RelationId, Result};
use crate::executor::{
    BuildMode, DispatchConfig, IndexDispatcher, RequestOutcome, ScanFilter, ThreadSpawner,
    WorkerSpawner,
};
use crate::optimizer::{BuildCostEstimate, CostAdvisor, CostConstants};
use crate::storage::{Config, FrequencyStore, SyncMode};

/// DSN scheme constants
const MEMORY_SCHEME: &str = "memory";
const FILE_SCHEME: &str = "file";

/// Why an observation was dropped without a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The frequency store could not count the scan
    StoreUnavailable,
    /// Relation statistics could not be read
    StatsUnavailable,
    /// The catalog failed while checking for an existing index
    CatalogUnavailable,
    /// No background worker could be started
    SpawnFailed,
}

/// What one `observe_scan` call did
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The scan had no predicate to count
    NoPredicate,
    Skipped(SkipReason),
    /// Counted, but not yet worth an index
    BelowThreshold { frequency: u64, threshold: f64 },
    /// The threshold was crossed and a build was requested
    Dispatched(RequestOutcome),
}

impl Observation {
    /// True if this call started or performed a build
    pub fn triggered_build(&self) -> bool {
        matches!(
            self,
            Observation::Dispatched(RequestOutcome::Started | RequestOutcome::Built(_))
        )
    }
}

/// Advisor configuration, usually parsed from a DSN
#[derive(Debug, Clone, Default)]
pub struct AdvisorConfig {
    pub store: Config,
    pub cost: CostConstants,
    pub dispatch: DispatchConfig,
}

impl AdvisorConfig {
    /// Memory-only store with default cost model and async builds
    pub fn in_memory() -> Self {
        Self {
            store: Config::in_memory(),
            cost: CostConstants::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Parse a DSN
    ///
    /// - `memory://` - counters are lost on close
    /// - `file:///path/to/dir` - durable store directory
    ///
    /// Both accept query parameters (`?key=value&...`): `sync`,
    /// `sync_batch`, `compact_after`, `compact_on_close`, `divisor`,
    /// `cpu_tuple_cost`, `cpu_index_tuple_cost`, `mode` and `max_workers`.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let (scheme, rest) = parse_dsn(dsn)?;
        let (path, query) = match rest.find('?') {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
            None => (rest, None),
        };

        let mut config = match scheme.as_str() {
            MEMORY_SCHEME => Self::in_memory(),
            _ => {
                if path.is_empty() {
                    return Err(Error::parse("file:// scheme requires a non-empty path"));
                }
                Self {
                    store: Config::with_path(path),
                    ..Self::in_memory()
                }
            }
        };

        if let Some(query) = query {
            config.apply_query(query);
        }
        Ok(config)
    }

    fn apply_query(&mut self, query: &str) {
        for param in query.split('&').filter(|p| !p.is_empty()) {
            let mut parts = param.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");

            match key {
                // Sync mode: sync=none|normal|full
                "sync" | "sync_mode" => {
                    self.store.persistence.sync_mode = SyncMode::parse_lossy(value);
                }
                // Records between fsyncs in normal mode: sync_batch=64
                "sync_batch" => {
                    if let Ok(records) = value.parse::<u32>() {
                        self.store.persistence.sync_batch = records.max(1);
                    }
                }
                // Log records before compaction: compact_after=65536 (0 disables)
                "compact_after" => {
                    if let Ok(records) = value.parse::<u64>() {
                        self.store.persistence.compact_after_records = records;
                    }
                }
                // Compact on close: compact_on_close=true|false
                "compact_on_close" => {
                    if let Ok(enabled) = value.parse::<bool>() {
                        self.store.persistence.compact_on_close = enabled;
                    }
                }
                // Build threshold divisor: divisor=3
                "divisor" => {
                    if let Ok(divisor) = value.parse::<f64>() {
                        self.cost.build_cost_divisor = divisor;
                    }
                }
                "cpu_tuple_cost" => {
                    if let Ok(cost) = value.parse::<f64>() {
                        self.cost.cpu_tuple_cost = cost;
                    }
                }
                "cpu_index_tuple_cost" => {
                    if let Ok(cost) = value.parse::<f64>() {
                        self.cost.cpu_index_tuple_cost = cost;
                    }
                }
                // Build mode: mode=async|sync
                "mode" => {
                    self.dispatch.mode = BuildMode::parse_lossy(value);
                }
                // Concurrent build workers: max_workers=8
                "max_workers" => {
                    if let Ok(workers) = value.parse::<usize>() {
                        self.dispatch.max_workers = workers;
                    }
                }
                _ => {
                    tracing::debug!(key, "ignoring unknown DSN parameter");
                }
            }
        }
    }
}

/// Split a DSN into its lower-cased scheme and the remainder
fn parse_dsn(dsn: &str) -> Result<(String, &str)> {
    let idx = dsn
        .find("://")
        .ok_or_else(|| Error::parse("Invalid DSN format: expected scheme://path"))?;

    let scheme = dsn[..idx].to_lowercase();
    match scheme.as_str() {
        MEMORY_SCHEME | FILE_SCHEME => Ok((scheme, &dsn[idx + 3..])),
        _ => Err(Error::parse(format!(
            "Unsupported scheme '{}'. Use 'memory://' or 'file://path'",
            scheme
        ))),
    }
}

/// Workload-driven index advisor
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use autoindex::{AutoIndexer, MemoryCatalog, Observation, ScanFilter};
///
/// let catalog = Arc::new(MemoryCatalog::new());
/// catalog.add_relation(16384, [1, 2], 300, 3);
///
/// let advisor = AutoIndexer::open("memory://?mode=sync", catalog.clone()).unwrap();
/// let filter = ScanFilter::new(16384, [2]);
/// for _ in 0..100 {
///     assert!(matches!(advisor.observe_scan(&filter), Observation::BelowThreshold { .. }));
/// }
/// assert!(advisor.observe_scan(&filter).triggered_build());
/// assert!(catalog.index("auto_16384_2").is_some());
/// ```
pub struct AutoIndexer {
    store: FrequencyStore,
    advisor: CostAdvisor,
    dispatcher: IndexDispatcher,
    catalog: Arc<dyn Catalog>,
}

impl AutoIndexer {
    /// Open an advisor from a DSN, running builds on [`ThreadSpawner`]
    pub fn open(dsn: &str, catalog: Arc<dyn Catalog>) -> Result<Self> {
        let config = AdvisorConfig::from_dsn(dsn)?;
        let spawner = Arc::new(ThreadSpawner::new(config.dispatch.max_workers));
        Self::new(config, catalog, spawner)
    }

    /// Open an advisor from a DSN with a host-provided spawner
    pub fn open_with_spawner(
        dsn: &str,
        catalog: Arc<dyn Catalog>,
        spawner: Arc<dyn WorkerSpawner>,
    ) -> Result<Self> {
        Self::new(AdvisorConfig::from_dsn(dsn)?, catalog, spawner)
    }

    pub fn new(
        config: AdvisorConfig,
        catalog: Arc<dyn Catalog>,
        spawner: Arc<dyn WorkerSpawner>,
    ) -> Result<Self> {
        let store = FrequencyStore::open(&config.store)?;
        Ok(Self::with_store(store, &config, catalog, spawner))
    }

    /// Assemble an advisor around an already opened store
    pub fn with_store(
        store: FrequencyStore,
        config: &AdvisorConfig,
        catalog: Arc<dyn Catalog>,
        spawner: Arc<dyn WorkerSpawner>,
    ) -> Self {
        let dispatcher = IndexDispatcher::new(Arc::clone(&catalog), spawner, config.dispatch.mode);
        Self {
            store,
            advisor: CostAdvisor::with_constants(config.cost),
            dispatcher,
            catalog,
        }
    }

    /// Record one scan and build an index if it has become worthwhile.
    ///
    /// Never fails; every problem is logged and reported as a skip.
    pub fn observe_scan(&self, filter: &ScanFilter) -> Observation {
        match filter.primary_attribute() {
            Some(attribute_id) => self.observe(filter.relation_id, attribute_id),
            None => Observation::NoPredicate,
        }
    }

    /// `observe_scan` for a single filtered attribute
    pub fn observe(&self, relation_id: RelationId, attribute_id: AttributeId) -> Observation {
        let frequency = match self.store.record_and_get(relation_id, attribute_id) {
            Ok(frequency) => frequency,
            Err(err) => {
                tracing::warn!(
                    relation_id,
                    attribute_id,
                    error = %err,
                    "could not record scan frequency"
                );
                return Observation::Skipped(SkipReason::StoreUnavailable);
            }
        };

        let stats = match self.catalog.relation_stats(relation_id) {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(relation_id, error = %err, "could not read relation statistics");
                return Observation::Skipped(SkipReason::StatsUnavailable);
            }
        };

        let estimate = self.advisor.estimate(&stats, frequency);
        tracing::debug!(
            relation_id,
            attribute_id,
            frequency,
            rows = estimate.rows,
            threshold = estimate.threshold,
            should_build = estimate.should_build,
            "scan observed"
        );
        if !estimate.should_build {
            return Observation::BelowThreshold {
                frequency,
                threshold: estimate.threshold,
            };
        }

        match self.dispatcher.request_build(relation_id, attribute_id) {
            Ok(outcome) => Observation::Dispatched(outcome),
            Err(Error::SpawnFailed(message)) => {
                tracing::warn!(
                    relation_id,
                    attribute_id,
                    "could not register background worker: {}; consider increasing max_workers",
                    message
                );
                Observation::Skipped(SkipReason::SpawnFailed)
            }
            Err(err) => {
                tracing::warn!(
                    relation_id,
                    attribute_id,
                    error = %err,
                    "could not request index build"
                );
                Observation::Skipped(SkipReason::CatalogUnavailable)
            }
        }
    }

    /// Current frequency without counting a scan
    pub fn frequency(&self, relation_id: RelationId, attribute_id: AttributeId) -> Result<u64> {
        self.store.get(relation_id, attribute_id)
    }

    /// Cost estimate for the current frequency, without counting a scan
    pub fn explain(
        &self,
        relation_id: RelationId,
        attribute_id: AttributeId,
    ) -> Result<BuildCostEstimate> {
        let frequency = self.store.get(relation_id, attribute_id)?;
        let stats = self.catalog.relation_stats(relation_id)?;
        Ok(self.advisor.estimate(&stats, frequency))
    }

    pub fn store(&self) -> &FrequencyStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &IndexDispatcher {
        &self.dispatcher
    }

    pub fn advisor(&self) -> &CostAdvisor {
        &self.advisor
    }

    /// Compact the frequency store
    pub fn checkpoint(&self) -> Result<usize> {
        self.store.checkpoint()
    }

    /// Close the frequency store. Running builds are not cancelled.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}
