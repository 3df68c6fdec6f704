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

//! Build-or-not cost model
//!
//! Decides whether the accumulated scan frequency on an attribute justifies
//! paying for an index build. All costs are linear in the relation's row
//! estimate:
//!
//! - Sequential scan: `rows * cpu_tuple_cost`
//! - Index build: `rows` (one unit of work per row)
//! - Index scan: `rows * cpu_index_tuple_cost`
//!
//! ## Decision Rule
//!
//! Build once `frequency > index_build_cost / build_cost_divisor`. With the
//! default divisor of 3 a 300-row relation triggers on its 101st qualifying
//! scan.
//!
//! This is a tunable heuristic, not a cost-optimal break-even point: the scan
//! costs are reported for logging and `explain` but do not enter the rule.
//! The decision is irreversible, so the advisor errs toward building late.

use crate::core::RelationStats;

/// Cost constants for build decisions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostConstants {
    /// Cost to process one tuple during sequential scan
    pub cpu_tuple_cost: f64,

    /// Cost to process one index entry (cheaper than a tuple)
    pub cpu_index_tuple_cost: f64,

    /// Divides the build cost into the frequency threshold
    pub build_cost_divisor: f64,
}

impl Default for CostConstants {
    fn default() -> Self {
        DEFAULT_COST_CONSTANTS
    }
}

/// Default cost constants
pub const DEFAULT_COST_CONSTANTS: CostConstants = CostConstants {
    cpu_tuple_cost: 0.01,        // Cost per tuple in sequential scan
    cpu_index_tuple_cost: 0.005, // Cost per index entry
    build_cost_divisor: 3.0,     // Build once frequency exceeds rows / 3
};

impl CostConstants {
    pub fn with_cpu_tuple_cost(mut self, cost: f64) -> Self {
        self.cpu_tuple_cost = cost;
        self
    }

    pub fn with_cpu_index_tuple_cost(mut self, cost: f64) -> Self {
        self.cpu_index_tuple_cost = cost;
        self
    }

    pub fn with_build_cost_divisor(mut self, divisor: f64) -> Self {
        self.build_cost_divisor = divisor;
        self
    }

    /// Whether the divisor can produce a meaningful threshold
    pub fn has_usable_divisor(&self) -> bool {
        self.build_cost_divisor.is_finite() && self.build_cost_divisor > 0.0
    }
}

/// Costs behind one build decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildCostEstimate {
    pub rows: u64,
    pub frequency: u64,
    pub seq_scan_cost: f64,
    pub index_build_cost: f64,
    pub index_scan_cost: f64,
    /// Frequency that must be exceeded; infinite when building is disabled
    pub threshold: f64,
    pub should_build: bool,
}

impl BuildCostEstimate {
    /// Projected saving per scan once the index exists
    pub fn per_scan_saving(&self) -> f64 {
        self.seq_scan_cost - self.index_scan_cost
    }
}

/// Pure build decision function
#[derive(Debug, Clone, Default)]
pub struct CostAdvisor {
    constants: CostConstants,
}

impl CostAdvisor {
    /// Create an advisor with default constants
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an advisor with custom constants
    pub fn with_constants(constants: CostConstants) -> Self {
        Self { constants }
    }

    pub fn constants(&self) -> &CostConstants {
        &self.constants
    }

    /// Full estimate for `frequency` observed scans of a relation
    pub fn estimate(&self, stats: &RelationStats, frequency: u64) -> BuildCostEstimate {
        let rows = stats.row_estimate;
        let row_count = rows as f64;

        let seq_scan_cost = row_count * self.constants.cpu_tuple_cost;
        let index_build_cost = row_count;
        let index_scan_cost = row_count * self.constants.cpu_index_tuple_cost;

        let threshold = if self.constants.has_usable_divisor() {
            index_build_cost / self.constants.build_cost_divisor
        } else {
            f64::INFINITY
        };

        // An empty relation never benefits from an index
        let should_build = rows > 0 && (frequency as f64) > threshold;

        BuildCostEstimate {
            rows,
            frequency,
            seq_scan_cost,
            index_build_cost,
            index_scan_cost,
            threshold,
            should_build,
        }
    }

    /// Whether an index on the scanned attribute is worth building now
    #[inline]
    pub fn should_build(&self, stats: &RelationStats, frequency: u64) -> bool {
        self.estimate(stats, frequency).should_build
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(rows: u64) -> RelationStats {
        RelationStats::new(16384, rows, rows / 100 + 1)
    }

    #[test]
    fn test_default_constants() {
        let constants = CostConstants::default();
        assert_eq!(constants.cpu_tuple_cost, 0.01);
        assert_eq!(constants.cpu_index_tuple_cost, 0.005);
        assert_eq!(constants.build_cost_divisor, 3.0);
        assert!(constants.cpu_index_tuple_cost < constants.cpu_tuple_cost);
    }

    #[test]
    fn test_threshold_boundary() {
        let advisor = CostAdvisor::new();
        assert!(!advisor.should_build(&stats(300), 100));
        assert!(advisor.should_build(&stats(300), 101));
    }

    #[test]
    fn test_estimate_costs() {
        let estimate = CostAdvisor::new().estimate(&stats(1000), 10);
        assert_eq!(estimate.rows, 1000);
        assert!((estimate.seq_scan_cost - 10.0).abs() < 1e-9);
        assert!((estimate.index_build_cost - 1000.0).abs() < 1e-9);
        assert!((estimate.index_scan_cost - 5.0).abs() < 1e-9);
        assert!((estimate.threshold - 1000.0 / 3.0).abs() < 1e-9);
        assert!((estimate.per_scan_saving() - 5.0).abs() < 1e-9);
        assert!(!estimate.should_build);
    }

    #[test]
    fn test_empty_relation_never_builds() {
        let advisor = CostAdvisor::new();
        assert!(!advisor.should_build(&stats(0), 0));
        assert!(!advisor.should_build(&stats(0), u64::MAX));
    }

    #[test]
    fn test_zero_frequency_never_builds() {
        let advisor = CostAdvisor::new();
        assert!(!advisor.should_build(&stats(1), 0));
        assert!(!advisor.should_build(&stats(1_000_000), 0));
    }

    #[test]
    fn test_tiny_relation() {
        // threshold 1/3: the first observation already qualifies
        assert!(CostAdvisor::new().should_build(&stats(1), 1));
    }

    #[test]
    fn test_unusable_divisor_disables_building() {
        for divisor in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let advisor = CostAdvisor::with_constants(
                CostConstants::default().with_build_cost_divisor(divisor),
            );
            assert!(!advisor.should_build(&stats(300), u64::MAX));
        }
    }

    #[test]
    fn test_custom_divisor() {
        let advisor =
            CostAdvisor::with_constants(CostConstants::default().with_build_cost_divisor(10.0));
        assert!(!advisor.should_build(&stats(300), 30));
        assert!(advisor.should_build(&stats(300), 31));
    }

    #[test]
    fn test_decision_is_deterministic() {
        let advisor = CostAdvisor::new();
        let first = advisor.estimate(&stats(12345), 4116);
        for _ in 0..10 {
            assert_eq!(advisor.estimate(&stats(12345), 4116), first);
        }
    }
}
