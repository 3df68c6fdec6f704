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

//! Build decision tests

use autoindex::{AdvisorConfig, CostAdvisor, CostConstants, RelationStats};

fn stats(rows: u64) -> RelationStats {
    RelationStats::new(16384, rows, rows / 100 + 1)
}

#[test]
fn test_threshold_boundary() {
    let advisor = CostAdvisor::new();

    // rows / 3 must be strictly exceeded
    assert!(!advisor.should_build(&stats(300), 99));
    assert!(!advisor.should_build(&stats(300), 100));
    assert!(advisor.should_build(&stats(300), 101));

    assert!(!advisor.should_build(&stats(3_000_000), 1_000_000));
    assert!(advisor.should_build(&stats(3_000_000), 1_000_001));
}

#[test]
fn test_threshold_grows_with_rows() {
    let advisor = CostAdvisor::new();
    let frequency = 500;

    assert!(advisor.should_build(&stats(1_000), frequency));
    assert!(advisor.should_build(&stats(1_499), frequency));
    assert!(!advisor.should_build(&stats(1_500), frequency));
    assert!(!advisor.should_build(&stats(10_000), frequency));
}

#[test]
fn test_small_relations() {
    let advisor = CostAdvisor::new();

    // One row: threshold is 1/3, so the first scan already qualifies
    assert!(advisor.should_build(&stats(1), 1));
    assert!(!advisor.should_build(&stats(1), 0));

    // No rows: never
    assert!(!advisor.should_build(&stats(0), 0));
    assert!(!advisor.should_build(&stats(0), u64::MAX));
}

#[test]
fn test_estimate_components() {
    let estimate = CostAdvisor::new().estimate(&stats(1_000), 10);

    assert_eq!(estimate.rows, 1_000);
    assert_eq!(estimate.frequency, 10);
    assert!((estimate.seq_scan_cost - 10.0).abs() < 1e-9);
    assert!((estimate.index_scan_cost - 5.0).abs() < 1e-9);
    assert!((estimate.index_build_cost - 1_000.0).abs() < 1e-9);
    assert!((estimate.threshold - 1_000.0 / 3.0).abs() < 1e-9);
    assert!((estimate.per_scan_saving() - 5.0).abs() < 1e-9);
    assert!(!estimate.should_build);
}

#[test]
fn test_custom_divisor() {
    let advisor =
        CostAdvisor::with_constants(CostConstants::default().with_build_cost_divisor(10.0));

    assert!(!advisor.should_build(&stats(300), 30));
    assert!(advisor.should_build(&stats(300), 31));
}

#[test]
fn test_unusable_divisor_disables_building() {
    for divisor in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let advisor =
            CostAdvisor::with_constants(CostConstants::default().with_build_cost_divisor(divisor));
        let estimate = advisor.estimate(&stats(300), u64::MAX);
        assert!(estimate.threshold.is_infinite());
        assert!(!estimate.should_build, "divisor {} must never build", divisor);
    }
}

#[test]
fn test_dsn_constants_reach_advisor() {
    let config = AdvisorConfig::from_dsn("memory://?divisor=6&cpu_tuple_cost=0.02").unwrap();
    let advisor = CostAdvisor::with_constants(config.cost);

    assert_eq!(advisor.constants().build_cost_divisor, 6.0);
    assert!(!advisor.should_build(&stats(300), 50));
    assert!(advisor.should_build(&stats(300), 51));
    assert!((advisor.estimate(&stats(300), 0).seq_scan_cost - 6.0).abs() < 1e-9);
}
