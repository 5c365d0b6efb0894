//! Compliance report
//!
//! Serialisable totals, per-category breakdown, latency percentiles, and
//! the ten most instructive failures.

use crate::classify::FailureCategory;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-test timing, milliseconds per phase.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PhaseTimings {
    pub parse_ms: f64,
    pub translate_ms: f64,
    pub execute_ms: f64,
}

impl PhaseTimings {
    pub fn total_ms(&self) -> f64 {
        self.parse_ms + self.translate_ms + self.execute_ms
    }
}

/// One test's recorded result.
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub group: String,
    pub name: String,
    pub expression: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    pub timings: PhaseTimings,
}

/// Latency percentiles over total per-test time.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Percentiles {
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (fraction * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Per-category pass/fail counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CategoryCount {
    pub failed: usize,
}

/// A condensed failure example for the report tail.
#[derive(Debug, Clone, Serialize)]
pub struct FailureExample {
    pub name: String,
    pub expression: String,
    pub reason: String,
    pub category: FailureCategory,
}

/// The full compliance report.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub dialect: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub compliance_percentage: f64,
    pub categories: BTreeMap<String, CategoryCount>,
    pub performance: Percentiles,
    pub top_failures: Vec<FailureExample>,
    pub total_time_ms: f64,
}

impl ComplianceReport {
    /// Aggregate individual records into the report.
    pub fn from_records(dialect: &str, records: &[TestRecord]) -> Self {
        let total = records.len();
        let passed = records.iter().filter(|r| r.passed).count();
        let failed = total - passed;

        let mut categories: BTreeMap<String, CategoryCount> = BTreeMap::new();
        for record in records.iter().filter(|r| !r.passed) {
            let key = record
                .category
                .map(|c| c.as_str())
                .unwrap_or("uncategorized")
                .to_string();
            categories.entry(key).or_default().failed += 1;
        }

        let mut times: Vec<f64> = records.iter().map(|r| r.timings.total_ms()).collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let performance = Percentiles {
            p50_ms: percentile(&times, 0.50),
            p90_ms: percentile(&times, 0.90),
            p99_ms: percentile(&times, 0.99),
        };

        let top_failures = records
            .iter()
            .filter(|r| !r.passed)
            .take(10)
            .map(|r| FailureExample {
                name: r.name.clone(),
                expression: r.expression.clone(),
                reason: r.failure.clone().unwrap_or_default(),
                category: r.category.unwrap_or(FailureCategory::Uncategorized),
            })
            .collect();

        ComplianceReport {
            dialect: dialect.to_string(),
            total,
            passed,
            failed,
            compliance_percentage: if total == 0 {
                0.0
            } else {
                passed as f64 * 100.0 / total as f64
            },
            categories,
            performance,
            top_failures,
            total_time_ms: times.iter().sum(),
        }
    }

    /// Human-oriented one-screen summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} compliance: {}/{} passed ({:.1}%)\n",
            self.dialect, self.passed, self.total, self.compliance_percentage
        );
        out.push_str(&format!(
            "latency p50 {:.1}ms / p90 {:.1}ms / p99 {:.1}ms\n",
            self.performance.p50_ms, self.performance.p90_ms, self.performance.p99_ms
        ));
        for (category, count) in &self.categories {
            out.push_str(&format!("  {}: {} failed\n", category, count.failed));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FailureCategory;

    fn record(name: &str, passed: bool, category: Option<FailureCategory>) -> TestRecord {
        TestRecord {
            group: "g".into(),
            name: name.into(),
            expression: "1 + 1".into(),
            passed,
            failure: (!passed).then(|| "reason".to_string()),
            category,
            timings: PhaseTimings {
                parse_ms: 0.1,
                translate_ms: 0.2,
                execute_ms: 0.7,
            },
        }
    }

    #[test]
    fn aggregates_counts_and_percentage() {
        let records = vec![
            record("a", true, None),
            record("b", true, None),
            record("c", false, Some(FailureCategory::ResultLogic)),
            record("d", false, Some(FailureCategory::ResultLogic)),
        ];
        let report = ComplianceReport::from_records("duckdb", &records);
        assert_eq!(report.total, 4);
        assert_eq!(report.passed, 2);
        assert!((report.compliance_percentage - 50.0).abs() < f64::EPSILON);
        assert_eq!(report.categories["result_logic"].failed, 2);
        assert_eq!(report.top_failures.len(), 2);
    }

    #[test]
    fn report_serialises_to_json() {
        let report = ComplianceReport::from_records("duckdb", &[record("a", true, None)]);
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("\"compliance_percentage\""));
        assert!(json.contains("\"p50_ms\""));
    }

    #[test]
    fn percentiles_of_empty_set_are_zero() {
        let report = ComplianceReport::from_records("duckdb", &[]);
        assert_eq!(report.performance.p50_ms, 0.0);
        assert_eq!(report.compliance_percentage, 0.0);
    }
}
