//! Cross-dialect equivalence
//!
//! Runs the same corpus against two dialects and reports every
//! expression whose decoded results differ under type-aware equality
//! (floats within 1e-9). The translator promises identical semantics
//! across dialects; this is the harness that holds it to that.

use crate::corpus::TestCase;
use crate::runner::{ComplianceRunner, RunnerConfig};
use crate::validate::FLOAT_TOLERANCE;
use basalt_dialect::Dialect;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// One expression whose dialects disagree.
#[derive(Debug, Clone, Serialize)]
pub struct Disagreement {
    pub name: String,
    pub expression: String,
    pub first: String,
    pub second: String,
}

/// Cross-dialect comparison result.
#[derive(Debug, Clone, Serialize)]
pub struct CrossDialectReport {
    pub first_dialect: String,
    pub second_dialect: String,
    pub compared: usize,
    pub agreeing: usize,
    pub disagreements: Vec<Disagreement>,
}

impl CrossDialectReport {
    pub fn agreement_percentage(&self) -> f64 {
        if self.compared == 0 {
            100.0
        } else {
            self.agreeing as f64 * 100.0 / self.compared as f64
        }
    }
}

/// Values equal under the cross-dialect relation: numerics within
/// tolerance, arrays element-wise, everything else exactly.
pub fn equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() <= FLOAT_TOLERANCE,
            _ => x == y,
        },
        // A numeric string on one side (text projection) matches a
        // number on the other.
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            match (s.trim().parse::<f64>(), n.as_f64()) {
                (Ok(x), Some(y)) => (x - y).abs() <= FLOAT_TOLERANCE,
                _ => false,
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equivalent(x, y))
        }
        _ => a == b,
    }
}

/// Execute each case on both dialects and compare decoded results. Cases
/// expected to fail are skipped: failure parity is covered by the
/// per-dialect compliance runs.
pub fn compare_dialects(
    cases: &[TestCase],
    first: &dyn Dialect,
    second: &dyn Dialect,
    config: RunnerConfig,
) -> CrossDialectReport {
    let mut first_runner = ComplianceRunner::new(first, config.clone());
    let mut second_runner = ComplianceRunner::new(second, config);

    let mut compared = 0;
    let mut agreeing = 0;
    let mut disagreements = Vec::new();

    for case in cases.iter().filter(|c| c.invalid.is_none()) {
        let first_record = first_runner.run_case(case);
        let second_record = second_runner.run_case(case);
        compared += 1;

        if first_record.passed == second_record.passed {
            agreeing += 1;
        } else {
            disagreements.push(Disagreement {
                name: case.name.clone(),
                expression: case.expression.clone(),
                first: first_record
                    .failure
                    .unwrap_or_else(|| "passed".to_string()),
                second: second_record
                    .failure
                    .unwrap_or_else(|| "passed".to_string()),
            });
        }
    }

    info!(
        compared,
        agreeing,
        disagreements = disagreements.len(),
        "cross-dialect comparison finished"
    );

    CrossDialectReport {
        first_dialect: first.kind().as_str().to_string(),
        second_dialect: second.kind().as_str().to_string(),
        compared,
        agreeing,
        disagreements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_with_tolerance() {
        assert!(equivalent(&json!(0.3), &json!(0.30000000000000004)));
        assert!(!equivalent(&json!(0.3), &json!(0.31)));
    }

    #[test]
    fn numeric_strings_match_numbers() {
        assert!(equivalent(&json!("2"), &json!(2)));
        assert!(!equivalent(&json!("x"), &json!(2)));
    }

    #[test]
    fn arrays_compare_elementwise() {
        assert!(equivalent(&json!([1, 2]), &json!([1.0, 2.0])));
        assert!(!equivalent(&json!([1, 2]), &json!([2, 1])));
        assert!(!equivalent(&json!([1]), &json!([1, 1])));
    }
}
