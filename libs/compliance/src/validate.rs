//! Result validation
//!
//! Compares decoded SQL results against a test's expected outputs,
//! honouring expected-failure markers and predicate truthiness. Equality
//! is type-aware: booleans by canonical form, numerics with a float
//! tolerance, temporals with the expected value's leading `@` stripped,
//! everything else textually.

use crate::corpus::{ExpectedOutput, InvalidKind, TestCase};
use serde_json::Value;

/// Float comparison tolerance (shared with cross-dialect comparison).
pub const FLOAT_TOLERANCE: f64 = 1e-9;

/// What actually happened when a test ran.
#[derive(Debug, Clone)]
pub enum Outcome {
    ParseFailed(String),
    TranslateFailed(String),
    ExecuteFailed(String),
    /// Decoded result collection (nulls already filtered).
    Rows(Vec<Value>),
}

/// Validation verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Fail(String),
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Validate one outcome against its test case.
pub fn validate(case: &TestCase, outcome: &Outcome) -> Verdict {
    // Expected-failure tests invert the polarity.
    if let Some(invalid) = case.invalid {
        return match (invalid, outcome) {
            // Parser rejections satisfy both syntax and semantic
            // expectations; semantic also accepts translation failures.
            (InvalidKind::Syntax, Outcome::ParseFailed(_))
            | (InvalidKind::Semantic, Outcome::ParseFailed(_))
            | (InvalidKind::Semantic, Outcome::TranslateFailed(_))
            | (InvalidKind::Execution, Outcome::ExecuteFailed(_)) => Verdict::Pass,
            // An execution expectation is also satisfied by a semantic
            // rejection upstream of the database.
            (InvalidKind::Execution, Outcome::TranslateFailed(_)) => Verdict::Pass,
            _ => Verdict::Fail(format!(
                "expected failure ({:?}) did not occur",
                invalid
            )),
        };
    }

    let rows = match outcome {
        Outcome::ParseFailed(message) => {
            return Verdict::Fail(format!("parse failed: {}", message))
        }
        Outcome::TranslateFailed(message) => {
            return Verdict::Fail(format!("translate failed: {}", message))
        }
        Outcome::ExecuteFailed(message) => {
            return Verdict::Fail(format!("execute failed: {}", message))
        }
        Outcome::Rows(rows) => rows,
    };

    if case.predicate {
        return validate_predicate(case, rows);
    }

    if case.expected.is_empty() {
        return if rows.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail(format!("expected empty result, got {} items", rows.len()))
        };
    }

    if rows.len() != case.expected.len() {
        return Verdict::Fail(format!(
            "count mismatch: expected {} item(s), got {}",
            case.expected.len(),
            rows.len()
        ));
    }

    for (index, (actual, expected)) in rows.iter().zip(case.expected.iter()).enumerate() {
        if !values_match(actual, expected) {
            return Verdict::Fail(format!(
                "value mismatch at position {}: expected {:?} ({}), got {}",
                index, expected.value, expected.type_name, actual
            ));
        }
    }
    Verdict::Pass
}

/// Predicate tests coerce the result to a boolean: a non-empty collection
/// is true, an empty one false, a lone boolean is itself.
fn validate_predicate(case: &TestCase, rows: &[Value]) -> Verdict {
    let actual = match rows {
        [] => false,
        [Value::Bool(b)] => *b,
        _ => true,
    };
    let expected = case
        .expected
        .first()
        .and_then(|e| e.value.as_deref())
        .map(|v| v == "true")
        .unwrap_or(true);
    if actual == expected {
        Verdict::Pass
    } else {
        Verdict::Fail(format!(
            "predicate mismatch: expected {}, got {}",
            expected, actual
        ))
    }
}

/// Type-aware scalar comparison.
pub fn values_match(actual: &Value, expected: &ExpectedOutput) -> bool {
    let Some(expected_text) = expected.value.as_deref() else {
        return actual.is_null();
    };

    match expected.type_name.as_str() {
        "boolean" => match actual {
            Value::Bool(b) => (*b && expected_text == "true") || (!*b && expected_text == "false"),
            Value::String(s) => s == expected_text,
            _ => false,
        },
        "integer" | "decimal" | "quantity" => {
            let actual_number = match actual {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            let expected_number = expected_text
                .split_whitespace()
                .next()
                .and_then(|t| t.parse::<f64>().ok());
            match (actual_number, expected_number) {
                (Some(a), Some(e)) => (a - e).abs() <= FLOAT_TOLERANCE,
                _ => false,
            }
        }
        "date" | "dateTime" | "time" => {
            let expected_clean = expected_text.trim_start_matches('@');
            match actual {
                Value::String(s) => {
                    let actual_clean = s.trim_start_matches('@').replace(' ', "T");
                    let expected_clean = expected_clean.replace(' ', "T");
                    actual_clean == expected_clean
                        || actual_clean.starts_with(&format!("{}T", expected_clean))
                        || expected_clean.starts_with(&format!("{}T", actual_clean))
                }
                _ => false,
            }
        }
        _ => match actual {
            Value::String(s) => s == expected_text,
            other => other.to_string() == expected_text,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(expected: Vec<(&str, Option<&str>)>) -> TestCase {
        TestCase {
            group: "g".into(),
            name: "t".into(),
            expression: "x".into(),
            input_file: None,
            invalid: None,
            predicate: false,
            expected: expected
                .into_iter()
                .map(|(ty, v)| ExpectedOutput {
                    type_name: ty.into(),
                    value: v.map(str::to_string),
                })
                .collect(),
        }
    }

    #[test]
    fn invalid_syntax_passes_on_parse_failure() {
        let mut c = case(vec![]);
        c.invalid = Some(InvalidKind::Syntax);
        assert!(validate(&c, &Outcome::ParseFailed("boom".into())).passed());
        assert!(!validate(&c, &Outcome::Rows(vec![])).passed());
    }

    #[test]
    fn invalid_semantic_accepts_parser_or_translator_failure() {
        let mut c = case(vec![]);
        c.invalid = Some(InvalidKind::Semantic);
        assert!(validate(&c, &Outcome::ParseFailed("boom".into())).passed());
        assert!(validate(&c, &Outcome::TranslateFailed("boom".into())).passed());
        assert!(!validate(&c, &Outcome::ExecuteFailed("boom".into())).passed());
    }

    #[test]
    fn invalid_execution_requires_engine_failure() {
        let mut c = case(vec![]);
        c.invalid = Some(InvalidKind::Execution);
        assert!(validate(&c, &Outcome::ExecuteFailed("division by zero".into())).passed());
        assert!(!validate(&c, &Outcome::Rows(vec![json!(1)])).passed());
    }

    #[test]
    fn empty_expectation() {
        let c = case(vec![]);
        assert!(validate(&c, &Outcome::Rows(vec![])).passed());
        assert!(!validate(&c, &Outcome::Rows(vec![json!(1)])).passed());
    }

    #[test]
    fn boolean_comparison_uses_canonical_form() {
        let c = case(vec![("boolean", Some("true"))]);
        assert!(validate(&c, &Outcome::Rows(vec![json!(true)])).passed());
        assert!(!validate(&c, &Outcome::Rows(vec![json!(false)])).passed());
    }

    #[test]
    fn numeric_comparison_has_tolerance() {
        let c = case(vec![("decimal", Some("0.3"))]);
        assert!(validate(&c, &Outcome::Rows(vec![json!(0.30000000000000004)])).passed());
        let c = case(vec![("integer", Some("2"))]);
        assert!(validate(&c, &Outcome::Rows(vec![json!("2")])).passed());
    }

    #[test]
    fn dates_strip_the_at_prefix() {
        let c = case(vec![("date", Some("@1970-01-01"))]);
        assert!(validate(&c, &Outcome::Rows(vec![json!("1970-01-01")])).passed());
        let c = case(vec![("dateTime", Some("@2015-02-04T14:34:28"))]);
        assert!(validate(&c, &Outcome::Rows(vec![json!("2015-02-04 14:34:28")])).passed());
    }

    #[test]
    fn collections_match_positionally() {
        let c = case(vec![("string", Some("John")), ("string", Some("Q"))]);
        assert!(validate(&c, &Outcome::Rows(vec![json!("John"), json!("Q")])).passed());
        assert!(!validate(&c, &Outcome::Rows(vec![json!("Q"), json!("John")])).passed());
    }

    #[test]
    fn predicate_truthiness() {
        let mut c = case(vec![("boolean", Some("true"))]);
        c.predicate = true;
        assert!(validate(&c, &Outcome::Rows(vec![json!("anything")])).passed());
        assert!(!validate(&c, &Outcome::Rows(vec![])).passed());
        assert!(validate(&c, &Outcome::Rows(vec![json!(true)])).passed());
        assert!(!validate(&c, &Outcome::Rows(vec![json!(false)])).passed());
    }
}
