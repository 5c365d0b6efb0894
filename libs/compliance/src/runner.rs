//! Per-test execution
//!
//! For each test: load the fixture (XML → JSON with cardinality rules),
//! parse, translate, execute against an ephemeral single-row
//! `resource(id, resource)` table, decode the JSON text result, and
//! validate against the expectations. Execution errors are caught here —
//! and only here — for classification.

use crate::classify::{classify, FailureCategory, FailureStage};
use crate::corpus::TestCase;
use crate::error::ComplianceError;
use crate::report::{ComplianceReport, PhaseTimings, TestRecord};
use crate::validate::{validate, Outcome, Verdict};
use basalt_dialect::Dialect;
use basalt_fhirpath::FhirPathParser;
use basalt_format::XmlConverter;
use basalt_translator::translate_expression;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runner configuration.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Directory holding the XML fixtures named by `inputfile`.
    pub fixtures_dir: Option<PathBuf>,
}

/// The compliance runner: owns a parser, a converter, and a fixture
/// cache; borrows the dialect.
pub struct ComplianceRunner<'a> {
    dialect: &'a dyn Dialect,
    parser: FhirPathParser,
    converter: XmlConverter,
    config: RunnerConfig,
    fixture_cache: HashMap<String, Value>,
}

impl<'a> ComplianceRunner<'a> {
    pub fn new(dialect: &'a dyn Dialect, config: RunnerConfig) -> Self {
        Self {
            dialect,
            parser: FhirPathParser::new(),
            converter: XmlConverter::default(),
            config,
            fixture_cache: HashMap::new(),
        }
    }

    /// Run the whole suite and aggregate the report.
    pub fn run_suite(&mut self, cases: &[TestCase]) -> ComplianceReport {
        let mut records = Vec::with_capacity(cases.len());
        for (index, case) in cases.iter().enumerate() {
            if index % 100 == 0 {
                info!(done = index, total = cases.len(), "compliance progress");
            }
            records.push(self.run_case(case));
        }
        ComplianceReport::from_records(self.dialect.kind().as_str(), &records)
    }

    /// Run one test case.
    pub fn run_case(&mut self, case: &TestCase) -> TestRecord {
        let mut timings = PhaseTimings::default();
        let context = self.load_context(case.input_file.as_deref());
        let (outcome, stage) = self.execute_case(case, &context, &mut timings);
        let verdict = validate(case, &outcome);

        let (passed, failure, category) = match verdict {
            Verdict::Pass => (true, None, None),
            Verdict::Fail(reason) => {
                debug!(test = %case.name, %reason, "compliance failure");
                let stage = stage.unwrap_or(FailureStage::Validate);
                let category = classify(stage, &reason);
                (false, Some(reason), Some(category))
            }
        };

        TestRecord {
            group: case.group.clone(),
            name: case.name.clone(),
            expression: case.expression.clone(),
            passed,
            failure,
            category: category.or(if passed { None } else { Some(FailureCategory::Uncategorized) }),
            timings,
        }
    }

    fn execute_case(
        &mut self,
        case: &TestCase,
        context: &Value,
        timings: &mut PhaseTimings,
    ) -> (Outcome, Option<FailureStage>) {
        let started = Instant::now();
        let parsed = match self.parser.parse(&case.expression) {
            Ok(parsed) => parsed,
            Err(e) => {
                timings.parse_ms = elapsed_ms(started);
                return (Outcome::ParseFailed(e.to_string()), Some(FailureStage::Parse));
            }
        };
        timings.parse_ms = elapsed_ms(started);

        let started = Instant::now();
        let translation = match translate_expression(&parsed, self.dialect) {
            Ok(translation) => translation,
            Err(e) => {
                timings.translate_ms = elapsed_ms(started);
                return (
                    Outcome::TranslateFailed(e.to_string()),
                    Some(FailureStage::Translate),
                );
            }
        };
        timings.translate_ms = elapsed_ms(started);

        let started = Instant::now();
        let result = self.execute_sql(&translation.sql, context);
        timings.execute_ms = elapsed_ms(started);
        match result {
            Ok(rows) => (Outcome::Rows(rows), None),
            Err(e) => (
                Outcome::ExecuteFailed(e.to_string()),
                Some(FailureStage::Execute),
            ),
        }
    }

    /// Ephemeral table lifecycle around one statement.
    fn execute_sql(
        &self,
        sql: &str,
        context: &Value,
    ) -> Result<Vec<Value>, ComplianceError> {
        let column_type = if self.dialect.capabilities().supports_jsonb {
            "JSONB"
        } else {
            "JSON"
        };
        let payload = context.to_string().replace('\'', "''");

        self.dialect.execute_batch(&format!(
            "DROP TABLE IF EXISTS resource; \
             CREATE TABLE resource (id INTEGER, resource {}); \
             INSERT INTO resource VALUES (1, '{}')",
            column_type, payload
        ))?;

        let result = self.dialect.execute(sql);
        // Drop on every exit path; a failed drop is logged, not fatal.
        if let Err(e) = self.dialect.execute_batch("DROP TABLE IF EXISTS resource") {
            warn!(error = %e, "failed to drop compliance table");
        }

        let rows = result?;
        Ok(decode_rows(rows))
    }

    /// Load a fixture, falling back to the minimal context that enables
    /// context-free arithmetic tests.
    fn load_context(&mut self, input_file: Option<&str>) -> Value {
        let Some(name) = input_file else {
            return minimal_context();
        };
        if let Some(cached) = self.fixture_cache.get(name) {
            return cached.clone();
        }
        let Some(dir) = &self.config.fixtures_dir else {
            return minimal_context();
        };

        let path = dir.join(name);
        let value = std::fs::read_to_string(&path)
            .map_err(ComplianceError::from)
            .and_then(|xml| {
                self.converter
                    .resource_from_xml(&xml)
                    .map_err(|e| ComplianceError::Fixture(e.to_string()))
            })
            .unwrap_or_else(|e| {
                warn!(fixture = name, error = %e, "fixture unavailable, using minimal context");
                minimal_context()
            });

        self.fixture_cache.insert(name.to_string(), value.clone());
        value
    }
}

fn minimal_context() -> Value {
    serde_json::json!({"resourceType": "Resource"})
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Decode the text projection back into a result collection: JSON arrays
/// flatten into elements, nulls are filtered (FHIRPath collections cannot
/// contain nulls), non-JSON text stays a string.
pub fn decode_rows(rows: Vec<basalt_dialect::Row>) -> Vec<Value> {
    let mut out = Vec::new();
    for row in rows {
        for cell in row {
            let Some(text) = cell else { continue };
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Null) => {}
                Ok(Value::Array(items)) => {
                    out.extend(items.into_iter().filter(|v| !v.is_null()))
                }
                Ok(value) => out.push(value),
                Err(_) => out.push(Value::String(text)),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_flattens_arrays_and_filters_nulls() {
        let rows = vec![vec![Some(r#"["John",null,"Q"]"#.to_string())]];
        assert_eq!(decode_rows(rows), vec![json!("John"), json!("Q")]);
    }

    #[test]
    fn decode_null_cell_is_empty() {
        let rows = vec![vec![None]];
        assert!(decode_rows(rows).is_empty());
    }

    #[test]
    fn decode_scalar_and_plain_text() {
        assert_eq!(decode_rows(vec![vec![Some("2".into())]]), vec![json!(2)]);
        assert_eq!(
            decode_rows(vec![vec![Some("true".into())]]),
            vec![json!(true)]
        );
        assert_eq!(
            decode_rows(vec![vec![Some("HELLO".into())]]),
            vec![json!("HELLO")]
        );
        assert_eq!(
            decode_rows(vec![vec![Some(r#""John""#.into())]]),
            vec![json!("John")]
        );
    }
}
