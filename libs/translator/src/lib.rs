//! FHIRPath → SQL translation
//!
//! The visitor walks the typed AST bottom-up, emitting SQL fragments and
//! assembling them into one CTE chain per expression:
//!
//! ```text
//! WITH c_0 AS (...), ..., c_N AS (...)
//! SELECT CAST(c_N.result AS text) AS result FROM c_N
//! ```
//!
//! Every semantic decision (collection model, empty propagation,
//! truthiness, comparison type discipline, temporal interval comparison,
//! type-operation routing) lives in this crate; every emitted token comes
//! from the dialect.

pub mod cte;
pub mod error;
pub mod fragment;
mod functions;
pub mod translator;
pub mod types;

pub use cte::{CtePlan, ID_COLUMN, RESOURCE_COLUMN, RESOURCE_TABLE};
pub use error::{Result, TranslationError};
pub use fragment::{Fragment, ResultShape, ScalarType};
pub use translator::{translate, Translation, TranslationOptions};

use basalt_dialect::Dialect;
use basalt_fhirpath::ParsedExpression;

/// Translate a parsed expression with default options.
pub fn translate_expression(
    expression: &ParsedExpression,
    dialect: &dyn Dialect,
) -> Result<Translation> {
    translate(
        expression.ast(),
        expression.source(),
        dialect,
        TranslationOptions::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_dialect::DuckDbDialect;
    use basalt_fhirpath::FhirPathParser;

    fn translate_duckdb(expression: &str) -> Translation {
        let parser = FhirPathParser::new();
        let parsed = parser.parse(expression).expect("parse");
        let dialect = DuckDbDialect::in_memory().expect("duckdb");
        translate_expression(&parsed, &dialect).expect("translate")
    }

    #[test]
    fn emits_one_cte_chain() {
        let translation = translate_duckdb("Patient.name.given");
        assert!(translation.sql.starts_with("WITH c_0 AS ("));
        assert!(translation.sql.contains("SELECT CAST(c_0.result AS VARCHAR) AS result FROM c_0"));
    }

    #[test]
    fn translation_is_deterministic() {
        let a = translate_duckdb("Patient.name.where(use = 'official').family");
        let b = translate_duckdb("Patient.name.where(use = 'official').family");
        assert_eq!(a.sql, b.sql);
    }

    #[test]
    fn repeated_subtrees_share_a_cte() {
        let translation = translate_duckdb("name.given.count() + name.given.count()");
        // Both `name.given` and the repeated aggregation materialise once
        // each; with the root that is three entries, and the aggregation
        // CTE is referenced from both sides of the addition.
        assert_eq!(translation.plan.entries.len(), 3);
        assert_eq!(
            translation.sql.matches("(SELECT c_1.result FROM c_1").count(),
            2
        );
    }

    #[test]
    fn unknown_function_is_reported_with_source() {
        let parser = FhirPathParser::new();
        let parsed = parser.parse("name.fooBar(1)").unwrap();
        let dialect = DuckDbDialect::in_memory().unwrap();
        let err = translate_expression(&parsed, &dialect).unwrap_err();
        match err {
            TranslationError::UnknownFunction { name, source_text } => {
                assert_eq!(name, "fooBar");
                assert!(source_text.contains("fooBar"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn wrong_arity_is_reported() {
        let parser = FhirPathParser::new();
        let parsed = parser.parse("name.substring()").unwrap();
        let dialect = DuckDbDialect::in_memory().unwrap();
        let err = translate_expression(&parsed, &dialect).unwrap_err();
        assert!(matches!(err, TranslationError::WrongArity { .. }));
    }

    #[test]
    fn unknown_type_emits_poison_cast_not_error() {
        let translation = translate_duckdb("value.ofType(NotARealType)");
        assert!(translation.sql.contains("INVALID_FHIR_TYPE_NOTAREALTYPE"));
    }

    #[test]
    fn literal_is_folds_at_compile_time() {
        let translation = translate_duckdb("'abc' is Integer");
        assert!(translation.sql.contains("FALSE"));
        let translation = translate_duckdb("42 is Integer");
        assert!(translation.sql.contains("TRUE"));
    }

    #[test]
    fn partial_precision_equality_folds_to_null() {
        let translation = translate_duckdb("@2015 = @2015-01-01");
        assert!(translation.sql.contains("CAST(NULL AS BOOLEAN)"));
    }
}
