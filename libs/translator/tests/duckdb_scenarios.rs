//! End-to-end translation scenarios executed against in-memory DuckDB.
//!
//! Each case loads a single-resource fixture into the `resource` table,
//! translates the expression, runs the emitted SQL, and checks the final
//! projection.

use basalt_dialect::{Dialect, DuckDbDialect};
use basalt_fhirpath::FhirPathParser;
use basalt_translator::translate_expression;

fn run(expression: &str, fixture: Option<&str>) -> Option<String> {
    let dialect = DuckDbDialect::in_memory().expect("duckdb");
    dialect
        .execute_batch("CREATE TABLE resource (id INTEGER, resource JSON)")
        .expect("create table");
    let json = fixture.unwrap_or(r#"{"resourceType":"Resource"}"#);
    dialect
        .execute_batch(&format!(
            "INSERT INTO resource VALUES (1, '{}')",
            json.replace('\'', "''")
        ))
        .expect("insert fixture");

    let parser = FhirPathParser::new();
    let parsed = parser.parse(expression).expect("parse");
    let translation = translate_expression(&parsed, &dialect).expect("translate");
    let rows = dialect.execute(&translation.sql).expect("execute");
    assert_eq!(rows.len(), 1, "expected exactly one result row");
    rows[0][0].clone()
}

const PATIENT_NAMES: &str = r#"{"resourceType":"Patient","name":[{"given":["John","Q"]},{"given":["Jane"]}]}"#;

#[test]
fn context_free_arithmetic() {
    assert_eq!(run("1 + 1", None).as_deref(), Some("2"));
}

#[test]
fn path_navigation_flattens() {
    assert_eq!(
        run("Patient.name.given", Some(PATIENT_NAMES)).as_deref(),
        Some(r#"["John","Q","Jane"]"#)
    );
}

#[test]
fn first_returns_the_first_element() {
    assert_eq!(
        run("Patient.name.given.first()", Some(PATIENT_NAMES)).as_deref(),
        Some(r#""John""#)
    );
}

#[test]
fn where_filters_by_member() {
    let fixture = r#"{"resourceType":"Patient","name":[{"use":"official","family":"Smith"},{"use":"nickname","family":"S"}]}"#;
    assert_eq!(
        run("Patient.name.where(use = 'official').family", Some(fixture)).as_deref(),
        Some(r#"["Smith"]"#)
    );
}

#[test]
fn to_quantity_exposes_value() {
    assert_eq!(
        run("(5.5).toQuantity('mg').value", None).as_deref(),
        Some("[5.5]")
    );
}

#[test]
fn different_precision_equality_is_empty() {
    assert_eq!(run("@2015 = @2015-01-01", None), None);
}

#[test]
fn same_precision_temporal_comparisons_fold() {
    assert_eq!(run("@2015 = @2015", None).as_deref(), Some("true"));
    assert_eq!(run("@2014 < @2015", None).as_deref(), Some("true"));
    assert_eq!(run("@2015-01-01 < @2015", None), None);
}

#[test]
fn date_comparison_uses_interval_start() {
    let fixture = r#"{"resourceType":"Patient","birthDate":"1970-01-01"}"#;
    assert_eq!(
        run("Patient.birthDate < @1980", Some(fixture)).as_deref(),
        Some("true")
    );
    assert_eq!(
        run("Patient.birthDate > @1980", Some(fixture)).as_deref(),
        Some("false")
    );
}

#[test]
fn string_is_integer_is_false() {
    assert_eq!(run("'abc' is Integer", None).as_deref(), Some("false"));
}

#[test]
fn choice_element_navigation() {
    let fixture = r#"{"resourceType":"Patient","deceasedBoolean":true}"#;
    assert_eq!(
        run("Patient.deceased.exists()", Some(fixture)).as_deref(),
        Some("true")
    );
}

#[test]
fn union_distinct_count() {
    assert_eq!(
        run("(1 | 2 | 2 | 3).distinct().count()", None).as_deref(),
        Some("3")
    );
}

#[test]
fn count_on_missing_member_is_zero() {
    assert_eq!(
        run("Patient.name.count()", Some(r#"{"resourceType":"Patient"}"#)).as_deref(),
        Some("0")
    );
}

#[test]
fn exists_and_empty_are_inverses() {
    let fixture = r#"{"resourceType":"Patient","name":[{"family":"Smith"}]}"#;
    assert_eq!(run("Patient.name.exists()", Some(fixture)).as_deref(), Some("true"));
    assert_eq!(run("Patient.name.empty()", Some(fixture)).as_deref(), Some("false"));
    assert_eq!(
        run("Patient.contact.exists()", Some(fixture)).as_deref(),
        Some("false")
    );
}

#[test]
fn div_truncates_toward_zero() {
    assert_eq!(run("7 div 2", None).as_deref(), Some("3"));
    assert_eq!(run("(-7) div 2", None).as_deref(), Some("-3"));
    assert_eq!(run("5 mod 2", None).as_deref(), Some("1"));
}

#[test]
fn iif_branches_on_condition() {
    assert_eq!(run("iif(true, 1, 2)", None).as_deref(), Some("1"));
    assert_eq!(run("iif(false, 1, 2)", None).as_deref(), Some("2"));
}

#[test]
fn string_functions() {
    assert_eq!(run("'hello'.upper()", None).as_deref(), Some("HELLO"));
    assert_eq!(run("'hello'.length()", None).as_deref(), Some("5"));
    assert_eq!(run("'hello'.substring(1, 3)", None).as_deref(), Some("ell"));
    assert_eq!(run("'hello'.startsWith('he')", None).as_deref(), Some("true"));
    assert_eq!(run("'hello'.indexOf('ll')", None).as_deref(), Some("2"));
    assert_eq!(run("'a,b,c'.split(',').count()", None).as_deref(), Some("3"));
}

#[test]
fn is_on_absent_input_yields_empty_not_false() {
    let fixture = r#"{"resourceType":"Patient"}"#;
    assert_eq!(run("Patient.birthDate.first() is String", Some(fixture)), None);
}

#[test]
fn where_with_is_drops_absent_rows() {
    let fixture = r#"{"resourceType":"Patient","deceasedBoolean":true}"#;
    assert_eq!(
        run(
            "Patient.deceased.where($this is Boolean).count()",
            Some(fixture)
        )
        .as_deref(),
        Some("1")
    );
}

#[test]
fn unknown_type_cast_fails_at_execution() {
    let dialect = DuckDbDialect::in_memory().expect("duckdb");
    dialect
        .execute_batch("CREATE TABLE resource (id INTEGER, resource JSON)")
        .unwrap();
    dialect
        .execute_batch(r#"INSERT INTO resource VALUES (1, '{"resourceType":"Resource"}')"#)
        .unwrap();
    let parser = FhirPathParser::new();
    let parsed = parser.parse("'x' as UnheardOfType").unwrap();
    let translation = translate_expression(&parsed, &dialect).unwrap();
    assert!(dialect.execute(&translation.sql).is_err());
}

#[test]
fn quantifiers() {
    let fixture = r#"{"resourceType":"Patient","flags":[true,true,false]}"#;
    assert_eq!(run("Patient.flags.allTrue()", Some(fixture)).as_deref(), Some("false"));
    assert_eq!(run("Patient.flags.anyTrue()", Some(fixture)).as_deref(), Some("true"));
    assert_eq!(run("Patient.flags.anyFalse()", Some(fixture)).as_deref(), Some("true"));
}

#[test]
fn logical_three_valued() {
    assert_eq!(run("true and true", None).as_deref(), Some("true"));
    assert_eq!(run("true or false", None).as_deref(), Some("true"));
    assert_eq!(run("true xor true", None).as_deref(), Some("false"));
    assert_eq!(run("false implies false", None).as_deref(), Some("true"));
}

#[test]
fn membership_canonicalisation_runs() {
    let fixture = r#"{"resourceType":"Patient","name":[{"given":["John"]}]}"#;
    assert_eq!(
        run("'John' in Patient.name.given", Some(fixture)).as_deref(),
        Some("true")
    );
    assert_eq!(
        run("Patient.name.given contains 'Jane'", Some(fixture)).as_deref(),
        Some("false")
    );
}

#[test]
fn skip_take_tail() {
    assert_eq!(run("(1 | 2 | 3).tail().count()", None).as_deref(), Some("2"));
    assert_eq!(run("(1 | 2 | 3).skip(2).count()", None).as_deref(), Some("1"));
    assert_eq!(run("(1 | 2 | 3).take(2).count()", None).as_deref(), Some("2"));
}
