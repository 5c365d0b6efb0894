//! The dialect contract
//!
//! A dialect is a closed catalog of syntax-emission primitives plus a
//! connection to its database. The guiding invariant: **no primitive may
//! encode FHIRPath semantics**. If the two dialects would emit SQL that
//! differs only in token choice, the primitive is correct; if they would
//! differ in what they check or which branch they take, the decision has
//! leaked out of the translator and must move back there.
//!
//! Every method takes already-rendered SQL sub-expressions as strings and
//! returns a string. The translator owns composition, null propagation,
//! and branch selection.

use crate::error::Result;

/// Target engine tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    DuckDb,
    Postgres,
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::DuckDb => "duckdb",
            DialectKind::Postgres => "postgresql",
        }
    }
}

/// Static capability flags a host may branch on (never the translator;
/// translator branching on capabilities would leak semantics into
/// deployment configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_jsonb: bool,
    pub native_array_ops: bool,
    pub lateral_requires_keyword: bool,
}

/// Cast targets for the safe/strict cast primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Decimal,
    Integer,
    Boolean,
    Date,
    Timestamp,
    Time,
}

/// Boundary selector for uncertainty-interval endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Low,
    High,
}

/// Temporal component granularity used by boundary and diff primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TemporalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalUnit::Year => "year",
            TemporalUnit::Month => "month",
            TemporalUnit::Day => "day",
            TemporalUnit::Hour => "hour",
            TemporalUnit::Minute => "minute",
            TemporalUnit::Second => "second",
            TemporalUnit::Millisecond => "millisecond",
        }
    }
}

/// Temporal family for boundary emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalValueKind {
    Date,
    DateTime,
    Time,
}

/// Closed set of math functions the translator may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunction {
    Abs,
    Ceiling,
    Floor,
    Round,
    Sqrt,
    Truncate,
    Exp,
    Ln,
    Log,
}

impl MathFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MathFunction::Abs => "abs",
            MathFunction::Ceiling => "ceiling",
            MathFunction::Floor => "floor",
            MathFunction::Round => "round",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Truncate => "truncate",
            MathFunction::Exp => "exp",
            MathFunction::Ln => "ln",
            MathFunction::Log => "log",
        }
    }
}

/// Case conversion direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    Upper,
    Lower,
}

/// Text encodings for encode()/decode().
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Base64,
    UrlBase64,
    Hex,
}

/// Escape targets for escape()/unescape().
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeTarget {
    Html,
    Json,
}

/// Primitive JSON scalar families used by `ofType` filtering. Complex
/// (resourceType-discriminated) filtering is composed by the translator
/// out of enumeration + predicate primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonTypeFamily {
    String,
    Integer,
    Decimal,
    Boolean,
    Object,
    Array,
}

/// One result row: nullable text cells. The CTE assembler casts the final
/// projection to text precisely so that row decoding stays uniform across
/// engines.
pub type Row = Vec<Option<String>>;

/// The `value[x]` fields an extension payload may use, in extraction
/// order. Closed list per the FHIR datatypes.
pub const EXTENSION_VALUE_FIELDS: &[&str] = &[
    "valueBoolean",
    "valueInteger",
    "valueDecimal",
    "valueBase64Binary",
    "valueInstant",
    "valueString",
    "valueUri",
    "valueUrl",
    "valueCanonical",
    "valueDate",
    "valueDateTime",
    "valueTime",
    "valueCode",
    "valueOid",
    "valueId",
    "valueUuid",
    "valueUnsignedInt",
    "valuePositiveInt",
    "valueInteger64",
    "valueMarkdown",
    "valueAnnotation",
    "valueAttachment",
    "valueIdentifier",
    "valueCodeableConcept",
    "valueCodeableReference",
    "valueCoding",
    "valueQuantity",
    "valueRange",
    "valuePeriod",
    "valueRatio",
    "valueRatioRange",
    "valueSampledData",
    "valueSignature",
    "valueHumanName",
    "valueAddress",
    "valueContactPoint",
    "valueTiming",
    "valueReference",
    "valueMeta",
    "valueDuration",
    "valueMoney",
    "valueAge",
    "valueCount",
    "valueDistance",
    "valueContactDetail",
    "valueDosage",
    "valueExpression",
];

/// SQL-escape a string literal body (doubling single quotes). Shared by
/// both dialects; kept here so emission helpers never interpolate raw
/// user text.
pub fn escape_string(text: &str) -> String {
    text.replace('\'', "''")
}

/// The dialect contract. Two implementations with identical semantics:
/// an analytical JSON-native engine (DuckDB) and a transactional engine
/// with native JSONB (PostgreSQL).
pub trait Dialect: Send + Sync {
    // ------------------------------------------------------------------
    // Identity and execution
    // ------------------------------------------------------------------

    fn kind(&self) -> DialectKind;

    fn capabilities(&self) -> Capabilities;

    /// Execute one SQL statement, returning rows of nullable text cells.
    /// Acquires a connection, executes inside a transaction, commits, and
    /// releases on every exit path; rolls back before release on error.
    fn execute(&self, sql: &str) -> Result<Vec<Row>>;

    /// Execute statements that produce no rows (DDL, INSERT).
    fn execute_batch(&self, sql: &str) -> Result<()>;

    // ------------------------------------------------------------------
    // Literals and identifiers
    // ------------------------------------------------------------------

    /// Quote an identifier.
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name)
    }

    /// Render a string literal, escaping the body.
    fn string_literal(&self, text: &str) -> String {
        format!("'{}'", escape_string(text))
    }

    // ------------------------------------------------------------------
    // JSON field access
    // ------------------------------------------------------------------

    /// Extract a JSON path as text. `path` is a `$.a.b` JSONPath.
    fn extract_json_text(&self, column: &str, path: &str) -> String;

    /// Extract a JSON path as a JSON node.
    fn extract_json_object(&self, column: &str, path: &str) -> String;

    /// Path existence predicate.
    fn json_exists(&self, column: &str, path: &str) -> String;

    /// FHIR simple-or-complex primitive access: try `path.value`, fall
    /// back to `path`, both as native text.
    fn extract_primitive_value(&self, column: &str, path: &str) -> String;

    /// Engine-reported JSON node type name of `expr` (lowercased by the
    /// caller where needed).
    fn json_type_of(&self, expr: &str) -> String;

    /// Coerce `expr` to the engine's JSON value type.
    fn to_json(&self, expr: &str) -> String;

    /// A JSON scalar as native text (strings unquoted).
    fn json_unquote(&self, expr: &str) -> String;

    /// JSON object literal from (key, value-expression) pairs.
    fn create_json_object(&self, pairs: &[(String, String)]) -> String;

    /// Length of a JSON array.
    fn json_array_length(&self, expr: &str) -> String;

    // ------------------------------------------------------------------
    // Array operations
    // ------------------------------------------------------------------

    /// Row-source enumerating `array_expr` as `(index_alias, value_alias)`
    /// with zero-based, order-preserving indexes. Usable as a subquery.
    fn enumerate_json_array(&self, array_expr: &str, value_alias: &str, index_alias: &str)
        -> String;

    /// Lateral row-source flattening `array_expr`, for use after a FROM
    /// item. `alias.value` addresses the element.
    fn lateral_unnest(&self, array_expr: &str, alias: &str) -> String;

    /// Aggregate `expr` into a JSON array (aggregate context).
    fn aggregate_to_json_array(&self, expr: &str) -> String;

    /// Aggregate with explicit ordering column.
    fn aggregate_to_json_array_ordered(&self, expr: &str, order_by: &str) -> String;

    /// Membership of a scalar (text form) in a JSON array.
    fn json_array_contains(&self, array_expr: &str, scalar_expr: &str) -> String;

    /// The empty JSON array literal.
    fn empty_json_array(&self) -> String;

    /// Predicate: is `expr` a JSON array?
    fn is_json_array(&self, expr: &str) -> String;

    /// Wrap a scalar as a one-element JSON array.
    fn wrap_json_array(&self, expr: &str) -> String;

    /// JSON array literal from element expressions.
    fn create_json_array(&self, elements: &[String]) -> String;

    /// Sort a JSON array of scalars.
    fn array_sort(&self, array_expr: &str, ascending: bool) -> String;

    /// Drop the first `count` elements.
    fn array_skip(&self, array_expr: &str, count: &str) -> String;

    /// Keep the first `count` elements.
    fn array_take(&self, array_expr: &str, count: &str) -> String;

    /// Last element of a JSON array (JSON node, NULL when empty).
    fn array_last(&self, array_expr: &str) -> String;

    /// Element at zero-based `index` (JSON node, NULL out of range).
    fn array_element_at(&self, array_expr: &str, index: &str) -> String;

    /// Join a JSON array of strings with a separator.
    fn array_to_string(&self, array_expr: &str, separator: &str) -> String;

    /// Project `path` across every element of `array_expr`, flattening
    /// one level of nested arrays, skipping missing values, preserving
    /// order. Returns a JSON array.
    fn project_json_array(&self, array_expr: &str, path: &[&str]) -> String;

    /// Filter elements of `array_expr` by `predicate_sql`, which refers to
    /// the element as `element_alias`. Returns a JSON array.
    fn filter_json_array(&self, array_expr: &str, element_alias: &str, predicate_sql: &str)
        -> String;

    /// Map elements of `array_expr` through `projection_sql` (refers to
    /// `element_alias`), dropping NULL projections. Returns a JSON array.
    fn transform_json_array(
        &self,
        array_expr: &str,
        element_alias: &str,
        projection_sql: &str,
    ) -> String;

    /// Concatenate two JSON arrays, preserving order and duplicates.
    fn collection_combine(&self, first: &str, second: &str) -> String;

    /// Elements of `first` not present in `second` (text-form equality).
    fn collection_exclude(&self, first: &str, second: &str) -> String;

    /// Elements present in both arrays, de-duplicated.
    fn collection_intersect(&self, first: &str, second: &str) -> String;

    /// De-duplicate preserving first-occurrence order.
    fn distinct(&self, array_expr: &str) -> String;

    /// Predicate: all elements unique.
    fn is_distinct(&self, array_expr: &str) -> String;

    // ------------------------------------------------------------------
    // Quantifiers
    // ------------------------------------------------------------------
    //
    // `element_predicate` is a boolean SQL expression over the element
    // alias `v`; the translator builds it from its centralized truthiness
    // rule, so these primitives only pick aggregate tokens.

    fn all_true(&self, array_expr: &str, element_predicate: &str) -> String;
    fn any_true(&self, array_expr: &str, element_predicate: &str) -> String;
    fn all_false(&self, array_expr: &str, element_predicate: &str) -> String;
    fn any_false(&self, array_expr: &str, element_predicate: &str) -> String;

    // ------------------------------------------------------------------
    // Existence
    // ------------------------------------------------------------------

    /// Non-empty check: array length > 0 for collections, IS NOT NULL
    /// otherwise.
    fn exists_check(&self, expr: &str, is_collection: bool) -> String;

    /// Empty check (the negation of `exists_check`, same shape split).
    fn empty_check(&self, expr: &str, is_collection: bool) -> String;

    /// Element count: array length for collections, 0/1 for scalars.
    fn count_elements(&self, expr: &str, is_collection: bool) -> String;

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    fn string_concat(&self, left: &str, right: &str) -> String;
    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String;
    fn split_string(&self, expr: &str, delimiter: &str) -> String;
    fn string_join(&self, array_expr: &str, separator: &str) -> String;
    fn case_convert(&self, expr: &str, case: CaseKind) -> String;
    fn trim(&self, expr: &str) -> String;
    /// Explode a string into a JSON array of single characters.
    fn char_array(&self, expr: &str) -> String;
    fn contains_substring(&self, haystack: &str, needle: &str) -> String;
    fn starts_with(&self, expr: &str, prefix: &str) -> String;
    fn ends_with(&self, expr: &str, suffix: &str) -> String;
    /// Zero-based index of `needle` in `haystack`, -1 when absent.
    fn string_index_of(&self, haystack: &str, needle: &str) -> String;
    fn string_length(&self, expr: &str) -> String;
    fn string_replace(&self, expr: &str, find: &str, replace: &str) -> String;
    fn regex_match(&self, expr: &str, pattern: &str) -> String;
    fn regex_replace(&self, expr: &str, pattern: &str, substitution: &str) -> String;

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    /// `/` with decimal semantics (NULL on division by zero).
    fn decimal_division(&self, numerator: &str, denominator: &str) -> String;

    /// `div`: integer division truncating toward zero.
    fn integer_division(&self, numerator: &str, denominator: &str) -> String;

    /// `mod` with the sign of the dividend.
    fn modulo(&self, left: &str, right: &str) -> String;

    fn power(&self, base: &str, exponent: &str) -> String;

    fn math_function(&self, function: MathFunction, args: &[String]) -> String;

    // ------------------------------------------------------------------
    // Casts
    // ------------------------------------------------------------------

    /// Cast returning NULL on failure.
    fn safe_cast(&self, expr: &str, target: CastType) -> String;

    /// Cast raising an execution error on failure.
    fn strict_cast(&self, expr: &str, target: CastType) -> String;

    /// Cast to the engine's native text type.
    fn cast_to_text(&self, expr: &str) -> String;

    /// Engine `typeof` equivalent over a scalar expression.
    fn sql_type_of(&self, expr: &str) -> String;

    /// A cast guaranteed to fail at execution time, used to poison SQL
    /// for unknown type names. Intentional: neither engine offers a
    /// portable in-expression RAISE, so an invalid type name in the cast
    /// target produces the required runtime error.
    fn invalid_type_cast(&self, expr: &str, type_name: &str) -> String {
        let sanitized: String = type_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("CAST({} AS INVALID_FHIR_TYPE_{})", expr, sanitized)
    }

    // ------------------------------------------------------------------
    // Temporal
    // ------------------------------------------------------------------

    /// DATE literal from a full `YYYY-MM-DD` body.
    fn date_literal(&self, value: &str) -> String;

    /// TIMESTAMP literal from a padded `YYYY-MM-DD HH:MM:SS[.fff]` body.
    fn datetime_literal(&self, value: &str) -> String;

    /// TIME literal from a padded `HH:MM:SS[.fff]` body.
    fn time_literal(&self, value: &str) -> String;

    fn current_date(&self) -> String;
    fn current_timestamp(&self) -> String;
    fn current_time(&self) -> String;

    /// Whole-unit difference `end - start`.
    fn date_diff(&self, unit: TemporalUnit, start: &str, end: &str) -> String;

    /// Truncate-and-offset boundary of a temporal value at `unit`
    /// granularity: low = truncation, high = next unit minus one
    /// microsecond.
    fn temporal_boundary(
        &self,
        expr: &str,
        kind: TemporalValueKind,
        unit: TemporalUnit,
        boundary: BoundaryKind,
    ) -> String;

    /// Uncertainty-interval endpoint of a decimal: value ± 0.5×10^(-p)
    /// where p is the value's written precision, rounded to
    /// `target_precision` (caller defaults: p + 5, capped at 31).
    fn decimal_boundary(
        &self,
        expr: &str,
        target_precision: Option<i64>,
        boundary: BoundaryKind,
    ) -> String;

    // ------------------------------------------------------------------
    // Logical
    // ------------------------------------------------------------------

    fn logical_and(&self, left: &str, right: &str) -> String {
        format!("({} AND {})", left, right)
    }

    fn logical_or(&self, left: &str, right: &str) -> String {
        format!("({} OR {})", left, right)
    }

    fn logical_not(&self, expr: &str) -> String {
        format!("(NOT {})", expr)
    }

    fn logical_xor(&self, left: &str, right: &str) -> String;

    /// Two-armed CASE.
    fn conditional(&self, condition: &str, then_expr: &str, else_expr: &str) -> String {
        format!(
            "(CASE WHEN {} THEN {} ELSE {} END)",
            condition, then_expr, else_expr
        )
    }

    /// Infix comparison with an operator token (`=`, `<`, ...).
    fn comparison(&self, left: &str, operator: &str, right: &str) -> String {
        format!("({} {} {})", left, operator, right)
    }

    // ------------------------------------------------------------------
    // Type operations (primitive families only; complex FHIR types are
    // routed by the translator through resourceType predicates)
    // ------------------------------------------------------------------

    /// Predicate: does the JSON scalar `expr` belong to `family`?
    fn json_type_check(&self, expr: &str, family: JsonTypeFamily) -> String;

    /// Filter a JSON array down to elements of `family`.
    fn collection_type_filter(&self, array_expr: &str, family: JsonTypeFamily) -> String;

    // ------------------------------------------------------------------
    // Extensions
    // ------------------------------------------------------------------

    /// Filter an extension array by exact `url`.
    fn filter_extension_by_url(&self, extensions_expr: &str, url: &str) -> String;

    /// Extract the first present `value[x]` payload of each extension
    /// object (fields tried in `EXTENSION_VALUE_FIELDS` order).
    fn extract_extension_values(&self, extensions_expr: &str) -> String;

    // ------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------

    fn encode(&self, expr: &str, encoding: Encoding) -> String;
    fn decode(&self, expr: &str, encoding: Encoding) -> String;
    fn escape(&self, expr: &str, target: EscapeTarget) -> String;
    fn unescape(&self, expr: &str, target: EscapeTarget) -> String;

    // ------------------------------------------------------------------
    // JSON navigation
    // ------------------------------------------------------------------

    /// Direct children of a JSON object/array as a JSON array.
    fn json_children(&self, expr: &str) -> String;

    /// All descendants (recursive) as a JSON array.
    fn json_descendants(&self, expr: &str) -> String;
}
