//! DuckDB dialect
//!
//! JSON-native analytical engine. Emission leans on `json_extract` /
//! `json_each` / `list()` aggregation and `TRY_CAST`. The connection is a
//! single in-process handle behind a mutex; DuckDB has no session
//! statement-timeout setting, so cancellation is not available on this
//! target.

use crate::dialect::{
    escape_string, BoundaryKind, Capabilities, CaseKind, CastType, Dialect, DialectKind, Encoding,
    EscapeTarget, JsonTypeFamily, MathFunction, Row, TemporalUnit, TemporalValueKind,
    EXTENSION_VALUE_FIELDS,
};
use crate::error::{DialectError, Result};
use std::sync::Mutex;
use tracing::debug;

/// DuckDB-backed dialect.
pub struct DuckDbDialect {
    connection: Mutex<duckdb::Connection>,
}

impl DuckDbDialect {
    /// Open an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let connection = duckdb::Connection::open_in_memory()
            .map_err(|e| DialectError::Connection(e.to_string()))?;
        Self::from_connection(connection)
    }

    /// Open (or create) a database file.
    pub fn open(path: &str) -> Result<Self> {
        let connection =
            duckdb::Connection::open(path).map_err(|e| DialectError::Connection(e.to_string()))?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: duckdb::Connection) -> Result<Self> {
        // The JSON extension ships with the bundled build but still wants
        // loading on some platforms.
        connection
            .execute_batch("INSTALL json; LOAD json;")
            .map_err(|e| DialectError::Connection(e.to_string()))?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn value_to_text(value: duckdb::types::Value) -> Option<String> {
        use duckdb::types::Value;
        match value {
            Value::Null => None,
            Value::Boolean(b) => Some(b.to_string()),
            Value::TinyInt(v) => Some(v.to_string()),
            Value::SmallInt(v) => Some(v.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::BigInt(v) => Some(v.to_string()),
            Value::HugeInt(v) => Some(v.to_string()),
            Value::UTinyInt(v) => Some(v.to_string()),
            Value::USmallInt(v) => Some(v.to_string()),
            Value::UInt(v) => Some(v.to_string()),
            Value::UBigInt(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Double(v) => Some(v.to_string()),
            Value::Decimal(v) => Some(v.to_string()),
            Value::Text(v) => Some(v),
            other => Some(format!("{:?}", other)),
        }
    }
}

impl Dialect for DuckDbDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::DuckDb
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_jsonb: false,
            native_array_ops: true,
            lateral_requires_keyword: false,
        }
    }

    fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql, "executing on duckdb");
        let connection = self.connection.lock().expect("duckdb handle poisoned");
        let mut statement = connection
            .prepare(sql)
            .map_err(|e| DialectError::Execution(e.to_string()))?;
        let mut rows = statement
            .query([])
            .map_err(|e| DialectError::Execution(e.to_string()))?;

        let mut out = Vec::new();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(DialectError::Execution(e.to_string())),
            };
            let column_count = row.as_ref().column_count();
            let mut cells = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value: duckdb::types::Value = row
                    .get(i)
                    .map_err(|e| DialectError::Execution(e.to_string()))?;
                cells.push(Self::value_to_text(value));
            }
            out.push(cells);
        }
        Ok(out)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        debug!(sql, "executing batch on duckdb");
        let connection = self.connection.lock().expect("duckdb handle poisoned");
        connection
            .execute_batch(sql)
            .map_err(|e| DialectError::Execution(e.to_string()))
    }

    // -- JSON field access -------------------------------------------------

    fn extract_json_text(&self, column: &str, path: &str) -> String {
        format!("json_extract_string({}, '{}')", column, path)
    }

    fn extract_json_object(&self, column: &str, path: &str) -> String {
        format!("json_extract({}, '{}')", column, path)
    }

    fn json_exists(&self, column: &str, path: &str) -> String {
        format!("(json_extract({}, '{}') IS NOT NULL)", column, path)
    }

    fn extract_primitive_value(&self, column: &str, path: &str) -> String {
        format!(
            "COALESCE(json_extract_string({col}, '{path}.value'), json_extract_string({col}, '{path}'))",
            col = column,
            path = path
        )
    }

    fn json_type_of(&self, expr: &str) -> String {
        format!("json_type(to_json({}))", expr)
    }

    fn json_array_length(&self, expr: &str) -> String {
        format!("json_array_length({})", expr)
    }

    fn to_json(&self, expr: &str) -> String {
        format!("to_json({})", expr)
    }

    fn json_unquote(&self, expr: &str) -> String {
        format!("json_extract_string({}, '$')", expr)
    }

    fn create_json_object(&self, pairs: &[(String, String)]) -> String {
        let args = pairs
            .iter()
            .map(|(key, value)| format!("'{}', {}", escape_string(key), value))
            .collect::<Vec<_>>()
            .join(", ");
        format!("json_object({})", args)
    }

    // -- Array operations --------------------------------------------------

    fn enumerate_json_array(
        &self,
        array_expr: &str,
        value_alias: &str,
        index_alias: &str,
    ) -> String {
        format!(
            "SELECT t.value AS {value}, CAST(t.key AS INTEGER) AS {index} FROM json_each(COALESCE({array}, '[]')) AS t",
            value = value_alias,
            index = index_alias,
            array = array_expr
        )
    }

    fn lateral_unnest(&self, array_expr: &str, alias: &str) -> String {
        format!("json_each(COALESCE({}, '[]')) AS {}", array_expr, alias)
    }

    fn aggregate_to_json_array(&self, expr: &str) -> String {
        format!("CAST(COALESCE(to_json(list({})), '[]') AS JSON)", expr)
    }

    fn aggregate_to_json_array_ordered(&self, expr: &str, order_by: &str) -> String {
        format!(
            "CAST(COALESCE(to_json(list({} ORDER BY {})), '[]') AS JSON)",
            expr, order_by
        )
    }

    fn json_array_contains(&self, array_expr: &str, scalar_expr: &str) -> String {
        format!(
            "EXISTS (SELECT 1 FROM json_each(COALESCE({}, '[]')) AS t WHERE json_extract_string(t.value, '$') = {})",
            array_expr, scalar_expr
        )
    }

    fn empty_json_array(&self) -> String {
        "json_array()".to_string()
    }

    fn is_json_array(&self, expr: &str) -> String {
        format!("(json_type(to_json({})) = 'ARRAY')", expr)
    }

    fn wrap_json_array(&self, expr: &str) -> String {
        format!("json_array(to_json({}))", expr)
    }

    fn create_json_array(&self, elements: &[String]) -> String {
        format!("json_array({})", elements.join(", "))
    }

    fn array_sort(&self, array_expr: &str, ascending: bool) -> String {
        let direction = if ascending { "ASC" } else { "DESC" };
        format!(
            "(SELECT CAST(COALESCE(to_json(list(t.value ORDER BY TRY_CAST(json_extract_string(t.value, '$') AS DOUBLE) {dir} NULLS LAST, json_extract_string(t.value, '$') {dir})), '[]') AS JSON) FROM json_each(COALESCE({array}, '[]')) AS t)",
            dir = direction,
            array = array_expr
        )
    }

    fn array_skip(&self, array_expr: &str, count: &str) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(t.value ORDER BY CAST(t.key AS INTEGER))), '[]') AS JSON) FROM json_each(COALESCE({}, '[]')) AS t WHERE CAST(t.key AS INTEGER) >= ({}))",
            array_expr, count
        )
    }

    fn array_take(&self, array_expr: &str, count: &str) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(t.value ORDER BY CAST(t.key AS INTEGER))), '[]') AS JSON) FROM json_each(COALESCE({}, '[]')) AS t WHERE CAST(t.key AS INTEGER) < ({}))",
            array_expr, count
        )
    }

    fn array_last(&self, array_expr: &str) -> String {
        format!(
            "(SELECT t.value FROM json_each(COALESCE({}, '[]')) AS t ORDER BY CAST(t.key AS INTEGER) DESC LIMIT 1)",
            array_expr
        )
    }

    fn array_element_at(&self, array_expr: &str, index: &str) -> String {
        format!(
            "json_extract({}, '$[' || CAST({} AS VARCHAR) || ']')",
            array_expr, index
        )
    }

    fn array_to_string(&self, array_expr: &str, separator: &str) -> String {
        format!(
            "(SELECT string_agg(json_extract_string(t.value, '$'), {} ORDER BY CAST(t.key AS INTEGER)) FROM json_each(COALESCE({}, '[]')) AS t)",
            separator, array_expr
        )
    }

    fn project_json_array(&self, array_expr: &str, path: &[&str]) -> String {
        let member_path = format!("$.{}", path.join("."));
        format!(
            "(SELECT CAST(COALESCE(to_json(list(x.value ORDER BY x.base_idx, x.sub_idx)), '[]') AS JSON) \
             FROM (SELECT CAST(b.key AS INTEGER) AS base_idx, CAST(s.key AS INTEGER) AS sub_idx, s.value AS value \
                   FROM json_each(COALESCE({array}, '[]')) AS b, \
                        json_each(CASE WHEN json_type(json_extract(b.value, '{path}')) = 'ARRAY' \
                                       THEN json_extract(b.value, '{path}') \
                                       ELSE json_array(json_extract(b.value, '{path}')) END) AS s \
                   WHERE json_extract(b.value, '{path}') IS NOT NULL) AS x)",
            array = array_expr,
            path = member_path
        )
    }

    fn filter_json_array(
        &self,
        array_expr: &str,
        element_alias: &str,
        predicate_sql: &str,
    ) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(e.{alias} ORDER BY e.__idx)), '[]') AS JSON) \
             FROM (SELECT t.value AS {alias}, CAST(t.key AS INTEGER) AS __idx \
                   FROM json_each(COALESCE({array}, '[]')) AS t) AS e \
             WHERE {predicate})",
            alias = element_alias,
            array = array_expr,
            predicate = predicate_sql
        )
    }

    fn transform_json_array(
        &self,
        array_expr: &str,
        element_alias: &str,
        projection_sql: &str,
    ) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(p.__out ORDER BY p.__idx)), '[]') AS JSON) \
             FROM (SELECT {projection} AS __out, e.__idx \
                   FROM (SELECT t.value AS {alias}, CAST(t.key AS INTEGER) AS __idx \
                         FROM json_each(COALESCE({array}, '[]')) AS t) AS e) AS p \
             WHERE p.__out IS NOT NULL)",
            projection = projection_sql,
            alias = element_alias,
            array = array_expr
        )
    }

    fn collection_combine(&self, first: &str, second: &str) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(u.value ORDER BY u.src, u.idx)), '[]') AS JSON) FROM (\
             SELECT 0 AS src, CAST(t.key AS INTEGER) AS idx, t.value FROM json_each(COALESCE({a}, '[]')) AS t \
             UNION ALL \
             SELECT 1 AS src, CAST(t.key AS INTEGER) AS idx, t.value FROM json_each(COALESCE({b}, '[]')) AS t) AS u)",
            a = first,
            b = second
        )
    }

    fn collection_exclude(&self, first: &str, second: &str) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(t.value ORDER BY CAST(t.key AS INTEGER))), '[]') AS JSON) \
             FROM json_each(COALESCE({a}, '[]')) AS t \
             WHERE NOT EXISTS (SELECT 1 FROM json_each(COALESCE({b}, '[]')) AS o \
                               WHERE CAST(o.value AS VARCHAR) = CAST(t.value AS VARCHAR)))",
            a = first,
            b = second
        )
    }

    fn collection_intersect(&self, first: &str, second: &str) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(CAST(g.txt AS JSON) ORDER BY g.first_idx)), '[]') AS JSON) \
             FROM (SELECT CAST(t.value AS VARCHAR) AS txt, MIN(CAST(t.key AS INTEGER)) AS first_idx \
                   FROM json_each(COALESCE({a}, '[]')) AS t \
                   WHERE EXISTS (SELECT 1 FROM json_each(COALESCE({b}, '[]')) AS o \
                                 WHERE CAST(o.value AS VARCHAR) = CAST(t.value AS VARCHAR)) \
                   GROUP BY CAST(t.value AS VARCHAR)) AS g)",
            a = first,
            b = second
        )
    }

    fn distinct(&self, array_expr: &str) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(CAST(g.txt AS JSON) ORDER BY g.first_idx)), '[]') AS JSON) \
             FROM (SELECT CAST(t.value AS VARCHAR) AS txt, MIN(CAST(t.key AS INTEGER)) AS first_idx \
                   FROM json_each(COALESCE({}, '[]')) AS t \
                   GROUP BY CAST(t.value AS VARCHAR)) AS g)",
            array_expr
        )
    }

    fn is_distinct(&self, array_expr: &str) -> String {
        format!(
            "(SELECT COUNT(*) = COUNT(DISTINCT CAST(t.value AS VARCHAR)) FROM json_each(COALESCE({}, '[]')) AS t)",
            array_expr
        )
    }

    // -- Quantifiers -------------------------------------------------------

    fn all_true(&self, array_expr: &str, element_predicate: &str) -> String {
        format!(
            "COALESCE((SELECT BOOL_AND({pred}) FROM (SELECT t.value AS v FROM json_each(COALESCE({array}, '[]')) AS t) AS e), TRUE)",
            pred = element_predicate,
            array = array_expr
        )
    }

    fn any_true(&self, array_expr: &str, element_predicate: &str) -> String {
        format!(
            "COALESCE((SELECT BOOL_OR({pred}) FROM (SELECT t.value AS v FROM json_each(COALESCE({array}, '[]')) AS t) AS e), FALSE)",
            pred = element_predicate,
            array = array_expr
        )
    }

    fn all_false(&self, array_expr: &str, element_predicate: &str) -> String {
        format!(
            "COALESCE((SELECT BOOL_AND(NOT ({pred})) FROM (SELECT t.value AS v FROM json_each(COALESCE({array}, '[]')) AS t) AS e), TRUE)",
            pred = element_predicate,
            array = array_expr
        )
    }

    fn any_false(&self, array_expr: &str, element_predicate: &str) -> String {
        format!(
            "COALESCE((SELECT BOOL_OR(NOT ({pred})) FROM (SELECT t.value AS v FROM json_each(COALESCE({array}, '[]')) AS t) AS e), FALSE)",
            pred = element_predicate,
            array = array_expr
        )
    }

    // -- Existence ---------------------------------------------------------

    fn exists_check(&self, expr: &str, is_collection: bool) -> String {
        if is_collection {
            format!("(json_array_length({}) > 0)", expr)
        } else {
            format!("({} IS NOT NULL)", expr)
        }
    }

    fn empty_check(&self, expr: &str, is_collection: bool) -> String {
        if is_collection {
            format!("(COALESCE(json_array_length({}), 0) = 0)", expr)
        } else {
            format!("({} IS NULL)", expr)
        }
    }

    fn count_elements(&self, expr: &str, is_collection: bool) -> String {
        if is_collection {
            format!("COALESCE(json_array_length({}), 0)", expr)
        } else {
            format!("(CASE WHEN {} IS NULL THEN 0 ELSE 1 END)", expr)
        }
    }

    // -- Strings -----------------------------------------------------------

    fn string_concat(&self, left: &str, right: &str) -> String {
        format!("({} || {})", left, right)
    }

    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(len) => format!("SUBSTRING({}, ({}) + 1, {})", expr, start, len),
            None => format!("SUBSTRING({}, ({}) + 1)", expr, start),
        }
    }

    fn split_string(&self, expr: &str, delimiter: &str) -> String {
        format!(
            "CAST(to_json(string_split({}, {})) AS JSON)",
            expr, delimiter
        )
    }

    fn string_join(&self, array_expr: &str, separator: &str) -> String {
        format!(
            "(SELECT string_agg(json_extract_string(t.value, '$'), {} ORDER BY CAST(t.key AS INTEGER)) FROM json_each(COALESCE({}, '[]')) AS t)",
            separator, array_expr
        )
    }

    fn case_convert(&self, expr: &str, case: CaseKind) -> String {
        match case {
            CaseKind::Upper => format!("UPPER({})", expr),
            CaseKind::Lower => format!("LOWER({})", expr),
        }
    }

    fn trim(&self, expr: &str) -> String {
        format!("TRIM({})", expr)
    }

    fn char_array(&self, expr: &str) -> String {
        format!(
            "(CASE WHEN LENGTH({e}) = 0 THEN CAST('[]' AS JSON) ELSE CAST(to_json(string_split_regex({e}, '')) AS JSON) END)",
            e = expr
        )
    }

    fn contains_substring(&self, haystack: &str, needle: &str) -> String {
        format!("contains({}, {})", haystack, needle)
    }

    fn starts_with(&self, expr: &str, prefix: &str) -> String {
        format!("starts_with({}, {})", expr, prefix)
    }

    fn ends_with(&self, expr: &str, suffix: &str) -> String {
        format!("ends_with({}, {})", expr, suffix)
    }

    fn string_index_of(&self, haystack: &str, needle: &str) -> String {
        format!("(POSITION({} IN {}) - 1)", needle, haystack)
    }

    fn string_length(&self, expr: &str) -> String {
        format!("LENGTH({})", expr)
    }

    fn string_replace(&self, expr: &str, find: &str, replace: &str) -> String {
        format!("REPLACE({}, {}, {})", expr, find, replace)
    }

    fn regex_match(&self, expr: &str, pattern: &str) -> String {
        format!("regexp_matches({}, {})", expr, pattern)
    }

    fn regex_replace(&self, expr: &str, pattern: &str, substitution: &str) -> String {
        format!("regexp_replace({}, {}, {}, 'g')", expr, pattern, substitution)
    }

    // -- Arithmetic --------------------------------------------------------

    fn decimal_division(&self, numerator: &str, denominator: &str) -> String {
        format!(
            "(CASE WHEN ({den}) = 0 THEN NULL ELSE (CAST({num} AS DECIMAL(38,10)) / CAST({den} AS DECIMAL(38,10))) END)",
            num = numerator,
            den = denominator
        )
    }

    fn integer_division(&self, numerator: &str, denominator: &str) -> String {
        let quotient = format!(
            "(CAST({} AS DOUBLE) / CAST({} AS DOUBLE))",
            numerator, denominator
        );
        format!(
            "(CASE WHEN ({den}) = 0 THEN NULL \
             WHEN {q} >= 0 THEN CAST(floor({q}) AS BIGINT) \
             ELSE CAST(ceil({q}) AS BIGINT) END)",
            den = denominator,
            q = quotient
        )
    }

    fn modulo(&self, left: &str, right: &str) -> String {
        format!(
            "(CASE WHEN ({r}) = 0 THEN NULL ELSE (({l}) % ({r})) END)",
            l = left,
            r = right
        )
    }

    fn power(&self, base: &str, exponent: &str) -> String {
        format!("POWER({}, {})", base, exponent)
    }

    fn math_function(&self, function: MathFunction, args: &[String]) -> String {
        match function {
            MathFunction::Abs => format!("abs({})", args.join(", ")),
            MathFunction::Ceiling => format!("CAST(ceil({}) AS BIGINT)", args[0]),
            MathFunction::Floor => format!("CAST(floor({}) AS BIGINT)", args[0]),
            MathFunction::Round => format!("round({})", args.join(", ")),
            MathFunction::Sqrt => format!("sqrt({})", args[0]),
            MathFunction::Truncate => format!("CAST(trunc({}) AS BIGINT)", args[0]),
            MathFunction::Exp => format!("exp({})", args[0]),
            MathFunction::Ln => format!("ln({})", args[0]),
            MathFunction::Log => {
                if args.len() == 2 {
                    format!("(ln({}) / ln({}))", args[0], args[1])
                } else {
                    format!("log({})", args[0])
                }
            }
        }
    }

    // -- Casts -------------------------------------------------------------

    fn safe_cast(&self, expr: &str, target: CastType) -> String {
        let type_name = match target {
            CastType::Decimal => "DECIMAL(38,10)",
            CastType::Integer => "BIGINT",
            CastType::Boolean => "BOOLEAN",
            CastType::Date => "DATE",
            CastType::Timestamp => "TIMESTAMP",
            CastType::Time => "TIME",
        };
        format!("TRY_CAST({} AS {})", expr, type_name)
    }

    fn strict_cast(&self, expr: &str, target: CastType) -> String {
        let type_name = match target {
            CastType::Decimal => "DECIMAL(38,10)",
            CastType::Integer => "BIGINT",
            CastType::Boolean => "BOOLEAN",
            CastType::Date => "DATE",
            CastType::Timestamp => "TIMESTAMP",
            CastType::Time => "TIME",
        };
        format!("CAST({} AS {})", expr, type_name)
    }

    fn cast_to_text(&self, expr: &str) -> String {
        format!("CAST({} AS VARCHAR)", expr)
    }

    fn sql_type_of(&self, expr: &str) -> String {
        format!("typeof({})", expr)
    }

    // -- Temporal ----------------------------------------------------------

    fn date_literal(&self, value: &str) -> String {
        format!("DATE '{}'", escape_string(value))
    }

    fn datetime_literal(&self, value: &str) -> String {
        format!("TIMESTAMP '{}'", escape_string(value))
    }

    fn time_literal(&self, value: &str) -> String {
        format!("TIME '{}'", escape_string(value))
    }

    fn current_date(&self) -> String {
        "CURRENT_DATE".to_string()
    }

    fn current_timestamp(&self) -> String {
        "CURRENT_TIMESTAMP".to_string()
    }

    fn current_time(&self) -> String {
        "CURRENT_TIME".to_string()
    }

    fn date_diff(&self, unit: TemporalUnit, start: &str, end: &str) -> String {
        format!("date_diff('{}', {}, {})", unit.as_str(), start, end)
    }

    fn temporal_boundary(
        &self,
        expr: &str,
        kind: TemporalValueKind,
        unit: TemporalUnit,
        boundary: BoundaryKind,
    ) -> String {
        let unit_name = unit.as_str();
        match (kind, boundary) {
            (TemporalValueKind::Date, BoundaryKind::Low) => {
                format!("CAST(DATE_TRUNC('{}', {}) AS DATE)", unit_name, expr)
            }
            (TemporalValueKind::Date, BoundaryKind::High) => format!(
                "CAST(DATE_TRUNC('{u}', {e}) + INTERVAL 1 {u} - INTERVAL 1 DAY AS DATE)",
                u = unit_name,
                e = expr
            ),
            (TemporalValueKind::DateTime, BoundaryKind::Low) => {
                format!("DATE_TRUNC('{}', {})", unit_name, expr)
            }
            (TemporalValueKind::DateTime, BoundaryKind::High) => format!(
                "(DATE_TRUNC('{u}', {e}) + INTERVAL 1 {u} - INTERVAL 1 MICROSECOND)",
                u = unit_name,
                e = expr
            ),
            (TemporalValueKind::Time, BoundaryKind::Low) => format!(
                "CAST(DATE_TRUNC('{u}', TIMESTAMP '1970-01-01 00:00:00' + {e}) AS TIME)",
                u = unit_name,
                e = expr
            ),
            (TemporalValueKind::Time, BoundaryKind::High) => format!(
                "CAST(DATE_TRUNC('{u}', TIMESTAMP '1970-01-01 00:00:00' + {e}) + INTERVAL 1 {u} - INTERVAL 1 MICROSECOND AS TIME)",
                u = unit_name,
                e = expr
            ),
        }
    }

    fn decimal_boundary(
        &self,
        expr: &str,
        target_precision: Option<i64>,
        boundary: BoundaryKind,
    ) -> String {
        let input_precision = format!(
            "(CASE WHEN CAST({e} AS VARCHAR) LIKE '%.%' \
             THEN LENGTH(regexp_replace(CAST({e} AS VARCHAR), '^[^.]*\\.', '')) \
             ELSE 0 END)",
            e = expr
        );
        let target = match target_precision {
            Some(p) => p.to_string(),
            None => format!("CAST(LEAST({} + 5, 31) AS INTEGER)", input_precision),
        };
        let sign = match boundary {
            BoundaryKind::Low => "-",
            BoundaryKind::High => "+",
        };
        format!(
            "round(CAST({e} AS DECIMAL(38,10)) {sign} (0.5 * POWER(10, -({p}))), {t})",
            e = expr,
            sign = sign,
            p = input_precision,
            t = target
        )
    }

    // -- Logical -----------------------------------------------------------

    fn logical_xor(&self, left: &str, right: &str) -> String {
        format!("(({}) <> ({}))", left, right)
    }

    // -- Type operations ---------------------------------------------------

    fn json_type_check(&self, expr: &str, family: JsonTypeFamily) -> String {
        let json_type = format!("json_type(to_json({}))", expr);
        match family {
            JsonTypeFamily::String => format!("({} = 'VARCHAR')", json_type),
            JsonTypeFamily::Integer => format!(
                "({} IN ('BIGINT', 'UBIGINT', 'INTEGER', 'SMALLINT'))",
                json_type
            ),
            JsonTypeFamily::Decimal => {
                format!("({} IN ('DOUBLE', 'DECIMAL', 'REAL'))", json_type)
            }
            JsonTypeFamily::Boolean => format!("({} = 'BOOLEAN')", json_type),
            JsonTypeFamily::Object => format!("({} = 'OBJECT')", json_type),
            JsonTypeFamily::Array => format!("({} = 'ARRAY')", json_type),
        }
    }

    fn collection_type_filter(&self, array_expr: &str, family: JsonTypeFamily) -> String {
        let predicate = self.json_type_check("e.v", family);
        format!(
            "(SELECT CAST(COALESCE(to_json(list(e.v ORDER BY e.__idx)), '[]') AS JSON) \
             FROM (SELECT t.value AS v, CAST(t.key AS INTEGER) AS __idx \
                   FROM json_each(COALESCE({array}, '[]')) AS t) AS e \
             WHERE {predicate})",
            array = array_expr,
            predicate = predicate
        )
    }

    // -- Extensions --------------------------------------------------------

    fn filter_extension_by_url(&self, extensions_expr: &str, url: &str) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(t.value ORDER BY CAST(t.key AS INTEGER))), '[]') AS JSON) \
             FROM json_each(COALESCE({array}, '[]')) AS t \
             WHERE COALESCE(json_extract_string(t.value, '$.url'), '') = '{url}')",
            array = extensions_expr,
            url = escape_string(url)
        )
    }

    fn extract_extension_values(&self, extensions_expr: &str) -> String {
        let coalesce_fields = EXTENSION_VALUE_FIELDS
            .iter()
            .map(|field| format!("json_extract(t.value, '$.{}')", field))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "(SELECT CAST(COALESCE(to_json(list(p.__out ORDER BY p.__idx)), '[]') AS JSON) \
             FROM (SELECT COALESCE({fields}) AS __out, CAST(t.key AS INTEGER) AS __idx \
                   FROM json_each(COALESCE({array}, '[]')) AS t) AS p \
             WHERE p.__out IS NOT NULL)",
            fields = coalesce_fields,
            array = extensions_expr
        )
    }

    // -- Encoding ----------------------------------------------------------

    fn encode(&self, expr: &str, encoding: Encoding) -> String {
        match encoding {
            Encoding::Base64 => format!("to_base64(CAST({} AS BLOB))", expr),
            Encoding::UrlBase64 => format!(
                "REPLACE(REPLACE(to_base64(CAST({} AS BLOB)), '+', '-'), '/', '_')",
                expr
            ),
            Encoding::Hex => format!("hex(CAST({} AS BLOB))", expr),
        }
    }

    fn decode(&self, expr: &str, encoding: Encoding) -> String {
        match encoding {
            Encoding::Base64 => format!("CAST(from_base64({}) AS VARCHAR)", expr),
            Encoding::UrlBase64 => format!(
                "CAST(from_base64(REPLACE(REPLACE({}, '-', '+'), '_', '/')) AS VARCHAR)",
                expr
            ),
            Encoding::Hex => format!("CAST(from_hex({}) AS VARCHAR)", expr),
        }
    }

    fn escape(&self, expr: &str, target: EscapeTarget) -> String {
        match target {
            EscapeTarget::Html => format!(
                "REPLACE(REPLACE(REPLACE(REPLACE(REPLACE({}, '&', '&amp;'), '<', '&lt;'), '>', '&gt;'), '\"', '&quot;'), '''', '&#39;')",
                expr
            ),
            EscapeTarget::Json => format!(
                "REPLACE(REPLACE({}, '\\', '\\\\'), '\"', '\\\"')",
                expr
            ),
        }
    }

    fn unescape(&self, expr: &str, target: EscapeTarget) -> String {
        match target {
            EscapeTarget::Html => format!(
                "REPLACE(REPLACE(REPLACE(REPLACE(REPLACE({}, '&#39;', ''''), '&quot;', '\"'), '&gt;', '>'), '&lt;', '<'), '&amp;', '&')",
                expr
            ),
            EscapeTarget::Json => format!(
                "REPLACE(REPLACE({}, '\\\"', '\"'), '\\\\', '\\')",
                expr
            ),
        }
    }

    // -- JSON navigation ---------------------------------------------------

    fn json_children(&self, expr: &str) -> String {
        format!(
            "(SELECT CAST(COALESCE(to_json(list(t.value)), '[]') AS JSON) FROM json_each({}) AS t)",
            expr
        )
    }

    fn json_descendants(&self, expr: &str) -> String {
        format!(
            "(WITH RECURSIVE descendants AS (\
             SELECT t.value FROM json_each({e}) AS t \
             UNION ALL \
             SELECT d.value \
             FROM descendants c, \
                  json_each(CASE WHEN json_type(c.value) IN ('OBJECT', 'ARRAY') THEN c.value ELSE NULL END) AS d) \
             SELECT CAST(COALESCE(to_json(list(value)), '[]') AS JSON) FROM descendants)",
            e = expr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> DuckDbDialect {
        DuckDbDialect::in_memory().expect("in-memory duckdb")
    }

    #[test]
    fn primitive_value_uses_coalesce_pattern() {
        let d = dialect();
        let sql = d.extract_primitive_value("resource", "$.birthDate");
        assert!(sql.starts_with("COALESCE(json_extract_string"));
        assert!(sql.contains("$.birthDate.value"));
        assert!(sql.contains("'$.birthDate')"));
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        let d = dialect();
        let rows = d
            .execute(&format!("SELECT {}", d.integer_division("-7", "2")))
            .unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("-3"));
        let rows = d
            .execute(&format!("SELECT {}", d.integer_division("7", "2")))
            .unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("3"));
    }

    #[test]
    fn division_by_zero_is_null() {
        let d = dialect();
        let rows = d
            .execute(&format!("SELECT {}", d.integer_division("5", "0")))
            .unwrap();
        assert_eq!(rows[0][0], None);
    }

    #[test]
    fn distinct_preserves_first_occurrence_order() {
        let d = dialect();
        let sql = format!("SELECT {}", d.distinct("'[3,1,3,2,1]'"));
        let rows = d.execute(&sql).unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("[3,1,2]"));
    }

    #[test]
    fn project_flattens_one_level() {
        let d = dialect();
        let arr = r#"'[{"given":["John","Q"]},{"given":["Jane"]}]'"#;
        let sql = format!("SELECT {}", d.project_json_array(arr, &["given"]));
        let rows = d.execute(&sql).unwrap();
        assert_eq!(rows[0][0].as_deref(), Some(r#"["John","Q","Jane"]"#));
    }

    #[test]
    fn filter_keeps_matching_elements() {
        let d = dialect();
        let arr = r#"'[{"use":"official"},{"use":"nickname"}]'"#;
        let predicate = "json_extract_string(e.item, '$.use') = 'official'";
        let sql = format!("SELECT {}", d.filter_json_array(arr, "item", predicate));
        let rows = d.execute(&sql).unwrap();
        assert_eq!(rows[0][0].as_deref(), Some(r#"[{"use":"official"}]"#));
    }

    #[test]
    fn quantifiers_respect_empty_collection_defaults() {
        let d = dialect();
        let truthy = "CAST(json_extract_string(v, '$') AS BOOLEAN)";
        let rows = d
            .execute(&format!("SELECT {}", d.all_true("'[]'", truthy)))
            .unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("true"));
        let rows = d
            .execute(&format!("SELECT {}", d.any_true("'[]'", truthy)))
            .unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("false"));
    }

    #[test]
    fn safe_cast_swallows_and_strict_cast_raises() {
        let d = dialect();
        let rows = d
            .execute(&format!(
                "SELECT {}",
                d.safe_cast("'abc'", CastType::Integer)
            ))
            .unwrap();
        assert_eq!(rows[0][0], None);
        assert!(d
            .execute(&format!(
                "SELECT {}",
                d.strict_cast("'abc'", CastType::Integer)
            ))
            .is_err());
    }

    #[test]
    fn invalid_type_cast_fails_at_execution() {
        let d = dialect();
        let sql = format!("SELECT {}", d.invalid_type_cast("'x'", "NotAType"));
        assert!(d.execute(&sql).is_err());
    }

    #[test]
    fn base64_round_trip() {
        let d = dialect();
        let encoded = d.encode("'hello world'", Encoding::Base64);
        let round = d.decode(&encoded, Encoding::Base64);
        let rows = d.execute(&format!("SELECT {}", round)).unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("hello world"));
    }

    #[test]
    fn array_skip_take_last() {
        let d = dialect();
        let rows = d
            .execute(&format!("SELECT {}", d.array_skip("'[1,2,3,4]'", "2")))
            .unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("[3,4]"));
        let rows = d
            .execute(&format!("SELECT {}", d.array_take("'[1,2,3,4]'", "2")))
            .unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("[1,2]"));
        let rows = d
            .execute(&format!("SELECT {}", d.array_last("'[1,2,3]'")))
            .unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("3"));
    }
}
