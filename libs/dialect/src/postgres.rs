//! PostgreSQL dialect
//!
//! Transactional engine with native JSONB. Emission leans on
//! `jsonb_extract_path` / `jsonb_array_elements ... WITH ORDINALITY` /
//! `jsonb_agg` and regex-guarded safe casts (PostgreSQL has no TRY_CAST).
//! Execution goes through the fixed-capacity pool; every statement runs in
//! its own transaction, rolled back before the connection is released on
//! error. Connection-class failures are retried with exponential backoff.

use crate::dialect::{
    escape_string, BoundaryKind, Capabilities, CaseKind, CastType, Dialect, DialectKind, Encoding,
    EscapeTarget, JsonTypeFamily, MathFunction, Row, TemporalUnit, TemporalValueKind,
    EXTENSION_VALUE_FIELDS,
};
use crate::error::{DialectError, Result};
use crate::pool::{ClientPool, PoolConfig};
use crate::retry::RetryPolicy;
use postgres::SimpleQueryMessage;
use tracing::debug;

/// PostgreSQL-backed dialect.
pub struct PostgresDialect {
    pool: ClientPool,
    retry: RetryPolicy,
}

impl PostgresDialect {
    pub fn connect(config: PoolConfig) -> Self {
        Self {
            pool: ClientPool::new(config),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(config: PoolConfig, retry: RetryPolicy) -> Self {
        Self {
            pool: ClientPool::new(config),
            retry,
        }
    }

    /// `$.a.b` → `'a', 'b'` for jsonb_extract_path argument lists.
    fn path_args(path: &str) -> String {
        path.trim_start_matches('$')
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| format!("'{}'", escape_string(part)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn jsonb(expr: &str) -> String {
        format!("({})::jsonb", expr)
    }

    fn classify(error: postgres::Error) -> DialectError {
        if error.as_db_error().is_some() {
            DialectError::Execution(error.to_string())
        } else {
            DialectError::Connection(error.to_string())
        }
    }

    fn run_in_transaction<T>(
        &self,
        sql: &str,
        collect: impl Fn(&mut postgres::Client, &str) -> std::result::Result<T, postgres::Error>,
    ) -> Result<T> {
        let mut guard = self.pool.acquire()?;
        let client = guard.client();

        if let Err(e) = client.batch_execute("BEGIN") {
            guard.mark_broken();
            return Err(DialectError::Connection(e.to_string()));
        }

        match collect(client, sql) {
            Ok(value) => match client.batch_execute("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    guard.mark_broken();
                    Err(DialectError::Connection(e.to_string()))
                }
            },
            Err(e) => {
                // Roll back before the guard releases the connection.
                if client.batch_execute("ROLLBACK").is_err() {
                    guard.mark_broken();
                }
                let classified = Self::classify(e);
                if matches!(classified, DialectError::Connection(_)) {
                    guard.mark_broken();
                }
                Err(classified)
            }
        }
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_jsonb: true,
            native_array_ops: false,
            lateral_requires_keyword: true,
        }
    }

    fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql, "executing on postgresql");
        self.retry.run(|| {
            self.run_in_transaction(sql, |client, sql| {
                let messages = client.simple_query(sql)?;
                let mut rows = Vec::new();
                for message in messages {
                    if let SimpleQueryMessage::Row(row) = message {
                        let mut cells = Vec::with_capacity(row.len());
                        for i in 0..row.len() {
                            cells.push(row.get(i).map(str::to_string));
                        }
                        rows.push(cells);
                    }
                }
                Ok(rows)
            })
        })
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        debug!(sql, "executing batch on postgresql");
        self.retry
            .run(|| self.run_in_transaction(sql, |client, sql| client.batch_execute(sql)))
    }

    // -- JSON field access -------------------------------------------------

    fn extract_json_text(&self, column: &str, path: &str) -> String {
        format!(
            "jsonb_extract_path_text({}, {})",
            Self::jsonb(column),
            Self::path_args(path)
        )
    }

    fn extract_json_object(&self, column: &str, path: &str) -> String {
        format!(
            "jsonb_extract_path({}, {})",
            Self::jsonb(column),
            Self::path_args(path)
        )
    }

    fn json_exists(&self, column: &str, path: &str) -> String {
        format!(
            "(jsonb_extract_path({}, {}) IS NOT NULL)",
            Self::jsonb(column),
            Self::path_args(path)
        )
    }

    fn extract_primitive_value(&self, column: &str, path: &str) -> String {
        let complex = format!("{}.value", path);
        format!(
            "COALESCE(jsonb_extract_path_text({col}, {complex}), jsonb_extract_path_text({col}, {simple}))",
            col = Self::jsonb(column),
            complex = Self::path_args(&complex),
            simple = Self::path_args(path)
        )
    }

    fn json_type_of(&self, expr: &str) -> String {
        format!("jsonb_typeof({})", Self::jsonb(expr))
    }

    fn json_array_length(&self, expr: &str) -> String {
        format!("jsonb_array_length({})", Self::jsonb(expr))
    }

    fn to_json(&self, expr: &str) -> String {
        format!("to_jsonb({})", expr)
    }

    fn json_unquote(&self, expr: &str) -> String {
        format!("({} #>> '{{}}')", Self::jsonb(expr))
    }

    fn create_json_object(&self, pairs: &[(String, String)]) -> String {
        let args = pairs
            .iter()
            .map(|(key, value)| format!("'{}', {}", escape_string(key), value))
            .collect::<Vec<_>>()
            .join(", ");
        format!("jsonb_build_object({})", args)
    }

    // -- Array operations --------------------------------------------------

    fn enumerate_json_array(
        &self,
        array_expr: &str,
        value_alias: &str,
        index_alias: &str,
    ) -> String {
        format!(
            "SELECT t.value AS {value}, (t.ordinality - 1) AS {index} \
             FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality)",
            value = value_alias,
            index = index_alias,
            array = Self::jsonb(array_expr)
        )
    }

    fn lateral_unnest(&self, array_expr: &str, alias: &str) -> String {
        format!(
            "LATERAL jsonb_array_elements(COALESCE({}, '[]'::jsonb)) WITH ORDINALITY AS {}(value, ordinality)",
            Self::jsonb(array_expr),
            alias
        )
    }

    fn aggregate_to_json_array(&self, expr: &str) -> String {
        format!("COALESCE(jsonb_agg({}), '[]'::jsonb)", expr)
    }

    fn aggregate_to_json_array_ordered(&self, expr: &str, order_by: &str) -> String {
        format!(
            "COALESCE(jsonb_agg({} ORDER BY {}), '[]'::jsonb)",
            expr, order_by
        )
    }

    fn json_array_contains(&self, array_expr: &str, scalar_expr: &str) -> String {
        format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements(COALESCE({}, '[]'::jsonb)) AS t(value) \
             WHERE btrim(t.value::text, '\"') = {})",
            Self::jsonb(array_expr),
            scalar_expr
        )
    }

    fn empty_json_array(&self) -> String {
        "'[]'::jsonb".to_string()
    }

    fn is_json_array(&self, expr: &str) -> String {
        format!(
            "(CASE WHEN ({e}) IS NULL THEN NULL ELSE jsonb_typeof({j}) = 'array' END)",
            e = expr,
            j = Self::jsonb(expr)
        )
    }

    fn wrap_json_array(&self, expr: &str) -> String {
        format!("jsonb_build_array({})", expr)
    }

    fn create_json_array(&self, elements: &[String]) -> String {
        format!("jsonb_build_array({})", elements.join(", "))
    }

    fn array_sort(&self, array_expr: &str, ascending: bool) -> String {
        let direction = if ascending { "ASC" } else { "DESC" };
        format!(
            "(SELECT COALESCE(jsonb_agg(t.value ORDER BY (CASE WHEN t.value::text ~ '^-?[0-9.]+$' THEN (t.value::text)::numeric END) {dir} NULLS LAST, btrim(t.value::text, '\"') {dir}), '[]'::jsonb) \
             FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) AS t(value))",
            dir = direction,
            array = Self::jsonb(array_expr)
        )
    }

    fn array_skip(&self, array_expr: &str, count: &str) -> String {
        format!(
            "(SELECT COALESCE(jsonb_agg(t.value ORDER BY t.ordinality), '[]'::jsonb) \
             FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality) \
             WHERE (t.ordinality - 1) >= ({count}))",
            array = Self::jsonb(array_expr),
            count = count
        )
    }

    fn array_take(&self, array_expr: &str, count: &str) -> String {
        format!(
            "(SELECT COALESCE(jsonb_agg(t.value ORDER BY t.ordinality), '[]'::jsonb) \
             FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality) \
             WHERE (t.ordinality - 1) < ({count}))",
            array = Self::jsonb(array_expr),
            count = count
        )
    }

    fn array_last(&self, array_expr: &str) -> String {
        format!(
            "(SELECT t.value FROM jsonb_array_elements(COALESCE({}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality) \
             ORDER BY t.ordinality DESC LIMIT 1)",
            Self::jsonb(array_expr)
        )
    }

    fn array_element_at(&self, array_expr: &str, index: &str) -> String {
        format!("({} -> ({})::int)", Self::jsonb(array_expr), index)
    }

    fn array_to_string(&self, array_expr: &str, separator: &str) -> String {
        format!(
            "(SELECT string_agg(t.value, {} ORDER BY t.ordinality) \
             FROM jsonb_array_elements_text(COALESCE({}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality))",
            separator,
            Self::jsonb(array_expr)
        )
    }

    fn project_json_array(&self, array_expr: &str, path: &[&str]) -> String {
        let path_args = path
            .iter()
            .map(|part| format!("'{}'", escape_string(part)))
            .collect::<Vec<_>>()
            .join(", ");
        let member = format!("jsonb_extract_path(b.value, {})", path_args);
        format!(
            "(SELECT COALESCE(jsonb_agg(x.value ORDER BY x.base_idx, x.sub_idx), '[]'::jsonb) \
             FROM (SELECT (b.ordinality - 1) AS base_idx, (s.ordinality - 1) AS sub_idx, s.value AS value \
                   FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) WITH ORDINALITY AS b(value, ordinality) \
                   CROSS JOIN LATERAL jsonb_array_elements(CASE WHEN jsonb_typeof({member}) = 'array' \
                                                               THEN {member} \
                                                               ELSE jsonb_build_array({member}) END) \
                        WITH ORDINALITY AS s(value, ordinality) \
                   WHERE {member} IS NOT NULL) AS x)",
            array = Self::jsonb(array_expr),
            member = member
        )
    }

    fn filter_json_array(
        &self,
        array_expr: &str,
        element_alias: &str,
        predicate_sql: &str,
    ) -> String {
        format!(
            "(SELECT COALESCE(jsonb_agg(e.{alias} ORDER BY e.__idx), '[]'::jsonb) \
             FROM (SELECT t.value AS {alias}, (t.ordinality - 1) AS __idx \
                   FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality)) AS e \
             WHERE {predicate})",
            alias = element_alias,
            array = Self::jsonb(array_expr),
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
            "(SELECT COALESCE(jsonb_agg(p.__out ORDER BY p.__idx), '[]'::jsonb) \
             FROM (SELECT {projection} AS __out, e.__idx \
                   FROM (SELECT t.value AS {alias}, (t.ordinality - 1) AS __idx \
                         FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality)) AS e) AS p \
             WHERE p.__out IS NOT NULL)",
            projection = projection_sql,
            alias = element_alias,
            array = Self::jsonb(array_expr)
        )
    }

    fn collection_combine(&self, first: &str, second: &str) -> String {
        format!(
            "(COALESCE({}, '[]'::jsonb) || COALESCE({}, '[]'::jsonb))",
            Self::jsonb(first),
            Self::jsonb(second)
        )
    }

    fn collection_exclude(&self, first: &str, second: &str) -> String {
        format!(
            "(SELECT COALESCE(jsonb_agg(t.value ORDER BY t.ordinality), '[]'::jsonb) \
             FROM jsonb_array_elements(COALESCE({a}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality) \
             WHERE NOT EXISTS (SELECT 1 FROM jsonb_array_elements(COALESCE({b}, '[]'::jsonb)) AS o(value) \
                               WHERE o.value = t.value))",
            a = Self::jsonb(first),
            b = Self::jsonb(second)
        )
    }

    fn collection_intersect(&self, first: &str, second: &str) -> String {
        format!(
            "(SELECT COALESCE(jsonb_agg(g.value ORDER BY g.first_idx), '[]'::jsonb) \
             FROM (SELECT t.value AS value, MIN(t.ordinality) AS first_idx \
                   FROM jsonb_array_elements(COALESCE({a}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality) \
                   WHERE EXISTS (SELECT 1 FROM jsonb_array_elements(COALESCE({b}, '[]'::jsonb)) AS o(value) \
                                 WHERE o.value = t.value) \
                   GROUP BY t.value) AS g)",
            a = Self::jsonb(first),
            b = Self::jsonb(second)
        )
    }

    fn distinct(&self, array_expr: &str) -> String {
        format!(
            "(SELECT COALESCE(jsonb_agg(g.value ORDER BY g.first_idx), '[]'::jsonb) \
             FROM (SELECT t.value AS value, MIN(t.ordinality) AS first_idx \
                   FROM jsonb_array_elements(COALESCE({}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality) \
                   GROUP BY t.value) AS g)",
            Self::jsonb(array_expr)
        )
    }

    fn is_distinct(&self, array_expr: &str) -> String {
        format!(
            "(SELECT COUNT(*) = COUNT(DISTINCT t.value) \
             FROM jsonb_array_elements(COALESCE({}, '[]'::jsonb)) AS t(value))",
            Self::jsonb(array_expr)
        )
    }

    // -- Quantifiers -------------------------------------------------------

    fn all_true(&self, array_expr: &str, element_predicate: &str) -> String {
        format!(
            "COALESCE((SELECT BOOL_AND({pred}) FROM (SELECT t.value AS v \
             FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) AS t(value)) AS e), TRUE)",
            pred = element_predicate,
            array = Self::jsonb(array_expr)
        )
    }

    fn any_true(&self, array_expr: &str, element_predicate: &str) -> String {
        format!(
            "COALESCE((SELECT BOOL_OR({pred}) FROM (SELECT t.value AS v \
             FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) AS t(value)) AS e), FALSE)",
            pred = element_predicate,
            array = Self::jsonb(array_expr)
        )
    }

    fn all_false(&self, array_expr: &str, element_predicate: &str) -> String {
        format!(
            "COALESCE((SELECT BOOL_AND(NOT ({pred})) FROM (SELECT t.value AS v \
             FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) AS t(value)) AS e), TRUE)",
            pred = element_predicate,
            array = Self::jsonb(array_expr)
        )
    }

    fn any_false(&self, array_expr: &str, element_predicate: &str) -> String {
        format!(
            "COALESCE((SELECT BOOL_OR(NOT ({pred})) FROM (SELECT t.value AS v \
             FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) AS t(value)) AS e), FALSE)",
            pred = element_predicate,
            array = Self::jsonb(array_expr)
        )
    }

    // -- Existence ---------------------------------------------------------

    fn exists_check(&self, expr: &str, is_collection: bool) -> String {
        if is_collection {
            format!("(jsonb_array_length({}) > 0)", Self::jsonb(expr))
        } else {
            format!("({} IS NOT NULL)", expr)
        }
    }

    fn empty_check(&self, expr: &str, is_collection: bool) -> String {
        if is_collection {
            format!(
                "(COALESCE(jsonb_array_length({}), 0) = 0)",
                Self::jsonb(expr)
            )
        } else {
            format!("({} IS NULL)", expr)
        }
    }

    fn count_elements(&self, expr: &str, is_collection: bool) -> String {
        if is_collection {
            format!("COALESCE(jsonb_array_length({}), 0)", Self::jsonb(expr))
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
            Some(len) => format!(
                "SUBSTRING({} FROM ({}) + 1 FOR ({}))",
                expr, start, len
            ),
            None => format!("SUBSTRING({} FROM ({}) + 1)", expr, start),
        }
    }

    fn split_string(&self, expr: &str, delimiter: &str) -> String {
        format!("to_jsonb(string_to_array({}, {}))", expr, delimiter)
    }

    fn string_join(&self, array_expr: &str, separator: &str) -> String {
        format!(
            "(SELECT string_agg(t.value, {} ORDER BY t.ordinality) \
             FROM jsonb_array_elements_text(COALESCE({}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality))",
            separator,
            Self::jsonb(array_expr)
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
            "(CASE WHEN LENGTH({e}) = 0 THEN '[]'::jsonb ELSE to_jsonb(regexp_split_to_array({e}, '')) END)",
            e = expr
        )
    }

    fn contains_substring(&self, haystack: &str, needle: &str) -> String {
        format!("(POSITION({} IN {}) > 0)", needle, haystack)
    }

    fn starts_with(&self, expr: &str, prefix: &str) -> String {
        format!("(LEFT({e}, LENGTH({p})) = {p})", e = expr, p = prefix)
    }

    fn ends_with(&self, expr: &str, suffix: &str) -> String {
        format!("(RIGHT({e}, LENGTH({s})) = {s})", e = expr, s = suffix)
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
        format!("({} ~ {})", expr, pattern)
    }

    fn regex_replace(&self, expr: &str, pattern: &str, substitution: &str) -> String {
        format!("regexp_replace({}, {}, {}, 'g')", expr, pattern, substitution)
    }

    // -- Arithmetic --------------------------------------------------------

    fn decimal_division(&self, numerator: &str, denominator: &str) -> String {
        format!(
            "(CASE WHEN ({den}) = 0 THEN NULL ELSE (({num})::numeric / ({den})::numeric) END)",
            num = numerator,
            den = denominator
        )
    }

    fn integer_division(&self, numerator: &str, denominator: &str) -> String {
        let quotient = format!("(({})::numeric / ({})::numeric)", numerator, denominator);
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
        match target {
            CastType::Decimal => format!(
                "(CASE WHEN ({e})::text ~ '^[+-]?[0-9]+(\\.[0-9]+)?([eE][+-]?[0-9]+)?$' THEN ({e})::numeric ELSE NULL END)",
                e = expr
            ),
            CastType::Integer => format!(
                "(CASE WHEN ({e})::text ~ '^[+-]?[0-9]+$' THEN ({e})::bigint ELSE NULL END)",
                e = expr
            ),
            CastType::Boolean => format!(
                "(CASE WHEN LOWER(({e})::text) IN ('true', 't', '1') THEN TRUE \
                 WHEN LOWER(({e})::text) IN ('false', 'f', '0') THEN FALSE \
                 ELSE NULL END)",
                e = expr
            ),
            CastType::Date => format!(
                "(CASE WHEN ({e})::text ~ '^\\d{{4}}-\\d{{2}}-\\d{{2}}' THEN (SUBSTRING(({e})::text FROM 1 FOR 10))::date ELSE NULL END)",
                e = expr
            ),
            CastType::Timestamp => format!(
                "(CASE WHEN ({e})::text ~ '^\\d{{4}}-\\d{{2}}-\\d{{2}}([T ].*)?$' THEN REPLACE(({e})::text, 'T', ' ')::timestamp ELSE NULL END)",
                e = expr
            ),
            CastType::Time => format!(
                "(CASE WHEN ({e})::text ~ '^\\d{{2}}:\\d{{2}}(:\\d{{2}}(\\.\\d+)?)?$' THEN (({e})::text)::time ELSE NULL END)",
                e = expr
            ),
        }
    }

    fn strict_cast(&self, expr: &str, target: CastType) -> String {
        let type_name = match target {
            CastType::Decimal => "numeric",
            CastType::Integer => "bigint",
            CastType::Boolean => "boolean",
            CastType::Date => "date",
            CastType::Timestamp => "timestamp",
            CastType::Time => "time",
        };
        format!("(({})::{})", expr, type_name)
    }

    fn cast_to_text(&self, expr: &str) -> String {
        format!("(({})::text)", expr)
    }

    fn sql_type_of(&self, expr: &str) -> String {
        format!("(pg_typeof({})::text)", expr)
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
        match unit {
            TemporalUnit::Year => format!(
                "CAST(DATE_PART('year', AGE(({})::timestamp, ({})::timestamp)) AS BIGINT)",
                end, start
            ),
            TemporalUnit::Month => format!(
                "CAST(DATE_PART('year', AGE(({e})::timestamp, ({s})::timestamp)) * 12 \
                 + DATE_PART('month', AGE(({e})::timestamp, ({s})::timestamp)) AS BIGINT)",
                e = end,
                s = start
            ),
            TemporalUnit::Day => format!(
                "CAST(FLOOR(EXTRACT(EPOCH FROM (({})::timestamp - ({})::timestamp)) / 86400) AS BIGINT)",
                end, start
            ),
            TemporalUnit::Hour => format!(
                "CAST(FLOOR(EXTRACT(EPOCH FROM (({})::timestamp - ({})::timestamp)) / 3600) AS BIGINT)",
                end, start
            ),
            TemporalUnit::Minute => format!(
                "CAST(FLOOR(EXTRACT(EPOCH FROM (({})::timestamp - ({})::timestamp)) / 60) AS BIGINT)",
                end, start
            ),
            TemporalUnit::Second => format!(
                "CAST(FLOOR(EXTRACT(EPOCH FROM (({})::timestamp - ({})::timestamp))) AS BIGINT)",
                end, start
            ),
            TemporalUnit::Millisecond => format!(
                "CAST(FLOOR(EXTRACT(EPOCH FROM (({})::timestamp - ({})::timestamp)) * 1000) AS BIGINT)",
                end, start
            ),
        }
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
                format!("(DATE_TRUNC('{}', ({})::timestamp))::date", unit_name, expr)
            }
            (TemporalValueKind::Date, BoundaryKind::High) => format!(
                "(DATE_TRUNC('{u}', ({e})::timestamp) + INTERVAL '1 {u}' - INTERVAL '1 day')::date",
                u = unit_name,
                e = expr
            ),
            (TemporalValueKind::DateTime, BoundaryKind::Low) => {
                format!("DATE_TRUNC('{}', ({})::timestamp)", unit_name, expr)
            }
            (TemporalValueKind::DateTime, BoundaryKind::High) => format!(
                "(DATE_TRUNC('{u}', ({e})::timestamp) + INTERVAL '1 {u}' - INTERVAL '1 microsecond')",
                u = unit_name,
                e = expr
            ),
            (TemporalValueKind::Time, BoundaryKind::Low) => format!(
                "(DATE_TRUNC('{u}', TIMESTAMP '1970-01-01 00:00:00' + ({e})::time))::time",
                u = unit_name,
                e = expr
            ),
            (TemporalValueKind::Time, BoundaryKind::High) => format!(
                "(DATE_TRUNC('{u}', TIMESTAMP '1970-01-01 00:00:00' + ({e})::time) + INTERVAL '1 {u}' - INTERVAL '1 microsecond')::time",
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
            "(CASE WHEN ({e})::text LIKE '%.%' \
             THEN LENGTH(regexp_replace(({e})::text, '^[^.]*\\.', '')) \
             ELSE 0 END)",
            e = expr
        );
        let target = match target_precision {
            Some(p) => p.to_string(),
            None => format!("LEAST({} + 5, 31)::int", input_precision),
        };
        let sign = match boundary {
            BoundaryKind::Low => "-",
            BoundaryKind::High => "+",
        };
        format!(
            "round(({e})::numeric {sign} (0.5 * POWER(10, -({p})))::numeric, {t})",
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
        let json_type = format!("jsonb_typeof({})", Self::jsonb(expr));
        match family {
            JsonTypeFamily::String => format!("({} = 'string')", json_type),
            JsonTypeFamily::Integer => format!(
                "({} = 'number' AND ({})::text ~ '^-?[0-9]+$')",
                json_type,
                Self::jsonb(expr)
            ),
            JsonTypeFamily::Decimal => format!("({} = 'number')", json_type),
            JsonTypeFamily::Boolean => format!("({} = 'boolean')", json_type),
            JsonTypeFamily::Object => format!("({} = 'object')", json_type),
            JsonTypeFamily::Array => format!("({} = 'array')", json_type),
        }
    }

    fn collection_type_filter(&self, array_expr: &str, family: JsonTypeFamily) -> String {
        let predicate = self.json_type_check("e.v", family);
        format!(
            "(SELECT COALESCE(jsonb_agg(e.v ORDER BY e.__idx), '[]'::jsonb) \
             FROM (SELECT t.value AS v, (t.ordinality - 1) AS __idx \
                   FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality)) AS e \
             WHERE {predicate})",
            array = Self::jsonb(array_expr),
            predicate = predicate
        )
    }

    // -- Extensions --------------------------------------------------------

    fn filter_extension_by_url(&self, extensions_expr: &str, url: &str) -> String {
        format!(
            "(SELECT COALESCE(jsonb_agg(t.value ORDER BY t.ordinality), '[]'::jsonb) \
             FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality) \
             WHERE COALESCE(t.value->>'url', '') = '{url}')",
            array = Self::jsonb(extensions_expr),
            url = escape_string(url)
        )
    }

    fn extract_extension_values(&self, extensions_expr: &str) -> String {
        let coalesce_fields = EXTENSION_VALUE_FIELDS
            .iter()
            .map(|field| format!("t.value->'{}'", field))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "(SELECT COALESCE(jsonb_agg(p.__out ORDER BY p.__idx), '[]'::jsonb) \
             FROM (SELECT COALESCE({fields}) AS __out, (t.ordinality - 1) AS __idx \
                   FROM jsonb_array_elements(COALESCE({array}, '[]'::jsonb)) WITH ORDINALITY AS t(value, ordinality)) AS p \
             WHERE p.__out IS NOT NULL)",
            fields = coalesce_fields,
            array = Self::jsonb(extensions_expr)
        )
    }

    // -- Encoding ----------------------------------------------------------

    fn encode(&self, expr: &str, encoding: Encoding) -> String {
        match encoding {
            Encoding::Base64 => format!("encode(convert_to({}, 'UTF8'), 'base64')", expr),
            Encoding::UrlBase64 => format!(
                "TRANSLATE(encode(convert_to({}, 'UTF8'), 'base64'), '+/', '-_')",
                expr
            ),
            Encoding::Hex => format!("encode(convert_to({}, 'UTF8'), 'hex')", expr),
        }
    }

    fn decode(&self, expr: &str, encoding: Encoding) -> String {
        match encoding {
            Encoding::Base64 => format!("convert_from(decode({}, 'base64'), 'UTF8')", expr),
            Encoding::UrlBase64 => format!(
                "convert_from(decode(TRANSLATE({}, '-_', '+/'), 'base64'), 'UTF8')",
                expr
            ),
            Encoding::Hex => format!("convert_from(decode({}, 'hex'), 'UTF8')", expr),
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
            "(SELECT COALESCE(jsonb_agg(c.value), '[]'::jsonb) FROM (\
             SELECT value FROM jsonb_each(CASE WHEN jsonb_typeof({j}) = 'object' THEN {j} ELSE '{{}}'::jsonb END) \
             UNION ALL \
             SELECT value FROM jsonb_array_elements(CASE WHEN jsonb_typeof({j}) = 'array' THEN {j} ELSE '[]'::jsonb END)\
             ) AS c)",
            j = Self::jsonb(expr)
        )
    }

    fn json_descendants(&self, expr: &str) -> String {
        format!(
            "(WITH RECURSIVE descendants AS (\
             SELECT c.value FROM (\
             SELECT value FROM jsonb_each(CASE WHEN jsonb_typeof({j}) = 'object' THEN {j} ELSE '{{}}'::jsonb END) \
             UNION ALL \
             SELECT value FROM jsonb_array_elements(CASE WHEN jsonb_typeof({j}) = 'array' THEN {j} ELSE '[]'::jsonb END)\
             ) AS c \
             UNION ALL \
             SELECT n.value FROM descendants d CROSS JOIN LATERAL (\
             SELECT value FROM jsonb_each(CASE WHEN jsonb_typeof(d.value) = 'object' THEN d.value ELSE '{{}}'::jsonb END) \
             UNION ALL \
             SELECT value FROM jsonb_array_elements(CASE WHEN jsonb_typeof(d.value) = 'array' THEN d.value ELSE '[]'::jsonb END)\
             ) AS n) \
             SELECT COALESCE(jsonb_agg(value), '[]'::jsonb) FROM descendants)",
            j = Self::jsonb(expr)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> PostgresDialect {
        // Emission-only tests never touch the pool.
        PostgresDialect::connect(PoolConfig::new("host=localhost user=test"))
    }

    #[test]
    fn path_args_split() {
        assert_eq!(PostgresDialect::path_args("$.name.family"), "'name', 'family'");
        assert_eq!(PostgresDialect::path_args("$.id"), "'id'");
    }

    #[test]
    fn primitive_value_uses_coalesce_pattern() {
        let d = dialect();
        let sql = d.extract_primitive_value("resource", "$.birthDate");
        assert!(sql.starts_with("COALESCE(jsonb_extract_path_text"));
        assert!(sql.contains("'birthDate', 'value'"));
        assert!(sql.ends_with("'birthDate'))"));
    }

    #[test]
    fn enumerate_uses_ordinality() {
        let d = dialect();
        let sql = d.enumerate_json_array("arr", "v", "idx");
        assert!(sql.contains("WITH ORDINALITY"));
        assert!(sql.contains("(t.ordinality - 1) AS idx"));
    }

    #[test]
    fn safe_casts_are_regex_guarded() {
        let d = dialect();
        let sql = d.safe_cast("x", CastType::Integer);
        assert!(sql.contains("~ '^[+-]?[0-9]+$'"));
        assert!(sql.contains("ELSE NULL"));
        let strict = d.strict_cast("x", CastType::Integer);
        assert!(!strict.contains("CASE"));
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        let d = dialect();
        let sql = d.integer_division("a", "b");
        assert!(sql.contains("floor"));
        assert!(sql.contains("ceil"));
        assert!(sql.contains("WHEN (b) = 0 THEN NULL"));
    }

    #[test]
    fn regex_match_uses_tilde_operator() {
        let d = dialect();
        assert_eq!(d.regex_match("name", "'^[A-Z]'"), "(name ~ '^[A-Z]')");
    }

    #[test]
    fn extension_filter_escapes_url() {
        let d = dialect();
        let sql = d.filter_extension_by_url("exts", "http://x/y'z");
        assert!(sql.contains("http://x/y''z"));
    }

    #[test]
    fn emission_is_deterministic() {
        let d = dialect();
        assert_eq!(
            d.project_json_array("arr", &["name", "given"]),
            d.project_json_array("arr", &["name", "given"])
        );
    }

    #[test]
    fn quantifier_defaults() {
        let d = dialect();
        assert!(d.all_true("arr", "v = 'true'").ends_with("TRUE)"));
        assert!(d.any_true("arr", "v = 'true'").ends_with("FALSE)"));
    }
}
