//! Function translation
//!
//! One handler per FHIRPath function, dispatched by name with arity
//! checking. Unknown names and wrong arities are translation errors
//! carrying the node's source slice. Semantics live here; tokens come
//! from the dialect.

use crate::error::{Result, TranslationError};
use crate::fragment::{Fragment, ResultShape, ScalarType};
use crate::translator::{unit_for_precision, value_kind_for, Translator};
use basalt_dialect::{BoundaryKind, CaseKind, CastType, Encoding, EscapeTarget, MathFunction};
use basalt_fhirpath::{ExprKind, ExprNode, LiteralValue};

pub(crate) fn visit_function(
    tr: &mut Translator<'_>,
    node: &ExprNode,
    name: &str,
    target: Option<&ExprNode>,
    arguments: &[ExprNode],
) -> Result<Fragment> {
    let arity = |expected: &str, ok: bool| -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(tr.wrong_arity(node, name, expected, arguments.len()))
        }
    };

    match name {
        // -- Existence -----------------------------------------------------
        "exists" => {
            arity("0..1", arguments.len() <= 1)?;
            let input = tr.visit_target(target)?;
            let array = if arguments.len() == 1 {
                filtered_array(tr, &input, &arguments[0])?
            } else {
                let mut f = Fragment::array(tr.as_array(&input));
                f.merge_deps(&input);
                f
            };
            let mut out =
                Fragment::predicate(tr.dialect.exists_check(&array.sql, true));
            out.merge_deps(&array);
            Ok(out)
        }
        "empty" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let array = tr.as_array(&input);
            let mut out = Fragment::predicate(tr.dialect.empty_check(&array, true));
            out.merge_deps(&input);
            Ok(out)
        }
        "not" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let boolean = tr.as_boolean(&input);
            let mut out = Fragment::predicate(tr.dialect.logical_not(&boolean));
            out.merge_deps(&input);
            Ok(out)
        }
        "hasValue" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let value = tr.singleton_json(&input);
            let mut out = Fragment::predicate(tr.dialect.exists_check(&value, false));
            out.merge_deps(&input);
            Ok(out)
        }

        // -- Subsetting ----------------------------------------------------
        "first" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let array = tr.as_array(&input);
            let mut out = Fragment::json(tr.dialect.array_element_at(&array, "0"));
            out.merge_deps(&input);
            Ok(out)
        }
        "last" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let array = tr.as_array(&input);
            let mut out = Fragment::json(tr.dialect.array_last(&array));
            out.merge_deps(&input);
            Ok(out)
        }
        "tail" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let array = tr.as_array(&input);
            let mut out = Fragment::array(tr.dialect.array_skip(&array, "1"));
            out.merge_deps(&input);
            Ok(out)
        }
        "skip" | "take" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let count = tr.visit(&arguments[0])?;
            let array = tr.as_array(&input);
            let count_sql = tr.as_integer(&count);
            let sql = if name == "skip" {
                tr.dialect.array_skip(&array, &count_sql)
            } else {
                tr.dialect.array_take(&array, &count_sql)
            };
            let mut out = Fragment::array(sql);
            out.merge_deps(&input);
            out.merge_deps(&count);
            Ok(out)
        }
        "single" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let array = tr.as_array(&input);
            let d = tr.dialect;
            // More than one element forces a runtime cast failure; the
            // serialised array text is never a valid integer.
            let poison = d.to_json(&d.strict_cast(&d.cast_to_text(&array), CastType::Integer));
            let mut out = Fragment::json(format!(
                "(CASE WHEN {len} = 1 THEN {first} WHEN {len} = 0 THEN NULL ELSE {poison} END)",
                len = d.json_array_length(&array),
                first = d.array_element_at(&array, "0"),
                poison = poison
            ));
            out.merge_deps(&input);
            Ok(out)
        }

        // -- Collections ---------------------------------------------------
        "distinct" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let array = tr.as_array(&input);
            let mut out = Fragment::array(tr.dialect.distinct(&array));
            out.merge_deps(&input);
            Ok(out)
        }
        "isDistinct" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let array = tr.as_array(&input);
            let mut out = Fragment::predicate(tr.dialect.is_distinct(&array));
            out.merge_deps(&input);
            Ok(out)
        }
        "combine" | "union" | "exclude" | "intersect" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let other = tr.visit(&arguments[0])?;
            let left = tr.as_array(&input);
            let right = tr.as_array(&other);
            let d = tr.dialect;
            let sql = match name {
                "combine" => d.collection_combine(&left, &right),
                "union" => d.distinct(&d.collection_combine(&left, &right)),
                "exclude" => d.collection_exclude(&left, &right),
                _ => d.collection_intersect(&left, &right),
            };
            let mut out = Fragment::array(sql);
            out.merge_deps(&input);
            out.merge_deps(&other);
            Ok(out)
        }
        "subsetOf" | "supersetOf" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let other = tr.visit(&arguments[0])?;
            let left = tr.as_array(&input);
            let right = tr.as_array(&other);
            let d = tr.dialect;
            // A ⊆ B ⇔ A \ B is empty.
            let difference = if name == "subsetOf" {
                d.collection_exclude(&left, &right)
            } else {
                d.collection_exclude(&right, &left)
            };
            let mut out = Fragment::predicate(d.empty_check(&difference, true));
            out.merge_deps(&input);
            out.merge_deps(&other);
            Ok(out)
        }
        "contains" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let argument = tr.visit(&arguments[0])?;
            let d = tr.dialect;
            // String method or collection membership, decided by the
            // target's statically-known shape.
            let sql = if matches!(input.shape, ResultShape::Scalar(ScalarType::Text)) {
                d.contains_substring(&tr.as_text(&input), &tr.as_text(&argument))
            } else {
                let array = tr.as_array(&input);
                let needle = tr.as_text(&argument);
                d.json_array_contains(&array, &needle)
            };
            let mut out = Fragment::predicate(sql);
            out.merge_deps(&input);
            out.merge_deps(&argument);
            Ok(out)
        }

        // -- Quantifiers ---------------------------------------------------
        "allTrue" | "anyTrue" | "allFalse" | "anyFalse" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let array = tr.as_array(&input);
            let predicate = tr.truthy_predicate("v");
            let d = tr.dialect;
            let sql = match name {
                "allTrue" => d.all_true(&array, &predicate),
                "anyTrue" => d.any_true(&array, &predicate),
                "allFalse" => d.all_false(&array, &predicate),
                _ => d.any_false(&array, &predicate),
            };
            let mut out = Fragment::predicate(sql);
            out.merge_deps(&input);
            Ok(out)
        }
        "all" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let array = tr.as_array(&input);
            // The quantifier primitives bind the element as `v`; the
            // criteria is translated in that scope directly. Nested
            // quantifiers shadow consistently.
            tr.push_scope("v".to_string());
            let criteria = tr.visit(&arguments[0]);
            tr.pop_scope();
            let criteria = criteria?;
            let predicate = format!("COALESCE({}, FALSE)", tr.as_boolean(&criteria));
            let sql = tr.dialect.all_true(&array, &predicate);
            let mut out = Fragment::predicate(sql);
            out.merge_deps(&input);
            out.merge_deps(&criteria);
            Ok(out)
        }

        // -- Strings -------------------------------------------------------
        "length" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let mut out = Fragment::scalar(
                tr.dialect.string_length(&tr.as_text(&input)),
                ScalarType::Integer,
            );
            out.merge_deps(&input);
            Ok(out)
        }
        "substring" => {
            arity("1..2", (1..=2).contains(&arguments.len()))?;
            let input = tr.visit_target(target)?;
            let start = tr.visit(&arguments[0])?;
            let length = arguments.get(1).map(|a| tr.visit(a)).transpose()?;
            let text = tr.as_text(&input);
            let start_sql = tr.as_integer(&start);
            let length_sql = length.as_ref().map(|l| tr.as_integer(l));
            let mut out = Fragment::scalar(
                tr.dialect
                    .substring(&text, &start_sql, length_sql.as_deref()),
                ScalarType::Text,
            );
            out.merge_deps(&input);
            out.merge_deps(&start);
            if let Some(l) = &length {
                out.merge_deps(l);
            }
            Ok(out)
        }
        "startsWith" | "endsWith" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let argument = tr.visit(&arguments[0])?;
            let text = tr.as_text(&input);
            let probe = tr.as_text(&argument);
            let sql = if name == "startsWith" {
                tr.dialect.starts_with(&text, &probe)
            } else {
                tr.dialect.ends_with(&text, &probe)
            };
            let mut out = Fragment::predicate(sql);
            out.merge_deps(&input);
            out.merge_deps(&argument);
            Ok(out)
        }
        "indexOf" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let argument = tr.visit(&arguments[0])?;
            let mut out = Fragment::scalar(
                tr.dialect
                    .string_index_of(&tr.as_text(&input), &tr.as_text(&argument)),
                ScalarType::Integer,
            );
            out.merge_deps(&input);
            out.merge_deps(&argument);
            Ok(out)
        }
        "upper" | "lower" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let case = if name == "upper" {
                CaseKind::Upper
            } else {
                CaseKind::Lower
            };
            let mut out = Fragment::scalar(
                tr.dialect.case_convert(&tr.as_text(&input), case),
                ScalarType::Text,
            );
            out.merge_deps(&input);
            Ok(out)
        }
        "trim" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let mut out =
                Fragment::scalar(tr.dialect.trim(&tr.as_text(&input)), ScalarType::Text);
            out.merge_deps(&input);
            Ok(out)
        }
        "toChars" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let mut out = Fragment::array(tr.dialect.char_array(&tr.as_text(&input)));
            out.merge_deps(&input);
            Ok(out)
        }
        "replace" => {
            arity("2", arguments.len() == 2)?;
            let input = tr.visit_target(target)?;
            let find = tr.visit(&arguments[0])?;
            let replace = tr.visit(&arguments[1])?;
            let mut out = Fragment::scalar(
                tr.dialect.string_replace(
                    &tr.as_text(&input),
                    &tr.as_text(&find),
                    &tr.as_text(&replace),
                ),
                ScalarType::Text,
            );
            out.merge_deps(&input);
            out.merge_deps(&find);
            out.merge_deps(&replace);
            Ok(out)
        }
        "matches" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let pattern = tr.visit(&arguments[0])?;
            let mut out = Fragment::predicate(
                tr.dialect
                    .regex_match(&tr.as_text(&input), &tr.as_text(&pattern)),
            );
            out.merge_deps(&input);
            out.merge_deps(&pattern);
            Ok(out)
        }
        "replaceMatches" => {
            arity("2", arguments.len() == 2)?;
            let input = tr.visit_target(target)?;
            let pattern = tr.visit(&arguments[0])?;
            let substitution = tr.visit(&arguments[1])?;
            let mut out = Fragment::scalar(
                tr.dialect.regex_replace(
                    &tr.as_text(&input),
                    &tr.as_text(&pattern),
                    &tr.as_text(&substitution),
                ),
                ScalarType::Text,
            );
            out.merge_deps(&input);
            out.merge_deps(&pattern);
            out.merge_deps(&substitution);
            Ok(out)
        }
        "split" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let separator = tr.visit(&arguments[0])?;
            let mut out = Fragment::array(
                tr.dialect
                    .split_string(&tr.as_text(&input), &tr.as_text(&separator)),
            );
            out.merge_deps(&input);
            out.merge_deps(&separator);
            Ok(out)
        }
        "join" => {
            arity("0..1", arguments.len() <= 1)?;
            let input = tr.visit_target(target)?;
            let separator = arguments.first().map(|a| tr.visit(a)).transpose()?;
            let array = tr.as_array(&input);
            let separator_sql = separator
                .as_ref()
                .map(|s| tr.as_text(s))
                .unwrap_or_else(|| "''".to_string());
            let mut out = Fragment::scalar(
                tr.dialect.string_join(&array, &separator_sql),
                ScalarType::Text,
            );
            out.merge_deps(&input);
            if let Some(s) = &separator {
                out.merge_deps(s);
            }
            Ok(out)
        }

        // -- Math ----------------------------------------------------------
        "abs" | "ceiling" | "floor" | "sqrt" | "truncate" | "exp" | "ln" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let function = match name {
                "abs" => MathFunction::Abs,
                "ceiling" => MathFunction::Ceiling,
                "floor" => MathFunction::Floor,
                "sqrt" => MathFunction::Sqrt,
                "truncate" => MathFunction::Truncate,
                "exp" => MathFunction::Exp,
                _ => MathFunction::Ln,
            };
            let scalar = match function {
                MathFunction::Ceiling | MathFunction::Floor | MathFunction::Truncate => {
                    ScalarType::Integer
                }
                _ => ScalarType::Decimal,
            };
            let mut out = Fragment::scalar(
                tr.dialect
                    .math_function(function, &[tr.as_number(&input)]),
                scalar,
            );
            out.merge_deps(&input);
            Ok(out)
        }
        "round" => {
            arity("0..1", arguments.len() <= 1)?;
            let input = tr.visit_target(target)?;
            let precision = arguments.first().map(|a| tr.visit(a)).transpose()?;
            let mut args = vec![tr.as_number(&input)];
            if let Some(p) = &precision {
                args.push(tr.as_integer(p));
            }
            let mut out = Fragment::scalar(
                tr.dialect.math_function(MathFunction::Round, &args),
                ScalarType::Decimal,
            );
            out.merge_deps(&input);
            if let Some(p) = &precision {
                out.merge_deps(p);
            }
            Ok(out)
        }
        "log" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let base = tr.visit(&arguments[0])?;
            let mut out = Fragment::scalar(
                tr.dialect.math_function(
                    MathFunction::Log,
                    &[tr.as_number(&input), tr.as_number(&base)],
                ),
                ScalarType::Decimal,
            );
            out.merge_deps(&input);
            out.merge_deps(&base);
            Ok(out)
        }
        "power" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let exponent = tr.visit(&arguments[0])?;
            let mut out = Fragment::scalar(
                tr.dialect
                    .power(&tr.as_number(&input), &tr.as_number(&exponent)),
                ScalarType::Decimal,
            );
            out.merge_deps(&input);
            out.merge_deps(&exponent);
            Ok(out)
        }

        // -- Conversions ---------------------------------------------------
        "toString" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let mut out = Fragment::scalar(tr.as_text(&input), ScalarType::Text);
            out.merge_deps(&input);
            Ok(out)
        }
        "toInteger" | "toDecimal" | "toBoolean" | "toDate" | "toDateTime" | "toTime" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let (cast, scalar) = match name {
                "toInteger" => (CastType::Integer, ScalarType::Integer),
                "toDecimal" => (CastType::Decimal, ScalarType::Decimal),
                "toBoolean" => (CastType::Boolean, ScalarType::Boolean),
                "toDate" => (CastType::Date, ScalarType::Date),
                "toDateTime" => (CastType::Timestamp, ScalarType::Timestamp),
                _ => (CastType::Time, ScalarType::Time),
            };
            let mut out = Fragment::scalar(
                tr.dialect.safe_cast(&tr.as_text(&input), cast),
                scalar,
            );
            out.merge_deps(&input);
            Ok(out)
        }
        "toQuantity" => {
            arity("0..1", arguments.len() <= 1)?;
            let input = tr.visit_target(target)?;
            let unit = arguments.first().map(|a| tr.visit(a)).transpose()?;
            let unit_sql = unit
                .as_ref()
                .map(|u| tr.as_text(u))
                .unwrap_or_else(|| "'1'".to_string());
            let mut out = Fragment::json(tr.dialect.create_json_object(&[
                ("value".to_string(), tr.as_number(&input)),
                ("unit".to_string(), unit_sql),
            ]));
            out.merge_deps(&input);
            if let Some(u) = &unit {
                out.merge_deps(u);
            }
            Ok(out)
        }
        "convertsToInteger" | "convertsToDecimal" | "convertsToBoolean" | "convertsToString"
        | "convertsToDate" | "convertsToDateTime" | "convertsToTime" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let text = tr.as_text(&input);
            let d = tr.dialect;
            let sql = match name {
                "convertsToString" => format!("(({}) IS NOT NULL)", text),
                _ => {
                    let cast = match name {
                        "convertsToInteger" => CastType::Integer,
                        "convertsToDecimal" => CastType::Decimal,
                        "convertsToBoolean" => CastType::Boolean,
                        "convertsToDate" => CastType::Date,
                        "convertsToDateTime" => CastType::Timestamp,
                        _ => CastType::Time,
                    };
                    format!(
                        "(CASE WHEN ({t}) IS NULL THEN NULL ELSE ({cast}) IS NOT NULL END)",
                        t = text,
                        cast = d.safe_cast(&text, cast)
                    )
                }
            };
            let mut out = Fragment::predicate(sql);
            out.merge_deps(&input);
            Ok(out)
        }

        // -- Extensions ----------------------------------------------------
        "extension" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let url = literal_string(&arguments[0]).ok_or_else(|| {
                TranslationError::Unsupported {
                    message: "extension() requires a string literal url".to_string(),
                    source_text: tr.node_text(node),
                }
            })?;
            let array = tr.as_array(&input);
            let extensions = tr.dialect.project_json_array(&array, &["extension"]);
            let mut out =
                Fragment::array(tr.dialect.filter_extension_by_url(&extensions, &url));
            out.extension_values_pending = true;
            out.merge_deps(&input);
            Ok(out)
        }

        // -- Encoding ------------------------------------------------------
        "encode" | "decode" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let scheme = literal_string(&arguments[0]).ok_or_else(|| {
                TranslationError::Unsupported {
                    message: format!("{}() requires a literal encoding name", name),
                    source_text: tr.node_text(node),
                }
            })?;
            let encoding = match scheme.as_str() {
                "base64" => Encoding::Base64,
                "urlbase64" => Encoding::UrlBase64,
                "hex" => Encoding::Hex,
                other => {
                    return Err(TranslationError::Unsupported {
                        message: format!("unknown encoding '{}'", other),
                        source_text: tr.node_text(node),
                    })
                }
            };
            let text = tr.as_text(&input);
            let sql = if name == "encode" {
                tr.dialect.encode(&text, encoding)
            } else {
                tr.dialect.decode(&text, encoding)
            };
            let mut out = Fragment::scalar(sql, ScalarType::Text);
            out.merge_deps(&input);
            Ok(out)
        }
        "escape" | "unescape" => {
            arity("1", arguments.len() == 1)?;
            let input = tr.visit_target(target)?;
            let scheme = literal_string(&arguments[0]).ok_or_else(|| {
                TranslationError::Unsupported {
                    message: format!("{}() requires a literal target name", name),
                    source_text: tr.node_text(node),
                }
            })?;
            let escape_target = match scheme.as_str() {
                "html" => EscapeTarget::Html,
                "json" => EscapeTarget::Json,
                other => {
                    return Err(TranslationError::Unsupported {
                        message: format!("unknown escape target '{}'", other),
                        source_text: tr.node_text(node),
                    })
                }
            };
            let text = tr.as_text(&input);
            let sql = if name == "escape" {
                tr.dialect.escape(&text, escape_target)
            } else {
                tr.dialect.unescape(&text, escape_target)
            };
            let mut out = Fragment::scalar(sql, ScalarType::Text);
            out.merge_deps(&input);
            Ok(out)
        }

        // -- Boundaries ----------------------------------------------------
        "lowBoundary" | "highBoundary" => {
            arity("0..1", arguments.len() <= 1)?;
            let boundary = if name == "lowBoundary" {
                BoundaryKind::Low
            } else {
                BoundaryKind::High
            };
            let precision = arguments
                .first()
                .and_then(literal_integer);
            boundary_fragment(tr, target, boundary, precision)
        }

        // -- Navigation ----------------------------------------------------
        "children" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let value = tr.singleton_json(&input);
            let mut out = Fragment::array(tr.dialect.json_children(&value));
            out.merge_deps(&input);
            Ok(out)
        }
        "descendants" => {
            arity("0", arguments.is_empty())?;
            let input = tr.visit_target(target)?;
            let value = tr.singleton_json(&input);
            let mut out = Fragment::array(tr.dialect.json_descendants(&value));
            out.merge_deps(&input);
            Ok(out)
        }

        // -- Environment ---------------------------------------------------
        "today" => {
            arity("0", arguments.is_empty())?;
            Ok(Fragment::scalar(tr.dialect.current_date(), ScalarType::Date))
        }
        "now" => {
            arity("0", arguments.is_empty())?;
            Ok(Fragment::scalar(
                tr.dialect.current_timestamp(),
                ScalarType::Timestamp,
            ))
        }
        "timeOfDay" => {
            arity("0", arguments.is_empty())?;
            Ok(Fragment::scalar(tr.dialect.current_time(), ScalarType::Time))
        }

        // -- Diagnostics ---------------------------------------------------
        "trace" => {
            arity("1..2", (1..=2).contains(&arguments.len()))?;
            // trace() is an identity at SQL level.
            tr.visit_target(target)
        }

        other => Err(TranslationError::UnknownFunction {
            name: other.to_string(),
            source_text: tr.node_text(node),
        }),
    }
}

/// Apply an exists()-style criteria filter to an input collection.
fn filtered_array(
    tr: &mut Translator<'_>,
    input: &Fragment,
    criteria: &ExprNode,
) -> Result<Fragment> {
    let array = tr.as_array(input);
    let alias = tr.fresh_alias("x");
    tr.push_scope(alias.clone());
    let predicate = tr.visit(criteria);
    tr.pop_scope();
    let predicate = predicate?;
    let predicate_sql = tr.as_boolean(&predicate);
    let mut out = Fragment::array(tr.dialect.filter_json_array(&array, &alias, &predicate_sql));
    out.merge_deps(input);
    out.merge_deps(&predicate);
    Ok(out)
}

/// lowBoundary()/highBoundary() over temporal literals, decimals, and
/// quantities.
fn boundary_fragment(
    tr: &mut Translator<'_>,
    target: Option<&ExprNode>,
    boundary: BoundaryKind,
    precision: Option<i64>,
) -> Result<Fragment> {
    let d = tr.dialect;

    // Literal targets carry their own kind and precision.
    if let Some(node) = target {
        match &node.kind {
            ExprKind::Literal(LiteralValue::Temporal(info)) => {
                let literal = match info.kind {
                    basalt_fhirpath::TemporalKind::Date => d.date_literal(&info.sql_text()),
                    basalt_fhirpath::TemporalKind::DateTime => {
                        d.datetime_literal(&info.sql_text())
                    }
                    basalt_fhirpath::TemporalKind::Time => d.time_literal(&info.sql_text()),
                };
                let sql = d.temporal_boundary(
                    &literal,
                    value_kind_for(info.kind),
                    unit_for_precision(info.precision),
                    boundary,
                );
                return Ok(Fragment::scalar(sql, ScalarType::Unknown));
            }
            ExprKind::Literal(LiteralValue::Decimal(value)) => {
                return Ok(Fragment::scalar(
                    d.decimal_boundary(&format!("({})", value), precision, boundary),
                    ScalarType::Decimal,
                ));
            }
            ExprKind::Literal(LiteralValue::Integer(value)) => {
                return Ok(Fragment::scalar(
                    d.decimal_boundary(&format!("({})", value), precision, boundary),
                    ScalarType::Decimal,
                ));
            }
            ExprKind::Literal(LiteralValue::Quantity(q)) => {
                // Split, bound the numeric part, recompose.
                let bounded = d.decimal_boundary(&format!("({})", q.value), precision, boundary);
                let unit = q
                    .calendar
                    .map(|c| c.ucum_code().to_string())
                    .unwrap_or_else(|| q.unit.clone());
                return Ok(Fragment::json(d.create_json_object(&[
                    ("value".to_string(), bounded),
                    ("unit".to_string(), d.string_literal(&unit)),
                ])));
            }
            _ => {}
        }
    }

    // Dynamic targets: bound the decimal text form.
    let input = tr.visit_target(target)?;
    let text = tr.as_text(&input);
    let mut out = Fragment::scalar(
        d.decimal_boundary(&text, precision, boundary),
        ScalarType::Decimal,
    );
    out.merge_deps(&input);
    Ok(out)
}

fn literal_string(node: &ExprNode) -> Option<String> {
    match &node.kind {
        ExprKind::Literal(LiteralValue::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn literal_integer(node: &ExprNode) -> Option<i64> {
    match &node.kind {
        ExprKind::Literal(LiteralValue::Integer(i)) => Some(*i),
        _ => None,
    }
}
