//! The AST → SQL visitor
//!
//! Owns every semantic decision: collection normalisation, singleton
//! coercion, null propagation, operator dispatch, partial-precision
//! temporal comparison, truthiness, and type-operation routing. Every
//! token is delegated to the dialect.
//!
//! Collections normalise to JSON arrays after the first navigation step;
//! `as_array` / `singleton` centralise the conversions. Repeated
//! root-scope subtrees are materialised as CTE entries and referenced by
//! id; everything else inlines.

use crate::cte::{cte_body, cte_reference, CteEntry, CtePlan, RESOURCE_COLUMN, RESOURCE_TABLE};
use crate::error::{Result, TranslationError};
use crate::fragment::{Fragment, ResultShape, ScalarType};
use crate::functions;
use crate::types::{self, TypeRoute};
use basalt_dialect::{CastType, Dialect, JsonTypeFamily, TemporalUnit, TemporalValueKind};
use basalt_fhirpath::temporal::{TemporalInfo, TemporalKind, TemporalPrecision};
use basalt_fhirpath::{
    AggregateFunction, ConditionalKind, ExprKind, ExprNode, LiteralValue, Operator, OperatorArity,
    TypeOperationKind, VariableKind,
};
use std::collections::HashMap;
use tracing::debug;

/// Translation tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct TranslationOptions {
    /// Materialise repeated root-scope subtrees as shared CTEs.
    pub materialize_repeats: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            materialize_repeats: true,
        }
    }
}

/// A finished translation: the runnable SQL and the plan it was built
/// from.
#[derive(Debug, Clone)]
pub struct Translation {
    pub sql: String,
    pub plan: CtePlan,
    pub shape: ResultShape,
}

/// Translate a typed AST against a dialect. `source` is the original
/// expression text, used for error slices and repeat detection.
pub fn translate(
    ast: &ExprNode,
    source: &str,
    dialect: &dyn Dialect,
    options: TranslationOptions,
) -> Result<Translation> {
    let mut translator = Translator::new(source, dialect, options);
    translator.collect_repeats(ast);
    let fragment = translator.visit(ast)?;

    let id = translator.next_id();
    translator.plan.push(CteEntry {
        id,
        sql: cte_body(&fragment.sql),
        deps: fragment.deps.clone(),
    });

    let sql = translator.plan.assemble(dialect)?;
    debug!(dialect = dialect.kind().as_str(), sql, "translated expression");
    Ok(Translation {
        sql,
        plan: translator.plan,
        shape: fragment.shape,
    })
}

pub(crate) struct Translator<'a> {
    pub(crate) dialect: &'a dyn Dialect,
    pub(crate) source: &'a str,
    pub(crate) plan: CtePlan,
    options: TranslationOptions,
    counter: usize,
    alias_counter: usize,
    /// Source-slice occurrence counts for repeat materialisation.
    repeats: HashMap<String, usize>,
    /// Already materialised subtrees: source slice → (cte id, shape).
    materialized: HashMap<String, (usize, ResultShape)>,
    /// Element scopes opened by where/select/all; the top is what bare
    /// identifiers and `$this` resolve against.
    scopes: Vec<String>,
}

impl<'a> Translator<'a> {
    fn new(source: &'a str, dialect: &'a dyn Dialect, options: TranslationOptions) -> Self {
        Self {
            dialect,
            source,
            plan: CtePlan::default(),
            options,
            counter: 0,
            alias_counter: 0,
            repeats: HashMap::new(),
            materialized: HashMap::new(),
            scopes: Vec::new(),
        }
    }

    pub(crate) fn next_id(&mut self) -> usize {
        let id = self.counter;
        self.counter += 1;
        id
    }

    pub(crate) fn fresh_alias(&mut self, prefix: &str) -> String {
        let alias = format!("{}_{}", prefix, self.alias_counter);
        self.alias_counter += 1;
        alias
    }

    fn collect_repeats(&mut self, root: &ExprNode) {
        root.walk(&mut |node, _| {
            if node.count_nodes() < 2 {
                return;
            }
            let text = node.source_text(self.source).trim().to_string();
            if !text.is_empty() {
                *self.repeats.entry(text).or_insert(0) += 1;
            }
        });
    }

    pub(crate) fn node_text(&self, node: &ExprNode) -> String {
        let text = node.source_text(self.source);
        if text.is_empty() {
            "<synthetic>".to_string()
        } else {
            text.to_string()
        }
    }

    /// The resource JSON column, qualified against the base table.
    fn root_json(&self) -> String {
        format!("{}.{}", RESOURCE_TABLE, RESOURCE_COLUMN)
    }

    // ------------------------------------------------------------------
    // Shape coercions
    // ------------------------------------------------------------------

    /// Render `fragment` as a JSON array (the normalised collection
    /// form). Scalars wrap into one-element arrays; NULL becomes empty.
    pub(crate) fn as_array(&self, fragment: &Fragment) -> String {
        let d = self.dialect;
        match fragment.shape {
            ResultShape::JsonArray => fragment.sql.clone(),
            ResultShape::JsonValue => format!(
                "(CASE WHEN ({f}) IS NULL THEN {empty} WHEN {is_array} THEN {json} ELSE {wrapped} END)",
                f = fragment.sql,
                empty = d.empty_json_array(),
                is_array = d.is_json_array(&fragment.sql),
                json = d.to_json(&fragment.sql),
                wrapped = d.wrap_json_array(&fragment.sql)
            ),
            ResultShape::Scalar(_) | ResultShape::BooleanPredicate => format!(
                "(CASE WHEN ({f}) IS NULL THEN {empty} ELSE {wrapped} END)",
                f = fragment.sql,
                empty = d.empty_json_array(),
                wrapped = d.wrap_json_array(&fragment.sql)
            ),
        }
    }

    /// Single JSON value of a fragment: a one-element collection yields
    /// its element, anything else NULL-propagates.
    pub(crate) fn singleton(&self, fragment: &Fragment) -> String {
        match fragment.shape {
            ResultShape::JsonArray => {
                let d = self.dialect;
                format!(
                    "(CASE WHEN {len} = 1 THEN {first} ELSE NULL END)",
                    len = d.json_array_length(&fragment.sql),
                    first = d.array_element_at(&fragment.sql, "0")
                )
            }
            _ => fragment.sql.clone(),
        }
    }

    /// Fragment as native text.
    pub(crate) fn as_text(&self, fragment: &Fragment) -> String {
        let d = self.dialect;
        match fragment.shape {
            ResultShape::Scalar(ScalarType::Text) => fragment.sql.clone(),
            ResultShape::Scalar(_) | ResultShape::BooleanPredicate => {
                d.cast_to_text(&fragment.sql)
            }
            ResultShape::JsonValue => d.json_unquote(&fragment.sql),
            ResultShape::JsonArray => d.json_unquote(&self.singleton(fragment)),
        }
    }

    /// Fragment as a numeric scalar. Non-numeric *literals* go through a
    /// strict cast so the database raises; JSON-extracted values go
    /// through a safe cast and NULL-propagate.
    pub(crate) fn as_number(&self, fragment: &Fragment) -> String {
        let d = self.dialect;
        match fragment.shape {
            ResultShape::Scalar(ScalarType::Integer) | ResultShape::Scalar(ScalarType::Decimal) => {
                fragment.sql.clone()
            }
            ResultShape::Scalar(_) | ResultShape::BooleanPredicate => {
                d.strict_cast(&d.cast_to_text(&fragment.sql), CastType::Decimal)
            }
            ResultShape::JsonValue => {
                d.safe_cast(&d.json_unquote(&fragment.sql), CastType::Decimal)
            }
            ResultShape::JsonArray => {
                d.safe_cast(&d.json_unquote(&self.singleton(fragment)), CastType::Decimal)
            }
        }
    }

    /// Fragment as an integer scalar (for skip/take counts, indexes).
    pub(crate) fn as_integer(&self, fragment: &Fragment) -> String {
        let d = self.dialect;
        match fragment.shape {
            ResultShape::Scalar(ScalarType::Integer) => fragment.sql.clone(),
            ResultShape::Scalar(_) | ResultShape::BooleanPredicate => {
                d.strict_cast(&d.cast_to_text(&fragment.sql), CastType::Integer)
            }
            _ => d.safe_cast(&d.json_unquote(&self.singleton(fragment)), CastType::Integer),
        }
    }

    /// Fragment as a boolean scalar with three-valued semantics.
    pub(crate) fn as_boolean(&self, fragment: &Fragment) -> String {
        let d = self.dialect;
        match fragment.shape {
            ResultShape::BooleanPredicate | ResultShape::Scalar(ScalarType::Boolean) => {
                fragment.sql.clone()
            }
            ResultShape::Scalar(_) => {
                d.strict_cast(&d.cast_to_text(&fragment.sql), CastType::Boolean)
            }
            ResultShape::JsonValue => {
                d.safe_cast(&d.json_unquote(&fragment.sql), CastType::Boolean)
            }
            ResultShape::JsonArray => {
                d.safe_cast(&d.json_unquote(&self.singleton(fragment)), CastType::Boolean)
            }
        }
    }

    /// Fragment as a JSON value (for CASE arms and aggregation).
    pub(crate) fn as_json_value(&self, fragment: &Fragment) -> String {
        match fragment.shape {
            ResultShape::JsonValue | ResultShape::JsonArray => fragment.sql.clone(),
            _ => self.dialect.to_json(&fragment.sql),
        }
    }

    /// The centralised truthiness rule: empty string and zero are false,
    /// booleans are themselves, null is false, containers are true.
    /// Reused verbatim by all four quantifier emissions.
    pub(crate) fn truthy_predicate(&self, value: &str) -> String {
        let d = self.dialect;
        let text = d.json_unquote(value);
        format!(
            "(CASE WHEN {v} IS NULL THEN FALSE \
             WHEN {is_bool} THEN COALESCE({as_bool}, FALSE) \
             WHEN {is_int} OR {is_dec} THEN COALESCE({as_num} <> 0, FALSE) \
             WHEN {is_str} THEN (LENGTH({text}) > 0) \
             ELSE TRUE END)",
            v = value,
            is_bool = d.json_type_check(value, JsonTypeFamily::Boolean),
            as_bool = d.safe_cast(&text, CastType::Boolean),
            is_int = d.json_type_check(value, JsonTypeFamily::Integer),
            is_dec = d.json_type_check(value, JsonTypeFamily::Decimal),
            as_num = d.safe_cast(&text, CastType::Decimal),
            is_str = d.json_type_check(value, JsonTypeFamily::String),
            text = text
        )
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    pub(crate) fn push_scope(&mut self, element_alias: String) {
        self.scopes.push(element_alias);
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn current_scope(&self) -> Option<&str> {
        self.scopes.last().map(String::as_str)
    }

    /// The expression bare identifiers and `$this` resolve against:
    /// the innermost element scope, or the resource root.
    pub(crate) fn context_fragment(&self) -> Fragment {
        match self.current_scope() {
            Some(alias) => Fragment::json(alias.to_string()),
            None => Fragment::json(self.dialect.to_json(&self.root_json())),
        }
    }

    // ------------------------------------------------------------------
    // Visitor
    // ------------------------------------------------------------------

    pub(crate) fn visit(&mut self, node: &ExprNode) -> Result<Fragment> {
        // Shared-subtree materialisation: only at root scope (element
        // scopes change what identifiers mean) and only for non-leaves.
        let key = if self.options.materialize_repeats
            && self.scopes.is_empty()
            && node.count_nodes() >= 2
        {
            let text = node.source_text(self.source).trim().to_string();
            if self.repeats.get(&text).copied().unwrap_or(0) > 1 {
                Some(text)
            } else {
                None
            }
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some((id, shape)) = self.materialized.get(key) {
                return Ok(Fragment::new(cte_reference(*id), *shape).with_deps(vec![*id]));
            }
        }

        let fragment = self.visit_inner(node)?;

        if let Some(key) = key {
            let id = self.next_id();
            self.plan.push(CteEntry {
                id,
                sql: cte_body(&fragment.sql),
                deps: fragment.deps.clone(),
            });
            self.materialized.insert(key, (id, fragment.shape));
            return Ok(Fragment::new(cte_reference(id), fragment.shape).with_deps(vec![id]));
        }

        Ok(fragment)
    }

    fn visit_inner(&mut self, node: &ExprNode) -> Result<Fragment> {
        match &node.kind {
            ExprKind::Literal(value) => self.visit_literal(value),
            ExprKind::Identifier { name, .. } => self.visit_identifier(name),
            ExprKind::Path { base, member, .. } => {
                let base_fragment = self.visit(base)?;
                self.navigate_member(base_fragment, member)
            }
            ExprKind::Index { collection, index } => {
                let collection = self.visit(collection)?;
                let index_fragment = self.visit(index)?;
                let array = self.as_array(&collection);
                let index_sql = self.as_integer(&index_fragment);
                let mut out =
                    Fragment::json(self.dialect.array_element_at(&array, &index_sql));
                out.merge_deps(&collection);
                out.merge_deps(&index_fragment);
                Ok(out)
            }
            ExprKind::Operator { op, operands } => self.visit_operator(node, *op, operands),
            ExprKind::Function {
                name,
                target,
                arguments,
            } => functions::visit_function(self, node, name, target.as_deref(), arguments),
            ExprKind::Conditional {
                kind,
                target,
                arguments,
            } => self.visit_conditional(node, *kind, target.as_deref(), arguments),
            ExprKind::Aggregation {
                function,
                target,
                arguments,
            } => self.visit_aggregation(node, *function, target.as_deref(), arguments),
            ExprKind::TypeOperation {
                kind,
                target_type,
                operand,
            } => self.visit_type_operation(node, *kind, target_type, operand.as_deref()),
            ExprKind::Variable(variable) => self.visit_variable(node, variable),
        }
    }

    fn visit_literal(&mut self, value: &LiteralValue) -> Result<Fragment> {
        let d = self.dialect;
        Ok(match value {
            LiteralValue::Empty => Fragment::array(d.empty_json_array()),
            LiteralValue::Boolean(b) => {
                Fragment::scalar(if *b { "TRUE" } else { "FALSE" }, ScalarType::Boolean)
            }
            LiteralValue::Integer(i) => Fragment::scalar(i.to_string(), ScalarType::Integer),
            LiteralValue::Decimal(v) => Fragment::scalar(v.to_string(), ScalarType::Decimal),
            LiteralValue::String(s) => Fragment::scalar(d.string_literal(s), ScalarType::Text),
            LiteralValue::Temporal(info) => self.temporal_literal(info),
            LiteralValue::Quantity(q) => {
                let unit = q
                    .calendar
                    .map(|c| c.ucum_code().to_string())
                    .unwrap_or_else(|| q.unit.clone());
                Fragment::json(d.create_json_object(&[
                    ("value".to_string(), q.value.to_string()),
                    ("unit".to_string(), d.string_literal(&unit)),
                ]))
            }
        })
    }

    fn temporal_literal(&self, info: &TemporalInfo) -> Fragment {
        let d = self.dialect;
        match info.kind {
            TemporalKind::Date => {
                Fragment::scalar(d.date_literal(&info.sql_text()), ScalarType::Date)
            }
            TemporalKind::DateTime => {
                Fragment::scalar(d.datetime_literal(&info.sql_text()), ScalarType::Timestamp)
            }
            TemporalKind::Time => {
                Fragment::scalar(d.time_literal(&info.sql_text()), ScalarType::Time)
            }
        }
    }

    fn visit_identifier(&mut self, name: &str) -> Result<Fragment> {
        if self.scopes.is_empty() && types::is_resource_root(name) {
            // Resource-rooted navigation: the resource itself, guarded by
            // its type discriminator.
            let d = self.dialect;
            let root = self.root_json();
            let guard = d.extract_json_text(&root, "$.resourceType");
            return Ok(Fragment::json(format!(
                "(CASE WHEN {guard} = {name} THEN {json} ELSE NULL END)",
                guard = guard,
                name = d.string_literal(name),
                json = d.to_json(&root)
            )));
        }
        let context = self.context_fragment();
        self.navigate_member(context, name)
    }

    /// One navigation step over a (possibly collection-valued) base.
    /// Choice-typed elements fall through their typed spellings.
    pub(crate) fn navigate_member(&mut self, base: Fragment, member: &str) -> Result<Fragment> {
        // `extension(url).value` extracts value[x] payloads.
        if base.extension_values_pending && member == "value" {
            let array = self.as_array(&base);
            let mut out = Fragment::array(self.dialect.extract_extension_values(&array));
            out.merge_deps(&base);
            return Ok(out);
        }

        let array = self.as_array(&base);
        let sql = if types::is_choice_element(member) {
            self.choice_projection(&array, member)
        } else {
            self.dialect.project_json_array(&array, &[member])
        };
        let mut out = Fragment::array(sql);
        out.merge_deps(&base);
        Ok(out)
    }

    /// `deceased` → first non-empty of `deceased`, `deceasedBoolean`,
    /// `deceasedDateTime`, ... in declaration order.
    fn choice_projection(&self, array_sql: &str, member: &str) -> String {
        let d = self.dialect;
        let mut candidates = vec![member.to_string()];
        for suffix in types::CHOICE_SUFFIXES {
            candidates.push(format!("{}{}", member, suffix));
        }

        let mut arms = String::new();
        for candidate in &candidates {
            let projection = d.project_json_array(array_sql, &[candidate.as_str()]);
            arms.push_str(&format!(
                "WHEN {len} > 0 THEN {projection} ",
                len = d.json_array_length(&projection),
                projection = projection
            ));
        }
        format!("(CASE {}ELSE {} END)", arms, d.empty_json_array())
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn visit_operator(
        &mut self,
        node: &ExprNode,
        op: Operator,
        operands: &[ExprNode],
    ) -> Result<Fragment> {
        match op.arity() {
            OperatorArity::Unary => {
                let operand = self.visit(&operands[0])?;
                let mut out = Fragment::scalar(
                    format!("(-{})", self.as_number(&operand)),
                    ScalarType::Decimal,
                );
                out.merge_deps(&operand);
                Ok(out)
            }
            OperatorArity::Logical => self.logical_operator(op, operands),
            OperatorArity::Comparison => self.comparison_operator(node, op, operands),
            OperatorArity::Union => {
                let left = self.visit(&operands[0])?;
                let right = self.visit(&operands[1])?;
                let combined = self
                    .dialect
                    .collection_combine(&self.as_array(&left), &self.as_array(&right));
                let mut out = Fragment::array(self.dialect.distinct(&combined));
                out.merge_deps(&left);
                out.merge_deps(&right);
                Ok(out)
            }
            OperatorArity::Binary => self.arithmetic_operator(node, op, operands),
        }
    }

    fn logical_operator(&mut self, op: Operator, operands: &[ExprNode]) -> Result<Fragment> {
        let left = self.visit(&operands[0])?;
        let right = self.visit(&operands[1])?;
        let l = self.as_boolean(&left);
        let r = self.as_boolean(&right);
        let d = self.dialect;
        // SQL three-valued logic lines up with FHIRPath empty
        // propagation for all four connectives.
        let sql = match op {
            Operator::And => d.logical_and(&l, &r),
            Operator::Or => d.logical_or(&l, &r),
            Operator::Xor => d.logical_xor(&l, &r),
            Operator::Implies => d.logical_or(&d.logical_not(&l), &r),
            _ => unreachable!("non-logical operator in logical arm"),
        };
        let mut out = Fragment::predicate(sql);
        out.merge_deps(&left);
        out.merge_deps(&right);
        Ok(out)
    }

    fn arithmetic_operator(
        &mut self,
        node: &ExprNode,
        op: Operator,
        operands: &[ExprNode],
    ) -> Result<Fragment> {
        let left = self.visit(&operands[0])?;
        let right = self.visit(&operands[1])?;
        let d = self.dialect;

        let stringish = |f: &Fragment| matches!(f.shape, ResultShape::Scalar(ScalarType::Text));

        let (sql, scalar) = match op {
            Operator::Add if stringish(&left) || stringish(&right) => (
                d.string_concat(&self.as_text(&left), &self.as_text(&right)),
                ScalarType::Text,
            ),
            Operator::Add => (
                format!("({} + {})", self.as_number(&left), self.as_number(&right)),
                ScalarType::Decimal,
            ),
            Operator::Subtract => (
                format!("({} - {})", self.as_number(&left), self.as_number(&right)),
                ScalarType::Decimal,
            ),
            Operator::Multiply => (
                format!("({} * {})", self.as_number(&left), self.as_number(&right)),
                ScalarType::Decimal,
            ),
            Operator::Divide => (
                d.decimal_division(&self.as_number(&left), &self.as_number(&right)),
                ScalarType::Decimal,
            ),
            Operator::Div => (
                d.integer_division(&self.as_number(&left), &self.as_number(&right)),
                ScalarType::Integer,
            ),
            Operator::Mod => (
                d.modulo(&self.as_number(&left), &self.as_number(&right)),
                ScalarType::Decimal,
            ),
            Operator::Concat => (
                d.string_concat(
                    &format!("COALESCE({}, '')", self.as_text(&left)),
                    &format!("COALESCE({}, '')", self.as_text(&right)),
                ),
                ScalarType::Text,
            ),
            other => {
                return Err(TranslationError::UnsupportedOperator {
                    operator: other.symbol().to_string(),
                    operand: "these operands".to_string(),
                    source_text: self.node_text(node),
                })
            }
        };

        let mut out = Fragment::scalar(sql, scalar);
        out.merge_deps(&left);
        out.merge_deps(&right);
        Ok(out)
    }

    fn comparison_operator(
        &mut self,
        node: &ExprNode,
        op: Operator,
        operands: &[ExprNode],
    ) -> Result<Fragment> {
        // Temporal-literal comparisons use interval semantics.
        let left_temporal = temporal_literal_of(&operands[0]);
        let right_temporal = temporal_literal_of(&operands[1]);

        if let (Some(a), Some(b)) = (left_temporal, right_temporal) {
            return Ok(Fragment::predicate(self.fold_temporal_comparison(op, a, b)));
        }
        if let Some(info) = right_temporal {
            let value = self.visit(&operands[0])?;
            let sql = self.temporal_comparison(op, &value, info, false)?;
            let mut out = Fragment::predicate(sql);
            out.merge_deps(&value);
            return Ok(out);
        }
        if let Some(info) = left_temporal {
            let value = self.visit(&operands[1])?;
            let sql = self.temporal_comparison(op, &value, info, true)?;
            let mut out = Fragment::predicate(sql);
            out.merge_deps(&value);
            return Ok(out);
        }

        let left = self.visit(&operands[0])?;
        let right = self.visit(&operands[1])?;
        let d = self.dialect;

        let numericish = |f: &Fragment| {
            matches!(
                f.shape,
                ResultShape::Scalar(ScalarType::Integer) | ResultShape::Scalar(ScalarType::Decimal)
            )
        };

        let sql = match op {
            Operator::Equivalent | Operator::NotEquivalent => {
                let l = self.as_text(&left);
                let r = self.as_text(&right);
                let core = format!(
                    "(CASE WHEN ({l}) IS NULL AND ({r}) IS NULL THEN TRUE \
                     WHEN ({l}) IS NULL OR ({r}) IS NULL THEN FALSE \
                     ELSE LOWER(TRIM({l})) = LOWER(TRIM({r})) END)",
                    l = l,
                    r = r
                );
                if op == Operator::NotEquivalent {
                    d.logical_not(&core)
                } else {
                    core
                }
            }
            _ => {
                let token = comparison_token(op);
                if left.shape == ResultShape::JsonArray && right.shape == ResultShape::JsonArray {
                    // Whole-collection comparison: positional, via the
                    // canonical serialisation.
                    d.comparison(
                        &d.cast_to_text(&left.sql),
                        token,
                        &d.cast_to_text(&right.sql),
                    )
                } else if numericish(&left) || numericish(&right) {
                    d.comparison(&self.as_number(&left), token, &self.as_number(&right))
                } else if matches!(left.shape, ResultShape::Scalar(ScalarType::Boolean))
                    || matches!(right.shape, ResultShape::Scalar(ScalarType::Boolean))
                    || left.shape == ResultShape::BooleanPredicate
                    || right.shape == ResultShape::BooleanPredicate
                {
                    d.comparison(&self.as_boolean(&left), token, &self.as_boolean(&right))
                } else {
                    d.comparison(&self.as_text(&left), token, &self.as_text(&right))
                }
            }
        };

        let _ = node;
        let mut out = Fragment::predicate(sql);
        out.merge_deps(&left);
        out.merge_deps(&right);
        Ok(out)
    }

    /// Both sides are temporal literals: decide at compile time.
    /// Overlapping intervals at different precisions are incomparable
    /// and yield empty (NULL).
    fn fold_temporal_comparison(
        &self,
        op: Operator,
        a: &TemporalInfo,
        b: &TemporalInfo,
    ) -> String {
        let same = a.start == b.start && a.end == b.end;
        let before = a.end <= b.start;
        let after = a.start >= b.end;
        let verdict: Option<bool> = match op {
            Operator::Equal => {
                (same || before || after).then_some(same)
            }
            Operator::NotEqual => {
                (same || before || after).then_some(!same)
            }
            Operator::LessThan => {
                if before {
                    Some(true)
                } else if same || after {
                    Some(false)
                } else {
                    None
                }
            }
            Operator::GreaterThan => {
                if after {
                    Some(true)
                } else if same || before {
                    Some(false)
                } else {
                    None
                }
            }
            Operator::LessThanOrEqual => {
                if before || same {
                    Some(true)
                } else if after {
                    Some(false)
                } else {
                    None
                }
            }
            Operator::GreaterThanOrEqual => {
                if after || same {
                    Some(true)
                } else if before {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        };
        match verdict {
            Some(true) => "TRUE".to_string(),
            Some(false) => "FALSE".to_string(),
            None => "CAST(NULL AS BOOLEAN)".to_string(),
        }
    }

    /// Compare a dynamic value against a temporal literal using the
    /// literal's half-open interval. `mirrored` means the literal was on
    /// the left of the operator.
    fn temporal_comparison(
        &self,
        op: Operator,
        value: &Fragment,
        info: &TemporalInfo,
        mirrored: bool,
    ) -> Result<String> {
        let d = self.dialect;
        let op = if mirrored { mirror_operator(op) } else { op };

        let (cast, start_lit, end_lit) = match info.kind {
            TemporalKind::Time => (
                CastType::Time,
                d.time_literal(&info.start.format("%H:%M:%S%.6f").to_string()),
                d.time_literal(&info.end.format("%H:%M:%S%.6f").to_string()),
            ),
            _ => (
                CastType::Timestamp,
                d.datetime_literal(&info.start.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
                d.datetime_literal(&info.end.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            ),
        };

        let value_sql = match value.shape {
            ResultShape::Scalar(ScalarType::Date)
            | ResultShape::Scalar(ScalarType::Timestamp)
            | ResultShape::Scalar(ScalarType::Time) => value.sql.clone(),
            _ => d.safe_cast(&self.as_text(value), cast),
        };

        let full_precision = !info.is_partial;
        Ok(match op {
            Operator::LessThan => d.comparison(&value_sql, "<", &start_lit),
            Operator::LessThanOrEqual => d.comparison(&value_sql, "<", &end_lit),
            Operator::GreaterThan => d.comparison(&value_sql, ">=", &end_lit),
            Operator::GreaterThanOrEqual => d.comparison(&value_sql, ">=", &start_lit),
            Operator::Equal if full_precision => d.comparison(&value_sql, "=", &start_lit),
            Operator::NotEqual if full_precision => d.comparison(&value_sql, "<>", &start_lit),
            Operator::Equal => format!(
                "(CASE WHEN {v} IS NULL THEN NULL \
                 WHEN {v} < {start} OR {v} >= {end} THEN FALSE \
                 ELSE NULL END)",
                v = value_sql,
                start = start_lit,
                end = end_lit
            ),
            Operator::NotEqual => format!(
                "(CASE WHEN {v} IS NULL THEN NULL \
                 WHEN {v} < {start} OR {v} >= {end} THEN TRUE \
                 ELSE NULL END)",
                v = value_sql,
                start = start_lit,
                end = end_lit
            ),
            other => {
                return Err(TranslationError::UnsupportedOperator {
                    operator: other.symbol().to_string(),
                    operand: "temporal values".to_string(),
                    source_text: info.original.clone(),
                })
            }
        })
    }

    // ------------------------------------------------------------------
    // Conditionals
    // ------------------------------------------------------------------

    fn visit_conditional(
        &mut self,
        node: &ExprNode,
        kind: ConditionalKind,
        target: Option<&ExprNode>,
        arguments: &[ExprNode],
    ) -> Result<Fragment> {
        match kind {
            ConditionalKind::Where => {
                if arguments.len() != 1 {
                    return Err(self.wrong_arity(node, "where", "1", arguments.len()));
                }
                let input = self.visit_target(target)?;
                let array = self.as_array(&input);
                let alias = self.fresh_alias("w");
                self.push_scope(alias.clone());
                let predicate = self.visit(&arguments[0]);
                self.pop_scope();
                let predicate = predicate?;
                let predicate_sql = self.as_boolean(&predicate);
                let mut out = Fragment::array(self.dialect.filter_json_array(
                    &array,
                    &alias,
                    &predicate_sql,
                ));
                out.merge_deps(&input);
                out.merge_deps(&predicate);
                Ok(out)
            }
            ConditionalKind::Select => {
                if arguments.len() != 1 {
                    return Err(self.wrong_arity(node, "select", "1", arguments.len()));
                }
                let input = self.visit_target(target)?;
                let array = self.as_array(&input);
                let alias = self.fresh_alias("s");
                self.push_scope(alias.clone());
                let projection = self.visit(&arguments[0]);
                self.pop_scope();
                let projection = projection?;

                let sql = if projection.shape == ResultShape::JsonArray {
                    // Collection-valued projection: map, then flatten one
                    // level, matching path-navigation semantics.
                    let mapped = self.dialect.transform_json_array(
                        &array,
                        &alias,
                        &projection.sql,
                    );
                    self.flatten_array(&mapped)
                } else {
                    self.dialect.transform_json_array(
                        &array,
                        &alias,
                        &self.as_json_value(&projection),
                    )
                };
                let mut out = Fragment::array(sql);
                out.merge_deps(&input);
                out.merge_deps(&projection);
                Ok(out)
            }
            ConditionalKind::Iif => {
                if !(2..=3).contains(&arguments.len()) {
                    return Err(self.wrong_arity(node, "iif", "2..3", arguments.len()));
                }
                let condition = self.visit(&arguments[0])?;
                let then_branch = self.visit(&arguments[1])?;
                let else_branch = arguments.get(2).map(|a| self.visit(a)).transpose()?;

                let condition_sql = self.as_boolean(&condition);
                // Both branches are emitted, each guarded by the
                // condition; only the taken arm evaluates.
                let same_scalar = match (&then_branch.shape, else_branch.as_ref().map(|e| e.shape))
                {
                    (ResultShape::Scalar(a), Some(ResultShape::Scalar(b))) if *a == b => Some(*a),
                    (ResultShape::Scalar(a), None) => Some(*a),
                    _ => None,
                };

                let (then_sql, else_sql, shape) = if let Some(scalar) = same_scalar {
                    (
                        then_branch.sql.clone(),
                        else_branch
                            .as_ref()
                            .map(|e| e.sql.clone())
                            .unwrap_or_else(|| "NULL".to_string()),
                        ResultShape::Scalar(scalar),
                    )
                } else {
                    (
                        self.as_json_value(&then_branch),
                        else_branch
                            .as_ref()
                            .map(|e| self.as_json_value(e))
                            .unwrap_or_else(|| "NULL".to_string()),
                        ResultShape::JsonValue,
                    )
                };

                let mut out = Fragment::new(
                    self.dialect.conditional(&condition_sql, &then_sql, &else_sql),
                    shape,
                );
                out.merge_deps(&condition);
                out.merge_deps(&then_branch);
                if let Some(e) = &else_branch {
                    out.merge_deps(e);
                }
                Ok(out)
            }
        }
    }

    /// Flatten one level of a JSON array of arrays, preserving order.
    pub(crate) fn flatten_array(&mut self, array_sql: &str) -> String {
        let d = self.dialect;
        let outer = d.enumerate_json_array(array_sql, "v1", "i1");
        let inner_base = Fragment::json("b.v1".to_string());
        let inner_array = self.as_array(&inner_base);
        let inner = d.enumerate_json_array(&inner_array, "v2", "i2");
        format!(
            "(SELECT {agg} FROM ({outer}) AS b CROSS JOIN LATERAL ({inner}) AS s)",
            agg = d.aggregate_to_json_array_ordered("s.v2", "b.i1, s.i2"),
            outer = outer,
            inner = inner
        )
    }

    // ------------------------------------------------------------------
    // Aggregations
    // ------------------------------------------------------------------

    fn visit_aggregation(
        &mut self,
        node: &ExprNode,
        function: AggregateFunction,
        target: Option<&ExprNode>,
        arguments: &[ExprNode],
    ) -> Result<Fragment> {
        if !arguments.is_empty() {
            return Err(self.wrong_arity(node, function.name(), "0", arguments.len()));
        }
        let input = self.visit_target(target)?;
        let array = self.as_array(&input);
        let d = self.dialect;

        let fragment = match function {
            AggregateFunction::Count => {
                Fragment::scalar(d.count_elements(&array, true), ScalarType::Integer)
            }
            _ => {
                let aggregate = match function {
                    AggregateFunction::Sum => "SUM",
                    AggregateFunction::Avg => "AVG",
                    AggregateFunction::Min => "MIN",
                    AggregateFunction::Max => "MAX",
                    AggregateFunction::Count => unreachable!(),
                };
                let element = d.safe_cast(&d.json_unquote("agg_e.v"), CastType::Decimal);
                Fragment::scalar(
                    format!(
                        "(SELECT {agg}({element}) FROM ({rows}) AS agg_e)",
                        agg = aggregate,
                        element = element,
                        rows = d.enumerate_json_array(&array, "v", "i")
                    ),
                    ScalarType::Decimal,
                )
            }
        };

        let mut out = fragment;
        out.merge_deps(&input);
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Type operations
    // ------------------------------------------------------------------

    fn visit_type_operation(
        &mut self,
        node: &ExprNode,
        kind: TypeOperationKind,
        target_type: &str,
        operand: Option<&ExprNode>,
    ) -> Result<Fragment> {
        let route = types::route_type(target_type);

        // Scalar literals decide `is` at compile time.
        if kind == TypeOperationKind::Is {
            if let Some(ExprKind::Literal(literal)) = operand.map(|o| &o.kind) {
                if let Some(folded) = fold_literal_is(literal, &route) {
                    return Ok(Fragment::predicate(if folded { "TRUE" } else { "FALSE" }));
                }
            }
        }

        let input = self.visit_target(operand)?;
        let d = self.dialect;

        let fragment = match kind {
            TypeOperationKind::Is => {
                let value = self.singleton_json(&input);
                let check = match &route {
                    TypeRoute::Primitive(family) => d.json_type_check(&value, *family),
                    TypeRoute::Temporal(shape) => {
                        let is_string = d.json_type_check(&value, JsonTypeFamily::String);
                        let pattern = d.string_literal(shape.pattern());
                        let matches = d.regex_match(&d.json_unquote(&value), &pattern);
                        d.logical_and(&is_string, &matches)
                    }
                    TypeRoute::Complex(name) => {
                        if is_resource_name(name) {
                            d.comparison(
                                &d.extract_json_text(&value, "$.resourceType"),
                                "=",
                                &d.string_literal(name),
                            )
                        } else {
                            d.json_type_check(&value, JsonTypeFamily::Object)
                        }
                    }
                    TypeRoute::Unknown(name) => {
                        // Poison: unknown type names must fail at
                        // execution, never silently produce NULL.
                        return Ok(Fragment::predicate(
                            d.invalid_type_cast(&d.cast_to_text(&value), name),
                        ));
                    }
                };
                // is() on an absent input yields empty, not false, so a
                // where(x is T) filter drops rows where x is missing.
                Fragment::predicate(format!(
                    "(CASE WHEN ({v}) IS NULL THEN NULL ELSE {check} END)",
                    v = value,
                    check = check
                ))
            }
            TypeOperationKind::As => {
                let value = self.singleton_json(&input);
                match &route {
                    TypeRoute::Primitive(JsonTypeFamily::String) => {
                        Fragment::scalar(d.json_unquote(&value), ScalarType::Text)
                    }
                    TypeRoute::Primitive(JsonTypeFamily::Integer) => Fragment::scalar(
                        d.safe_cast(&d.json_unquote(&value), CastType::Integer),
                        ScalarType::Integer,
                    ),
                    TypeRoute::Primitive(JsonTypeFamily::Decimal) => Fragment::scalar(
                        d.safe_cast(&d.json_unquote(&value), CastType::Decimal),
                        ScalarType::Decimal,
                    ),
                    TypeRoute::Primitive(JsonTypeFamily::Boolean) => Fragment::scalar(
                        d.safe_cast(&d.json_unquote(&value), CastType::Boolean),
                        ScalarType::Boolean,
                    ),
                    TypeRoute::Primitive(_) => Fragment::json(value),
                    TypeRoute::Temporal(shape) => {
                        let cast = match shape {
                            types::TemporalShape::Date => CastType::Date,
                            types::TemporalShape::DateTime => CastType::Timestamp,
                            types::TemporalShape::Time => CastType::Time,
                        };
                        Fragment::scalar(
                            d.safe_cast(&d.json_unquote(&value), cast),
                            ScalarType::Unknown,
                        )
                    }
                    TypeRoute::Complex(name) => {
                        let guard = if is_resource_name(name) {
                            d.comparison(
                                &d.extract_json_text(&value, "$.resourceType"),
                                "=",
                                &d.string_literal(name),
                            )
                        } else {
                            d.json_type_check(&value, JsonTypeFamily::Object)
                        };
                        Fragment::json(format!(
                            "(CASE WHEN {guard} THEN {v} ELSE NULL END)",
                            guard = guard,
                            v = value
                        ))
                    }
                    TypeRoute::Unknown(name) => Fragment::scalar(
                        d.invalid_type_cast(&d.cast_to_text(&value), name),
                        ScalarType::Unknown,
                    ),
                }
            }
            TypeOperationKind::OfType => {
                let array = self.as_array(&input);
                match &route {
                    TypeRoute::Primitive(family) => {
                        Fragment::array(d.collection_type_filter(&array, *family))
                    }
                    TypeRoute::Temporal(shape) => {
                        let alias = self.fresh_alias("tf");
                        let is_string = d.json_type_check(&alias, JsonTypeFamily::String);
                        let pattern = d.string_literal(shape.pattern());
                        let matches = d.regex_match(&d.json_unquote(&alias), &pattern);
                        let predicate = d.logical_and(&is_string, &matches);
                        Fragment::array(d.filter_json_array(&array, &alias, &predicate))
                    }
                    TypeRoute::Complex(name) => {
                        let alias = self.fresh_alias("tf");
                        let predicate = if is_resource_name(name) {
                            d.comparison(
                                &d.extract_json_text(&alias, "$.resourceType"),
                                "=",
                                &d.string_literal(name),
                            )
                        } else {
                            d.json_type_check(&alias, JsonTypeFamily::Object)
                        };
                        Fragment::array(d.filter_json_array(&array, &alias, &predicate))
                    }
                    TypeRoute::Unknown(name) => Fragment::array(
                        d.invalid_type_cast(&d.cast_to_text(&array), name),
                    ),
                }
            }
        };

        let _ = node;
        let mut out = fragment;
        out.merge_deps(&input);
        Ok(out)
    }

    /// Single JSON value of an input fragment (scalar inputs convert).
    pub(crate) fn singleton_json(&self, fragment: &Fragment) -> String {
        match fragment.shape {
            ResultShape::JsonArray => self.singleton(fragment),
            ResultShape::JsonValue => fragment.sql.clone(),
            _ => self.dialect.to_json(&fragment.sql),
        }
    }

    // ------------------------------------------------------------------
    // Variables and targets
    // ------------------------------------------------------------------

    fn visit_variable(&mut self, node: &ExprNode, variable: &VariableKind) -> Result<Fragment> {
        match variable {
            VariableKind::This => Ok(self.context_fragment()),
            VariableKind::External(name) => match name.as_str() {
                "resource" | "rootResource" | "context" => {
                    let root = self.root_json();
                    Ok(Fragment::json(self.dialect.to_json(&root)))
                }
                "ucum" => Ok(Fragment::scalar(
                    self.dialect.string_literal("http://unitsofmeasure.org"),
                    ScalarType::Text,
                )),
                other => Err(TranslationError::Unsupported {
                    message: format!("external constant %{} is not defined", other),
                    source_text: self.node_text(node),
                }),
            },
            VariableKind::Index | VariableKind::Total => Err(TranslationError::Unsupported {
                message: "$index/$total are only defined inside aggregate()".to_string(),
                source_text: self.node_text(node),
            }),
        }
    }

    /// Resolve a function/conditional target: explicit expression or the
    /// current context.
    pub(crate) fn visit_target(&mut self, target: Option<&ExprNode>) -> Result<Fragment> {
        match target {
            Some(node) => self.visit(node),
            None => Ok(self.context_fragment()),
        }
    }

    pub(crate) fn wrong_arity(
        &self,
        node: &ExprNode,
        name: &str,
        expected: &str,
        found: usize,
    ) -> TranslationError {
        TranslationError::WrongArity {
            name: name.to_string(),
            expected: expected.to_string(),
            found,
            source_text: self.node_text(node),
        }
    }
}

fn temporal_literal_of(node: &ExprNode) -> Option<&TemporalInfo> {
    match &node.kind {
        ExprKind::Literal(LiteralValue::Temporal(info)) => Some(info),
        _ => None,
    }
}

fn comparison_token(op: Operator) -> &'static str {
    match op {
        Operator::Equal => "=",
        Operator::NotEqual => "<>",
        Operator::LessThan => "<",
        Operator::LessThanOrEqual => "<=",
        Operator::GreaterThan => ">",
        Operator::GreaterThanOrEqual => ">=",
        _ => "=",
    }
}

fn mirror_operator(op: Operator) -> Operator {
    match op {
        Operator::LessThan => Operator::GreaterThan,
        Operator::LessThanOrEqual => Operator::GreaterThanOrEqual,
        Operator::GreaterThan => Operator::LessThan,
        Operator::GreaterThanOrEqual => Operator::LessThanOrEqual,
        other => other,
    }
}

fn is_resource_name(name: &str) -> bool {
    matches!(types::route_type(name), TypeRoute::Complex(_))
        && name.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
        && !matches!(
            name,
            "HumanName"
                | "Address"
                | "ContactPoint"
                | "Identifier"
                | "Coding"
                | "CodeableConcept"
                | "Quantity"
                | "Range"
                | "Period"
                | "Ratio"
                | "Attachment"
                | "Annotation"
                | "SampledData"
                | "Signature"
                | "Timing"
                | "Reference"
                | "Meta"
                | "Narrative"
                | "Extension"
                | "Dosage"
                | "Money"
                | "Age"
                | "Count"
                | "Distance"
                | "Duration"
        )
}

/// Compile-time `is` for scalar literals.
fn fold_literal_is(literal: &LiteralValue, route: &TypeRoute) -> Option<bool> {
    let family = match route {
        TypeRoute::Primitive(f) => *f,
        TypeRoute::Temporal(shape) => {
            return Some(match (literal, shape) {
                (LiteralValue::Temporal(info), types::TemporalShape::Date) => {
                    info.kind == TemporalKind::Date
                }
                (LiteralValue::Temporal(info), types::TemporalShape::DateTime) => {
                    info.kind == TemporalKind::DateTime
                }
                (LiteralValue::Temporal(info), types::TemporalShape::Time) => {
                    info.kind == TemporalKind::Time
                }
                _ => false,
            })
        }
        TypeRoute::Complex(_) => {
            return Some(matches!(literal, LiteralValue::Quantity(_)));
        }
        TypeRoute::Unknown(_) => return None,
    };
    Some(match literal {
        LiteralValue::String(_) => family == JsonTypeFamily::String,
        LiteralValue::Integer(_) => family == JsonTypeFamily::Integer,
        LiteralValue::Decimal(_) => family == JsonTypeFamily::Decimal,
        LiteralValue::Boolean(_) => family == JsonTypeFamily::Boolean,
        LiteralValue::Temporal(_) => false,
        LiteralValue::Quantity(_) => false,
        LiteralValue::Empty => return None,
    })
}

/// Precision → truncation unit for boundary emission.
pub(crate) fn unit_for_precision(precision: TemporalPrecision) -> TemporalUnit {
    match precision {
        TemporalPrecision::Year => TemporalUnit::Year,
        TemporalPrecision::Month => TemporalUnit::Month,
        TemporalPrecision::Day => TemporalUnit::Day,
        TemporalPrecision::Hour => TemporalUnit::Hour,
        TemporalPrecision::Minute => TemporalUnit::Minute,
        TemporalPrecision::Second => TemporalUnit::Second,
        TemporalPrecision::Fraction => TemporalUnit::Millisecond,
    }
}

/// Temporal kind → dialect boundary family.
pub(crate) fn value_kind_for(kind: TemporalKind) -> TemporalValueKind {
    match kind {
        TemporalKind::Date => TemporalValueKind::Date,
        TemporalKind::DateTime => TemporalValueKind::DateTime,
        TemporalKind::Time => TemporalValueKind::Time,
    }
}
