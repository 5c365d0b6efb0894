//! AST builder: raw parse tree → typed AST
//!
//! Classification rules:
//! - wrapper nodes (`ParenthesizedTerm`, `TermExpression`) collapse to
//!   their child,
//! - `x in C` and `C contains x` both canonicalise to `C.contains(x)`
//!   (collection first),
//! - unary minus folds into numeric literals,
//! - `is`/`as`/`ofType` (operator or function spelling) become type
//!   operations, winning over generic function calls,
//! - the closed aggregation set (`count`, `sum`, `avg`, `min`, `max`)
//!   wins over generic function calls,
//! - `where`/`select`/`iif` become conditionals.

use crate::ast::{
    AggregateFunction, CalendarUnit, ConditionalKind, ExprKind, ExprNode, LiteralValue, Operator,
    QuantityValue, TypeOperationKind, VariableKind,
};
use crate::error::{Error, Result};
use crate::metadata::SqlDataType;
use crate::parse_tree::{RawKind, RawNode, RawOp, RawTemporalKind};
use crate::temporal;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Metadata attribute key under which temporal literals keep their exact
/// source body (used to recover partial-datetime shapes).
pub const ATTR_ORIGINAL_SOURCE: &str = "original_source";

/// Build a typed AST from a raw parse tree.
pub fn build(raw: &RawNode) -> Result<ExprNode> {
    Builder.build_node(raw)
}

struct Builder;

impl Builder {
    fn build_node(&self, raw: &RawNode) -> Result<ExprNode> {
        match &raw.kind {
            // Wrappers collapse to their single child. The child keeps its
            // own category, so a parenthesized function call stays a
            // function call.
            RawKind::TermExpression { term } => self.build_node(term),
            RawKind::ParenthesizedTerm { expression } => self.build_node(expression),

            RawKind::NullLiteral => Ok(self.literal(raw, LiteralValue::Empty)),
            RawKind::BooleanLiteral(value) => Ok(self.literal(raw, LiteralValue::Boolean(*value))),
            RawKind::StringLiteral(text) => {
                Ok(self.literal(raw, LiteralValue::String(text.clone())))
            }
            RawKind::NumberLiteral { text, .. } => {
                let value = self.parse_number(text, false)?;
                Ok(self.literal(raw, value))
            }
            RawKind::TemporalLiteral { text, kind } => self.build_temporal(raw, text, *kind),
            RawKind::QuantityLiteral { value, unit } => self.build_quantity(raw, value, unit),

            RawKind::MemberInvocation { name, delimited } => Ok(ExprNode::new(
                ExprKind::Identifier {
                    name: name.clone(),
                    qualified: *delimited,
                },
                raw.span,
            )),

            RawKind::ThisInvocation => {
                Ok(ExprNode::new(ExprKind::Variable(VariableKind::This), raw.span))
            }
            RawKind::IndexInvocation => Ok(ExprNode::new(
                ExprKind::Variable(VariableKind::Index),
                raw.span,
            )),
            RawKind::TotalInvocation => Ok(ExprNode::new(
                ExprKind::Variable(VariableKind::Total),
                raw.span,
            )),
            RawKind::ExternalConstant { name } => Ok(ExprNode::new(
                ExprKind::Variable(VariableKind::External(name.clone())),
                raw.span,
            )),

            RawKind::FunctionInvocation { name, arguments } => {
                self.build_invocation(raw, None, name, arguments)
            }

            RawKind::InvocationExpression {
                expression,
                invocation,
            } => {
                let base = self.build_node(expression)?;
                match &invocation.kind {
                    RawKind::MemberInvocation { name, delimited } => {
                        let mut node = ExprNode::new(
                            ExprKind::Path {
                                base: Box::new(base),
                                member: name.clone(),
                                delimited: *delimited,
                            },
                            raw.span,
                        );
                        node.metadata.is_collection = true;
                        Ok(node)
                    }
                    RawKind::FunctionInvocation { name, arguments } => {
                        self.build_invocation(raw, Some(base), name, arguments)
                    }
                    other => Err(Error::Build(format!(
                        "Invocation target cannot be a {:?} node",
                        other
                    ))),
                }
            }

            RawKind::IndexerExpression { collection, index } => {
                let collection = self.build_node(collection)?;
                let index = self.build_node(index)?;
                Ok(ExprNode::new(
                    ExprKind::Index {
                        collection: Box::new(collection),
                        index: Box::new(index),
                    },
                    raw.span,
                ))
            }

            RawKind::PolarityExpression {
                negative,
                expression,
            } => self.build_polarity(raw, *negative, expression),

            RawKind::BinaryExpression { left, op, right } => {
                self.build_binary(raw, left, *op, right)
            }

            RawKind::TypeExpression {
                expression,
                is_operation,
                type_name,
            } => {
                let operand = self.build_node(expression)?;
                let kind = if *is_operation {
                    TypeOperationKind::Is
                } else {
                    TypeOperationKind::As
                };
                Ok(ExprNode::new(
                    ExprKind::TypeOperation {
                        kind,
                        target_type: type_name.clone(),
                        operand: Some(Box::new(operand)),
                    },
                    raw.span,
                ))
            }
        }
    }

    fn literal(&self, raw: &RawNode, value: LiteralValue) -> ExprNode {
        let sql_type = value.sql_type();
        let mut node = ExprNode::new(ExprKind::Literal(value), raw.span);
        node.metadata.sql_type = sql_type;
        node
    }

    fn parse_number(&self, text: &str, negative: bool) -> Result<LiteralValue> {
        let signed = if negative {
            format!("-{}", text)
        } else {
            text.to_string()
        };
        if text.contains('.') {
            let value = Decimal::from_str(&signed)
                .map_err(|e| Error::Build(format!("Invalid decimal literal '{}': {}", text, e)))?;
            Ok(LiteralValue::Decimal(value))
        } else {
            let value = signed
                .parse::<i64>()
                .map_err(|e| Error::Build(format!("Invalid integer literal '{}': {}", text, e)))?;
            Ok(LiteralValue::Integer(value))
        }
    }

    fn build_temporal(&self, raw: &RawNode, text: &str, kind: RawTemporalKind) -> Result<ExprNode> {
        let info = match kind {
            RawTemporalKind::Date => temporal::parse_date(text),
            RawTemporalKind::DateTime => temporal::parse_datetime(text),
            RawTemporalKind::Time => temporal::parse_time(text),
        }
        .ok_or_else(|| Error::Build(format!("Invalid temporal literal '@{}'", text)))?;

        let mut node = self.literal(raw, LiteralValue::Temporal(info));
        node.metadata
            .set_attribute(ATTR_ORIGINAL_SOURCE, text.to_string());
        Ok(node)
    }

    fn build_quantity(&self, raw: &RawNode, value: &str, unit: &str) -> Result<ExprNode> {
        let decimal = Decimal::from_str(value)
            .map_err(|e| Error::Build(format!("Invalid quantity value '{}': {}", value, e)))?;
        let quantity = QuantityValue {
            value: decimal,
            unit: unit.to_string(),
            calendar: CalendarUnit::from_keyword(unit),
            original: format!("{} '{}'", value, unit),
        };
        Ok(self.literal(raw, LiteralValue::Quantity(quantity)))
    }

    /// Fold unary minus into numeric literals; `+` is the identity.
    fn build_polarity(&self, raw: &RawNode, negative: bool, operand: &RawNode) -> Result<ExprNode> {
        if !negative {
            return self.build_node(operand);
        }
        // Peel wrappers so `-(42)` folds just like `-42`.
        let mut inner = operand;
        loop {
            match &inner.kind {
                RawKind::ParenthesizedTerm { expression } | RawKind::TermExpression { term: expression } => {
                    inner = expression
                }
                _ => break,
            }
        }
        match &inner.kind {
            RawKind::NumberLiteral { text, .. } => {
                let value = self.parse_number(text, true)?;
                Ok(self.literal(raw, value))
            }
            RawKind::QuantityLiteral { value, unit } => {
                let negated = format!("-{}", value);
                self.build_quantity(raw, &negated, unit)
            }
            _ => {
                let operand = self.build_node(operand)?;
                Ok(ExprNode::new(
                    ExprKind::Operator {
                        op: Operator::Negate,
                        operands: vec![operand],
                    },
                    raw.span,
                ))
            }
        }
    }

    fn build_binary(
        &self,
        raw: &RawNode,
        left: &RawNode,
        op: RawOp,
        right: &RawNode,
    ) -> Result<ExprNode> {
        let left = self.build_node(left)?;
        let right = self.build_node(right)?;

        // Membership canonicalises to `collection.contains(element)`.
        let (collection, element) = match op {
            RawOp::In => (right, left),
            RawOp::Contains => (left, right),
            _ => {
                let operator = match op {
                    RawOp::Multiply => Operator::Multiply,
                    RawOp::Divide => Operator::Divide,
                    RawOp::Div => Operator::Div,
                    RawOp::Mod => Operator::Mod,
                    RawOp::Plus => Operator::Add,
                    RawOp::Minus => Operator::Subtract,
                    RawOp::Concat => Operator::Concat,
                    RawOp::Union => Operator::Union,
                    RawOp::LessThan => Operator::LessThan,
                    RawOp::LessThanOrEqual => Operator::LessThanOrEqual,
                    RawOp::GreaterThan => Operator::GreaterThan,
                    RawOp::GreaterThanOrEqual => Operator::GreaterThanOrEqual,
                    RawOp::Equal => Operator::Equal,
                    RawOp::Equivalent => Operator::Equivalent,
                    RawOp::NotEqual => Operator::NotEqual,
                    RawOp::NotEquivalent => Operator::NotEquivalent,
                    RawOp::And => Operator::And,
                    RawOp::Or => Operator::Or,
                    RawOp::Xor => Operator::Xor,
                    RawOp::Implies => Operator::Implies,
                    RawOp::In | RawOp::Contains => unreachable!(),
                };
                return Ok(ExprNode::new(
                    ExprKind::Operator {
                        op: operator,
                        operands: vec![left, right],
                    },
                    raw.span,
                ));
            }
        };

        Ok(ExprNode::new(
            ExprKind::Function {
                name: "contains".to_string(),
                target: Some(Box::new(collection)),
                arguments: vec![element],
            },
            raw.span,
        ))
    }

    /// Dispatch a (possibly dotted) function invocation to its typed node:
    /// type operations beat aggregations beat conditionals beat generic
    /// function calls.
    fn build_invocation(
        &self,
        raw: &RawNode,
        target: Option<ExprNode>,
        name: &str,
        raw_arguments: &[RawNode],
    ) -> Result<ExprNode> {
        if matches!(name, "is" | "as" | "ofType") {
            if raw_arguments.len() != 1 {
                return Err(Error::Build(format!(
                    "{}() requires exactly one type argument, found {}",
                    name,
                    raw_arguments.len()
                )));
            }
            let target_type = extract_type_name(&raw_arguments[0]).ok_or_else(|| {
                Error::Build(format!("{}() argument is not a type name", name))
            })?;
            let kind = match name {
                "is" => TypeOperationKind::Is,
                "as" => TypeOperationKind::As,
                _ => TypeOperationKind::OfType,
            };
            return Ok(ExprNode::new(
                ExprKind::TypeOperation {
                    kind,
                    target_type,
                    operand: target.map(Box::new),
                },
                raw.span,
            ));
        }

        let arguments = raw_arguments
            .iter()
            .map(|a| self.build_node(a))
            .collect::<Result<Vec<_>>>()?;

        if let Some(function) = AggregateFunction::from_name(name) {
            let mut node = ExprNode::new(
                ExprKind::Aggregation {
                    function,
                    target: target.map(Box::new),
                    arguments,
                },
                raw.span,
            );
            node.metadata.sql_type = match function {
                AggregateFunction::Count => SqlDataType::Integer,
                _ => SqlDataType::Unknown,
            };
            return Ok(node);
        }

        let conditional = match name {
            "where" => Some(ConditionalKind::Where),
            "select" => Some(ConditionalKind::Select),
            "iif" => Some(ConditionalKind::Iif),
            _ => None,
        };
        if let Some(kind) = conditional {
            let mut node = ExprNode::new(
                ExprKind::Conditional {
                    kind,
                    target: target.map(Box::new),
                    arguments,
                },
                raw.span,
            );
            node.metadata.is_collection = kind != ConditionalKind::Iif;
            return Ok(node);
        }

        Ok(ExprNode::new(
            ExprKind::Function {
                name: name.to_string(),
                target: target.map(Box::new),
                arguments,
            },
            raw.span,
        ))
    }
}

/// Dig the type name out of an `ofType(...)` style argument: the argument
/// may be a bare identifier, a qualified chain (`System.String`), or sit
/// behind parentheses.
fn extract_type_name(raw: &RawNode) -> Option<String> {
    match &raw.kind {
        RawKind::MemberInvocation { name, .. } => Some(name.clone()),
        RawKind::ParenthesizedTerm { expression } | RawKind::TermExpression { term: expression } => {
            extract_type_name(expression)
        }
        RawKind::InvocationExpression {
            expression,
            invocation,
        } => {
            let base = extract_type_name(expression)?;
            let member = extract_type_name(invocation)?;
            Some(format!("{}.{}", base, member))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NodeCategory;
    use crate::parser::parse_raw;
    use crate::temporal::TemporalPrecision;

    fn build_source(source: &str) -> ExprNode {
        build(&parse_raw(source).unwrap()).unwrap()
    }

    #[test]
    fn parenthesized_term_unwraps() {
        let node = build_source("(42)");
        assert!(matches!(
            node.kind,
            ExprKind::Literal(LiteralValue::Integer(42))
        ));
    }

    #[test]
    fn parenthesized_function_call_keeps_its_category() {
        let node = build_source("(name.count())");
        assert_eq!(node.category(), NodeCategory::Aggregation);
    }

    #[test]
    fn negative_integer_folds_into_literal() {
        let node = build_source("-42");
        assert!(matches!(
            node.kind,
            ExprKind::Literal(LiteralValue::Integer(-42))
        ));
    }

    #[test]
    fn negative_non_literal_stays_unary() {
        let node = build_source("-name.count()");
        match node.kind {
            ExprKind::Operator { op, operands } => {
                assert_eq!(op, Operator::Negate);
                assert_eq!(operands.len(), 1);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn positive_polarity_is_identity() {
        let node = build_source("+5");
        assert!(matches!(
            node.kind,
            ExprKind::Literal(LiteralValue::Integer(5))
        ));
    }

    #[test]
    fn membership_in_canonicalises_to_contains() {
        let node = build_source("3 in list");
        match node.kind {
            ExprKind::Function {
                name,
                target,
                arguments,
            } => {
                assert_eq!(name, "contains");
                assert!(matches!(
                    target.unwrap().kind,
                    ExprKind::Identifier { ref name, .. } if name == "list"
                ));
                assert!(matches!(
                    arguments[0].kind,
                    ExprKind::Literal(LiteralValue::Integer(3))
                ));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn membership_contains_keeps_collection_first() {
        let node = build_source("list contains 3");
        match node.kind {
            ExprKind::Function { name, target, .. } => {
                assert_eq!(name, "contains");
                assert!(matches!(
                    target.unwrap().kind,
                    ExprKind::Identifier { ref name, .. } if name == "list"
                ));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn is_operator_becomes_type_operation() {
        let node = build_source("'abc' is Integer");
        match node.kind {
            ExprKind::TypeOperation {
                kind, target_type, ..
            } => {
                assert_eq!(kind, TypeOperationKind::Is);
                assert_eq!(target_type, "Integer");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn of_type_function_extracts_nested_type_name() {
        let node = build_source("value.ofType(System.String)");
        match node.kind {
            ExprKind::TypeOperation {
                kind, target_type, ..
            } => {
                assert_eq!(kind, TypeOperationKind::OfType);
                assert_eq!(target_type, "System.String");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn aggregation_wins_over_function_call() {
        let node = build_source("name.count()");
        assert_eq!(node.category(), NodeCategory::Aggregation);
    }

    #[test]
    fn where_becomes_conditional() {
        let node = build_source("name.where(use = 'official')");
        match &node.kind {
            ExprKind::Conditional { kind, .. } => assert_eq!(*kind, ConditionalKind::Where),
            other => panic!("unexpected node: {:?}", other),
        }
        assert_eq!(node.category(), NodeCategory::Conditional);
    }

    #[test]
    fn partial_datetime_is_recovered_from_source() {
        let node = build_source("@2015T");
        match &node.kind {
            ExprKind::Literal(LiteralValue::Temporal(info)) => {
                assert!(info.is_partial);
                assert_eq!(info.precision, TemporalPrecision::Year);
            }
            other => panic!("unexpected node: {:?}", other),
        }
        assert_eq!(node.metadata.attribute(ATTR_ORIGINAL_SOURCE), Some("2015T"));
    }

    #[test]
    fn date_with_day_precision_is_a_date() {
        let node = build_source("@2015-02-04");
        match &node.kind {
            ExprKind::Literal(LiteralValue::Temporal(info)) => {
                assert_eq!(info.kind, crate::temporal::TemporalKind::Date);
                assert!(!info.is_partial);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn quantity_with_calendar_unit() {
        let node = build_source("7 days");
        match &node.kind {
            ExprKind::Literal(LiteralValue::Quantity(q)) => {
                assert_eq!(q.calendar, Some(CalendarUnit::Day));
                assert_eq!(q.unit, "days");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn quantity_with_ucum_unit_stays_text() {
        let node = build_source("1 'wk'");
        match &node.kind {
            ExprKind::Literal(LiteralValue::Quantity(q)) => {
                assert_eq!(q.calendar, None);
                assert_eq!(q.unit, "wk");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn string_escapes_survive_into_literal() {
        let node = build_source(r"'1 \'wk\''");
        assert!(matches!(
            node.kind,
            ExprKind::Literal(LiteralValue::String(ref s)) if s == "1 'wk'"
        ));
    }

    #[test]
    fn empty_collection_literal() {
        let node = build_source("{}");
        assert!(matches!(node.kind, ExprKind::Literal(LiteralValue::Empty)));
    }

    #[test]
    fn path_spans_cover_source() {
        let source = "Patient.name.given";
        let node = build_source(source);
        assert_eq!(node.source_text(source), source);
        match &node.kind {
            ExprKind::Path { base, member, .. } => {
                assert_eq!(member, "given");
                assert_eq!(base.source_text(source), "Patient.name");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn operator_arity_invariant_holds() {
        let node = build_source("1 + 2 * 3 - 4");
        node.walk(&mut |n, _| {
            if let ExprKind::Operator { op, operands } = &n.kind {
                assert_eq!(operands.len(), op.operand_count());
            }
        });
    }
}
