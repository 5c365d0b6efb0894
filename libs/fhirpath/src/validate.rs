//! Structural AST validation
//!
//! The builder is supposed to uphold these invariants by construction;
//! the validator exists so that the compliance harness and tests can
//! assert them on every tree, and so that hand-constructed trees are
//! checked before translation:
//!
//! - operator nodes carry exactly the operand count their arity demands,
//! - literal nodes are leaves,
//! - aggregation nodes use the closed function set (enforced by type),
//! - child spans are contained in their parent's span,
//! - conditional `iif` has two or three arguments, `where`/`select` one.

use crate::ast::{ConditionalKind, ExprKind, ExprNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One structural problem found in a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    /// Dotted path from the root, e.g. `root.children[1]`.
    pub location: String,
}

/// Result of validating a tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|issue| issue.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
    }
}

/// Validate the structural invariants of a typed AST.
pub fn validate(root: &ExprNode) -> ValidationReport {
    let mut report = ValidationReport::default();
    visit(root, "root", &mut report);
    report
}

fn issue(report: &mut ValidationReport, severity: Severity, location: &str, message: String) {
    report.issues.push(ValidationIssue {
        severity,
        message,
        location: location.to_string(),
    });
}

fn visit(node: &ExprNode, location: &str, report: &mut ValidationReport) {
    match &node.kind {
        ExprKind::Operator { op, operands } => {
            if operands.len() != op.operand_count() {
                issue(
                    report,
                    Severity::Error,
                    location,
                    format!(
                        "operator '{}' has {} operand(s), expected {}",
                        op.symbol(),
                        operands.len(),
                        op.operand_count()
                    ),
                );
            }
        }
        ExprKind::Literal(_) => {
            // children() is structurally empty for literals; nothing to
            // check beyond span containment below.
        }
        ExprKind::Conditional {
            kind, arguments, ..
        } => {
            let ok = match kind {
                ConditionalKind::Iif => (2..=3).contains(&arguments.len()),
                ConditionalKind::Where | ConditionalKind::Select => arguments.len() == 1,
            };
            if !ok {
                issue(
                    report,
                    Severity::Error,
                    location,
                    format!(
                        "{}() has {} argument(s)",
                        kind.function_name(),
                        arguments.len()
                    ),
                );
            }
        }
        ExprKind::TypeOperation { target_type, .. } => {
            if target_type.is_empty() {
                issue(
                    report,
                    Severity::Error,
                    location,
                    "type operation with empty target type".to_string(),
                );
            }
        }
        ExprKind::Aggregation { arguments, .. } => {
            if arguments.len() > 1 {
                issue(
                    report,
                    Severity::Warning,
                    location,
                    format!("aggregation with {} arguments", arguments.len()),
                );
            }
        }
        _ => {}
    }

    for (i, child) in node.children().into_iter().enumerate() {
        let child_location = format!("{}.children[{}]", location, i);
        // Span containment: a child's source slice is a subrange of its
        // parent's. Zero-width synthetic spans are exempt.
        if child.span.end > child.span.start
            && node.span.end > node.span.start
            && (child.span.start < node.span.start || child.span.end > node.span.end)
        {
            issue(
                report,
                Severity::Error,
                &child_location,
                format!(
                    "child span {}..{} escapes parent span {}..{}",
                    child.span.start, child.span.end, node.span.start, node.span.end
                ),
            );
        }
        visit(child, &child_location, report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, LiteralValue, Operator};
    use crate::builder::build;
    use crate::parser::parse_raw;
    use crate::token::Span;

    fn parse(source: &str) -> ExprNode {
        build(&parse_raw(source).unwrap()).unwrap()
    }

    #[test]
    fn built_trees_are_valid() {
        for source in [
            "1 + 1",
            "Patient.name.where(use = 'official').family",
            "(5.5).toQuantity('mg').value",
            "value.ofType(Integer)",
            "@2015 = @2015-01-01",
            "name.count() > 2 and active = true",
        ] {
            let report = validate(&parse(source));
            assert!(report.is_valid(), "{} produced {:?}", source, report);
        }
    }

    #[test]
    fn operator_arity_violation_is_caught() {
        let broken = ExprNode::new(
            ExprKind::Operator {
                op: Operator::Add,
                operands: vec![ExprNode::new(
                    ExprKind::Literal(LiteralValue::Integer(1)),
                    Span::default(),
                )],
            },
            Span::default(),
        );
        let report = validate(&broken);
        assert!(!report.is_valid());
        assert!(report.errors().next().unwrap().message.contains("operand"));
    }

    #[test]
    fn iif_arity_is_checked() {
        let report = validate(&parse("iif(true, 1, 2)"));
        assert!(report.is_valid());
    }

    #[test]
    fn span_containment_violation_is_caught() {
        let child = ExprNode::new(
            ExprKind::Literal(LiteralValue::Integer(1)),
            Span::new(10, 20, 1, 11),
        );
        let parent = ExprNode::new(
            ExprKind::Operator {
                op: Operator::Negate,
                operands: vec![child],
            },
            Span::new(0, 5, 1, 1),
        );
        let report = validate(&parent);
        assert!(!report.is_valid());
    }
}
