//! Expression analysis
//!
//! Two consumers: the translator asks for derived metadata (optimization
//! hints, CTE context) per node, and tooling asks for whole-expression
//! complexity reports. Both are lazy; nothing here runs during the build
//! phase itself.

use crate::ast::{AggregateFunction, ConditionalKind, ExprKind, ExprNode};
use crate::metadata::{CteContext, DerivedMetadata, NodeCategory, OptimizationHint};
use std::collections::HashMap;

impl ExprNode {
    /// Derived metadata for this node, computed on first access.
    pub fn derived_metadata(&self) -> &DerivedMetadata {
        self.metadata.derived_with(|| compute_derived(self))
    }
}

fn compute_derived(node: &ExprNode) -> DerivedMetadata {
    let mut hints = Vec::new();
    let mut cte = CteContext {
        can_be_subquery: true,
        ..CteContext::default()
    };

    match &node.kind {
        ExprKind::Literal(_) => {
            hints.push(OptimizationHint::ProjectionSafe);
            hints.push(OptimizationHint::Vectorizable);
        }
        ExprKind::Identifier { .. } | ExprKind::Path { .. } => {
            hints.push(OptimizationHint::ProjectionSafe);
            hints.push(OptimizationHint::IndexFriendly);
            if let Some(root) = path_root(node) {
                cte.dependent_tables = vec![root];
            }
        }
        ExprKind::Aggregation { function, .. } => {
            hints.push(OptimizationHint::AggregationCandidate);
            hints.push(OptimizationHint::CteReusable);
            if matches!(function, AggregateFunction::Count | AggregateFunction::Sum) {
                hints.push(OptimizationHint::Vectorizable);
            }
        }
        ExprKind::Conditional { kind, .. } => {
            if *kind == ConditionalKind::Where {
                hints.push(OptimizationHint::PopulationFilter);
                hints.push(OptimizationHint::CteReusable);
            }
            cte.requires_join = *kind != ConditionalKind::Iif;
        }
        ExprKind::Function { name, .. } => {
            // Collection reshaping functions force an unnest join.
            if matches!(
                name.as_str(),
                "distinct" | "combine" | "exclude" | "intersect" | "repeat" | "descendants"
            ) {
                cte.requires_join = true;
                hints.push(OptimizationHint::CteReusable);
            }
            if matches!(name.as_str(), "skip" | "take" | "last" | "tail") {
                cte.requires_window_function = true;
            }
        }
        ExprKind::Operator { .. }
        | ExprKind::Index { .. }
        | ExprKind::TypeOperation { .. }
        | ExprKind::Variable(_) => {}
    }

    // A subtree repeated elsewhere in the expression is worth
    // materialising once; the translator checks the same hint.
    DerivedMetadata { hints, cte }
}

fn path_root(node: &ExprNode) -> Option<String> {
    match &node.kind {
        ExprKind::Identifier { name, .. } => Some(name.clone()),
        ExprKind::Path { base, .. } => path_root(base),
        _ => None,
    }
}

/// Coarse complexity grade reported to tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityGrade {
    Simple,
    Moderate,
    Complex,
}

/// Whole-expression complexity report.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityReport {
    pub node_count: usize,
    pub depth: usize,
    pub function_count: usize,
    pub aggregation_count: usize,
    pub conditional_count: usize,
    pub grade: ComplexityGrade,
}

/// A repeated subtree worth materialising as a CTE.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOpportunity {
    /// Canonical rendering of the repeated subtree.
    pub subtree: String,
    pub occurrences: usize,
}

/// Analyse a typed AST.
pub fn analyze(node: &ExprNode) -> ComplexityReport {
    let node_count = node.count_nodes();
    let depth = node.depth();
    let function_count = node.find_by_category(NodeCategory::FunctionCall).len();
    let aggregation_count = node.find_by_category(NodeCategory::Aggregation).len();
    let conditional_count = node.find_by_category(NodeCategory::Conditional).len();

    let grade = if node_count <= 5 && depth <= 3 {
        ComplexityGrade::Simple
    } else if node_count <= 25 && depth <= 8 {
        ComplexityGrade::Moderate
    } else {
        ComplexityGrade::Complex
    };

    ComplexityReport {
        node_count,
        depth,
        function_count,
        aggregation_count,
        conditional_count,
        grade,
    }
}

/// Render a node as a canonical key for repeated-subtree detection.
fn subtree_key(node: &ExprNode, out: &mut String) {
    match &node.kind {
        ExprKind::Literal(value) => out.push_str(&format!("lit:{:?}", value)),
        ExprKind::Identifier { name, .. } => {
            out.push_str("id:");
            out.push_str(name);
        }
        ExprKind::Path { base, member, .. } => {
            subtree_key(base, out);
            out.push('.');
            out.push_str(member);
        }
        ExprKind::Index { collection, index } => {
            subtree_key(collection, out);
            out.push('[');
            subtree_key(index, out);
            out.push(']');
        }
        ExprKind::Function {
            name,
            target,
            arguments,
        } => {
            if let Some(t) = target {
                subtree_key(t, out);
                out.push('.');
            }
            out.push_str(name);
            out.push('(');
            for arg in arguments {
                subtree_key(arg, out);
                out.push(',');
            }
            out.push(')');
        }
        ExprKind::Operator { op, operands } => {
            out.push('(');
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    out.push_str(op.symbol());
                }
                subtree_key(operand, out);
            }
            out.push(')');
        }
        ExprKind::Conditional {
            kind,
            target,
            arguments,
        } => {
            if let Some(t) = target {
                subtree_key(t, out);
                out.push('.');
            }
            out.push_str(kind.function_name());
            out.push('(');
            for arg in arguments {
                subtree_key(arg, out);
                out.push(',');
            }
            out.push(')');
        }
        ExprKind::Aggregation {
            function,
            target,
            arguments,
        } => {
            if let Some(t) = target {
                subtree_key(t, out);
                out.push('.');
            }
            out.push_str(function.name());
            out.push('(');
            for arg in arguments {
                subtree_key(arg, out);
                out.push(',');
            }
            out.push(')');
        }
        ExprKind::TypeOperation {
            kind,
            target_type,
            operand,
        } => {
            if let Some(o) = operand {
                subtree_key(o, out);
                out.push(' ');
            }
            out.push_str(kind.as_str());
            out.push(' ');
            out.push_str(target_type);
        }
        ExprKind::Variable(v) => out.push_str(&format!("var:{:?}", v)),
    }
}

/// Find repeated non-trivial subtrees; each is a candidate for a shared
/// CTE.
pub fn optimization_opportunities(node: &ExprNode) -> Vec<OptimizationOpportunity> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    node.walk(&mut |n, _| {
        // Leaves are never worth materialising.
        if n.count_nodes() < 2 {
            return;
        }
        let mut key = String::new();
        subtree_key(n, &mut key);
        *seen.entry(key).or_insert(0) += 1;
    });

    let mut out: Vec<OptimizationOpportunity> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(subtree, occurrences)| OptimizationOpportunity {
            subtree,
            occurrences,
        })
        .collect();
    out.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then(a.subtree.cmp(&b.subtree)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::parser::parse_raw;

    fn parse(source: &str) -> ExprNode {
        build(&parse_raw(source).unwrap()).unwrap()
    }

    #[test]
    fn literal_is_simple() {
        let report = analyze(&parse("1"));
        assert_eq!(report.grade, ComplexityGrade::Simple);
        assert_eq!(report.node_count, 1);
    }

    #[test]
    fn nested_expression_grades_up() {
        let report = analyze(&parse(
            "Patient.name.where(use = 'official').given.first() | Patient.name.where(use = 'maiden').given.first()",
        ));
        assert!(report.grade != ComplexityGrade::Simple);
        assert!(report.conditional_count >= 2);
    }

    #[test]
    fn repeated_subtrees_are_reported() {
        let opportunities =
            optimization_opportunities(&parse("name.given.count() + name.given.count()"));
        assert!(!opportunities.is_empty());
        assert_eq!(opportunities[0].occurrences, 2);
    }

    #[test]
    fn where_gets_population_filter_hint() {
        let node = parse("name.where(use = 'official')");
        assert!(node
            .derived_metadata()
            .has_hint(OptimizationHint::PopulationFilter));
        assert!(node.derived_metadata().cte.requires_join);
    }

    #[test]
    fn aggregation_is_cte_reusable() {
        let node = parse("name.count()");
        assert!(node
            .derived_metadata()
            .has_hint(OptimizationHint::CteReusable));
    }

    #[test]
    fn path_tracks_dependent_root() {
        let node = parse("Patient.name.given");
        assert_eq!(
            node.derived_metadata().cte.dependent_tables,
            vec!["Patient".to_string()]
        );
    }
}
