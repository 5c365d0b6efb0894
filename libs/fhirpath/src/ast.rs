//! Typed abstract syntax tree
//!
//! The builder converts the grammar-shaped raw tree into this
//! representation: every node is classified into a semantic category,
//! carries its source span, and owns its children exclusively (upward
//! references are never stored; visitors that need a parent keep a stack).

use crate::metadata::{Metadata, NodeCategory, SqlDataType};
use crate::temporal::TemporalInfo;
use crate::token::Span;
use rust_decimal::Decimal;

/// Calendar duration units accepted in unquoted quantity literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl CalendarUnit {
    /// Parse a singular or plural calendar keyword.
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word.trim_end_matches('s') {
            "year" => CalendarUnit::Year,
            "month" => CalendarUnit::Month,
            "week" => CalendarUnit::Week,
            "day" => CalendarUnit::Day,
            "hour" => CalendarUnit::Hour,
            "minute" => CalendarUnit::Minute,
            "second" => CalendarUnit::Second,
            "millisecond" => CalendarUnit::Millisecond,
            _ => return None,
        })
    }

    /// Equivalent UCUM code.
    pub fn ucum_code(&self) -> &'static str {
        match self {
            CalendarUnit::Year => "a",
            CalendarUnit::Month => "mo",
            CalendarUnit::Week => "wk",
            CalendarUnit::Day => "d",
            CalendarUnit::Hour => "h",
            CalendarUnit::Minute => "min",
            CalendarUnit::Second => "s",
            CalendarUnit::Millisecond => "ms",
        }
    }
}

/// A quantity literal: `7 days`, `1 'wk'`, `4.5 'mg'`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityValue {
    pub value: Decimal,
    /// Unit exactly as written (keyword or UCUM code).
    pub unit: String,
    /// Set when the unit was a calendar keyword; other units stay as
    /// text for downstream UCUM handling.
    pub calendar: Option<CalendarUnit>,
    pub original: String,
}

/// Literal payloads, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// `{}`
    Empty,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    Temporal(TemporalInfo),
    Quantity(QuantityValue),
}

impl LiteralValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            LiteralValue::Empty => "empty-collection",
            LiteralValue::Boolean(_) => "boolean",
            LiteralValue::Integer(_) => "integer",
            LiteralValue::Decimal(_) => "decimal",
            LiteralValue::String(_) => "string",
            LiteralValue::Temporal(t) => t.kind.as_str(),
            LiteralValue::Quantity(_) => "quantity",
        }
    }

    pub fn sql_type(&self) -> SqlDataType {
        match self {
            LiteralValue::Empty => SqlDataType::Array,
            LiteralValue::Boolean(_) => SqlDataType::Boolean,
            LiteralValue::Integer(_) => SqlDataType::Integer,
            LiteralValue::Decimal(_) | LiteralValue::Quantity(_) => SqlDataType::Decimal,
            LiteralValue::String(_) => SqlDataType::Text,
            LiteralValue::Temporal(t) => match t.kind {
                crate::temporal::TemporalKind::Date => SqlDataType::Date,
                _ => SqlDataType::Timestamp,
            },
        }
    }
}

/// Operator arity class; drives both validation and SQL emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorArity {
    Unary,
    Binary,
    Logical,
    Comparison,
    Union,
}

/// Typed operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // Arithmetic / string
    Add,
    Subtract,
    Multiply,
    Divide,
    Div,
    Mod,
    Concat,
    // Comparison
    Equal,
    NotEqual,
    Equivalent,
    NotEquivalent,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Logical
    And,
    Or,
    Xor,
    Implies,
    // Collection
    Union,
    // Unary
    Negate,
}

impl Operator {
    pub fn arity(&self) -> OperatorArity {
        match self {
            Operator::Negate => OperatorArity::Unary,
            Operator::And | Operator::Or | Operator::Xor | Operator::Implies => {
                OperatorArity::Logical
            }
            Operator::Equal
            | Operator::NotEqual
            | Operator::Equivalent
            | Operator::NotEquivalent
            | Operator::LessThan
            | Operator::LessThanOrEqual
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqual => OperatorArity::Comparison,
            Operator::Union => OperatorArity::Union,
            _ => OperatorArity::Binary,
        }
    }

    /// Number of operands this operator requires.
    pub fn operand_count(&self) -> usize {
        match self.arity() {
            OperatorArity::Unary => 1,
            _ => 2,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Div => "div",
            Operator::Mod => "mod",
            Operator::Concat => "&",
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Equivalent => "~",
            Operator::NotEquivalent => "!~",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Xor => "xor",
            Operator::Implies => "implies",
            Operator::Union => "|",
            Operator::Negate => "-",
        }
    }
}

/// Conditional constructs; `where`/`select` filter or map a collection,
/// `iif` branches on a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalKind {
    Where,
    Select,
    Iif,
}

impl ConditionalKind {
    pub fn function_name(&self) -> &'static str {
        match self {
            ConditionalKind::Where => "where",
            ConditionalKind::Select => "select",
            ConditionalKind::Iif => "iif",
        }
    }
}

/// The closed aggregation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "count" => AggregateFunction::Count,
            "sum" => AggregateFunction::Sum,
            "avg" => AggregateFunction::Avg,
            "min" => AggregateFunction::Min,
            "max" => AggregateFunction::Max,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

/// Type operations: `is`, `as`, and the `ofType(T)` function form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOperationKind {
    Is,
    As,
    OfType,
}

impl TypeOperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeOperationKind::Is => "is",
            TypeOperationKind::As => "as",
            TypeOperationKind::OfType => "ofType",
        }
    }
}

/// Environment references.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableKind {
    This,
    Index,
    Total,
    External(String),
}

/// Node payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(LiteralValue),

    /// Bare identifier; `qualified` marks backtick-delimited spellings.
    Identifier { name: String, qualified: bool },

    /// One navigation step: `base.member`.
    Path {
        base: Box<ExprNode>,
        member: String,
        delimited: bool,
    },

    /// Subscript: `collection[index]`.
    Index {
        collection: Box<ExprNode>,
        index: Box<ExprNode>,
    },

    /// General function invocation. `target` is the expression the
    /// function was invoked on (`None` for a bare call like `today()`).
    Function {
        name: String,
        target: Option<Box<ExprNode>>,
        arguments: Vec<ExprNode>,
    },

    /// Operator application; `operands.len()` always matches
    /// `op.operand_count()`.
    Operator {
        op: Operator,
        operands: Vec<ExprNode>,
    },

    Conditional {
        kind: ConditionalKind,
        target: Option<Box<ExprNode>>,
        arguments: Vec<ExprNode>,
    },

    Aggregation {
        function: AggregateFunction,
        target: Option<Box<ExprNode>>,
        arguments: Vec<ExprNode>,
    },

    TypeOperation {
        kind: TypeOperationKind,
        target_type: String,
        operand: Option<Box<ExprNode>>,
    },

    Variable(VariableKind),
}

/// A typed AST node: payload, source span, metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub span: Span,
    pub metadata: Metadata,
}

impl ExprNode {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        let metadata = Metadata::with_category(Self::category_of(&kind));
        Self {
            kind,
            span,
            metadata,
        }
    }

    fn category_of(kind: &ExprKind) -> NodeCategory {
        match kind {
            ExprKind::Literal(_) => NodeCategory::Literal,
            ExprKind::Identifier { .. }
            | ExprKind::Path { .. }
            | ExprKind::Index { .. }
            | ExprKind::Variable(_) => NodeCategory::PathExpression,
            ExprKind::Function { .. } => NodeCategory::FunctionCall,
            ExprKind::Operator { .. } => NodeCategory::Operator,
            ExprKind::Conditional { .. } => NodeCategory::Conditional,
            ExprKind::Aggregation { .. } => NodeCategory::Aggregation,
            ExprKind::TypeOperation { .. } => NodeCategory::TypeOperation,
        }
    }

    pub fn category(&self) -> NodeCategory {
        Self::category_of(&self.kind)
    }

    /// Source text of this node within the original expression.
    pub fn source_text<'a>(&self, source: &'a str) -> &'a str {
        self.span.slice(source)
    }

    /// Immediate children in evaluation order.
    pub fn children(&self) -> Vec<&ExprNode> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Identifier { .. } | ExprKind::Variable(_) => {
                Vec::new()
            }
            ExprKind::Path { base, .. } => vec![base],
            ExprKind::Index { collection, index } => vec![collection, index],
            ExprKind::Function {
                target, arguments, ..
            }
            | ExprKind::Conditional {
                target, arguments, ..
            }
            | ExprKind::Aggregation {
                target, arguments, ..
            } => {
                let mut out: Vec<&ExprNode> = Vec::new();
                if let Some(t) = target {
                    out.push(t);
                }
                out.extend(arguments.iter());
                out
            }
            ExprKind::Operator { operands, .. } => operands.iter().collect(),
            ExprKind::TypeOperation { operand, .. } => {
                operand.iter().map(|b| b.as_ref()).collect()
            }
        }
    }

    /// Depth-first preorder walk. The callback receives each node and its
    /// ancestor stack (root first).
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a ExprNode, &[&'a ExprNode])) {
        fn go<'a>(
            node: &'a ExprNode,
            stack: &mut Vec<&'a ExprNode>,
            f: &mut impl FnMut(&'a ExprNode, &[&'a ExprNode]),
        ) {
            f(node, stack);
            stack.push(node);
            for child in node.children() {
                go(child, stack, f);
            }
            stack.pop();
        }
        go(self, &mut Vec::new(), f);
    }

    pub fn count_nodes(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_, _| count += 1);
        count
    }

    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(|c| c.depth())
            .max()
            .unwrap_or(0)
    }

    /// Find all nodes of a given category.
    pub fn find_by_category(&self, category: NodeCategory) -> Vec<&ExprNode> {
        let mut out = Vec::new();
        self.walk(&mut |node, _| {
            if node.category() == category {
                out.push(node);
            }
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(value: LiteralValue) -> ExprNode {
        ExprNode::new(ExprKind::Literal(value), Span::default())
    }

    #[test]
    fn categories_match_variants() {
        assert_eq!(
            literal(LiteralValue::Integer(1)).category(),
            NodeCategory::Literal
        );
        let op = ExprNode::new(
            ExprKind::Operator {
                op: Operator::Add,
                operands: vec![
                    literal(LiteralValue::Integer(1)),
                    literal(LiteralValue::Integer(2)),
                ],
            },
            Span::default(),
        );
        assert_eq!(op.category(), NodeCategory::Operator);
        assert_eq!(op.children().len(), 2);
    }

    #[test]
    fn operator_arity_classes() {
        assert_eq!(Operator::Add.arity(), OperatorArity::Binary);
        assert_eq!(Operator::And.arity(), OperatorArity::Logical);
        assert_eq!(Operator::Equal.arity(), OperatorArity::Comparison);
        assert_eq!(Operator::Union.arity(), OperatorArity::Union);
        assert_eq!(Operator::Negate.arity(), OperatorArity::Unary);
        assert_eq!(Operator::Negate.operand_count(), 1);
        assert_eq!(Operator::Implies.operand_count(), 2);
    }

    #[test]
    fn calendar_units() {
        assert_eq!(CalendarUnit::from_keyword("days"), Some(CalendarUnit::Day));
        assert_eq!(CalendarUnit::from_keyword("week"), Some(CalendarUnit::Week));
        assert_eq!(CalendarUnit::from_keyword("mg"), None);
        assert_eq!(CalendarUnit::Week.ucum_code(), "wk");
    }

    #[test]
    fn walk_provides_ancestors() {
        let inner = literal(LiteralValue::Integer(1));
        let node = ExprNode::new(
            ExprKind::Function {
                name: "abs".into(),
                target: Some(Box::new(inner)),
                arguments: vec![],
            },
            Span::default(),
        );
        let mut depths = Vec::new();
        node.walk(&mut |_, ancestors| depths.push(ancestors.len()));
        assert_eq!(depths, vec![0, 1]);
        assert_eq!(node.depth(), 2);
        assert_eq!(node.count_nodes(), 2);
    }
}
