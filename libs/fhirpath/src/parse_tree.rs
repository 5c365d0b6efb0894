//! Raw parse tree
//!
//! Mirrors the FHIRPath grammar structure directly, without semantic
//! analysis. The AST builder (`builder` module) converts this tree into the
//! typed, categorised AST; the wrapper nodes (`TermExpression`,
//! `ParenthesizedTerm`, `InvocationExpression`) exist here precisely so the
//! builder has something explicit to unwrap.

use crate::token::Span;

/// A node of the raw parse tree: grammar-rule kind plus source span.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub kind: RawKind,
    pub span: Span,
}

impl RawNode {
    pub fn new(kind: RawKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Grammar-rule label, used by diagnostics and builder errors.
    pub fn rule_name(&self) -> &'static str {
        match &self.kind {
            RawKind::TermExpression { .. } => "TermExpression",
            RawKind::InvocationExpression { .. } => "InvocationExpression",
            RawKind::IndexerExpression { .. } => "IndexerExpression",
            RawKind::PolarityExpression { .. } => "PolarityExpression",
            RawKind::BinaryExpression { .. } => "BinaryExpression",
            RawKind::TypeExpression { .. } => "TypeExpression",
            RawKind::ParenthesizedTerm { .. } => "ParenthesizedTerm",
            RawKind::MemberInvocation { .. } => "MemberInvocation",
            RawKind::FunctionInvocation { .. } => "FunctionInvocation",
            RawKind::ThisInvocation => "ThisInvocation",
            RawKind::IndexInvocation => "IndexInvocation",
            RawKind::TotalInvocation => "TotalInvocation",
            RawKind::ExternalConstant { .. } => "ExternalConstantTerm",
            RawKind::NullLiteral => "NullLiteral",
            RawKind::BooleanLiteral(_) => "BooleanLiteral",
            RawKind::StringLiteral(_) => "StringLiteral",
            RawKind::NumberLiteral { .. } => "NumberLiteral",
            RawKind::TemporalLiteral { .. } => "TemporalLiteral",
            RawKind::QuantityLiteral { .. } => "QuantityLiteral",
        }
    }
}

/// Raw operator spelling, as written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawOp {
    Multiply,
    Divide,
    Div,
    Mod,
    Plus,
    Minus,
    Concat,
    Union,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    Equivalent,
    NotEqual,
    NotEquivalent,
    In,
    Contains,
    And,
    Or,
    Xor,
    Implies,
}

impl RawOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            RawOp::Multiply => "*",
            RawOp::Divide => "/",
            RawOp::Div => "div",
            RawOp::Mod => "mod",
            RawOp::Plus => "+",
            RawOp::Minus => "-",
            RawOp::Concat => "&",
            RawOp::Union => "|",
            RawOp::LessThan => "<",
            RawOp::LessThanOrEqual => "<=",
            RawOp::GreaterThan => ">",
            RawOp::GreaterThanOrEqual => ">=",
            RawOp::Equal => "=",
            RawOp::Equivalent => "~",
            RawOp::NotEqual => "!=",
            RawOp::NotEquivalent => "!~",
            RawOp::In => "in",
            RawOp::Contains => "contains",
            RawOp::And => "and",
            RawOp::Or => "or",
            RawOp::Xor => "xor",
            RawOp::Implies => "implies",
        }
    }
}

/// Temporal literal kind at the grammar level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTemporalKind {
    Date,
    DateTime,
    Time,
}

/// Grammar-shaped node variants.
#[derive(Debug, Clone, PartialEq)]
pub enum RawKind {
    /// `term` promoted to an expression
    TermExpression { term: Box<RawNode> },

    /// `expression '.' invocation`
    InvocationExpression {
        expression: Box<RawNode>,
        invocation: Box<RawNode>,
    },

    /// `expression '[' expression ']'`
    IndexerExpression {
        collection: Box<RawNode>,
        index: Box<RawNode>,
    },

    /// `('+' | '-') expression`
    PolarityExpression {
        negative: bool,
        expression: Box<RawNode>,
    },

    /// Any infix operator application. The precedence climb in the parser
    /// guarantees well-nested operands, so a single variant suffices.
    BinaryExpression {
        left: Box<RawNode>,
        op: RawOp,
        right: Box<RawNode>,
    },

    /// `expression ('is' | 'as') typeSpecifier`
    TypeExpression {
        expression: Box<RawNode>,
        is_operation: bool,
        type_name: String,
    },

    /// `'(' expression ')'`
    ParenthesizedTerm { expression: Box<RawNode> },

    /// `identifier`
    MemberInvocation { name: String, delimited: bool },

    /// `identifier '(' paramList? ')'`
    FunctionInvocation {
        name: String,
        arguments: Vec<RawNode>,
    },

    ThisInvocation,
    IndexInvocation,
    TotalInvocation,

    /// `'%' (identifier | STRING)`
    ExternalConstant { name: String },

    /// `'{' '}'`
    NullLiteral,

    BooleanLiteral(bool),
    StringLiteral(String),

    /// NUMBER / LONGNUMBER; value parsing is deferred to the builder so the
    /// raw tree keeps the exact source text.
    NumberLiteral { text: String, long: bool },

    /// `@`-prefixed literal; `text` excludes the `@` but keeps a trailing
    /// partial-datetime `T`.
    TemporalLiteral { text: String, kind: RawTemporalKind },

    /// `NUMBER unit` where unit is a quoted UCUM code or a calendar keyword.
    QuantityLiteral { value: String, unit: String },
}
