//! FHIRPath parser - converts expression strings to the raw parse tree
//!
//! Recursive descent following the FHIRPath grammar precedence rules.
//! Precedence (lowest to highest):
//! 1. implies
//! 2. or/xor
//! 3. and
//! 4. membership (in, contains)
//! 5. type (is, as)
//! 6. equality (=, ~, !=, !~)
//! 7. inequality (<=, <, >, >=)
//! 8. union (|)
//! 9. additive (+, -, &)
//! 10. multiplicative (*, /, div, mod)
//! 11. polarity (+, -)
//! 12. postfix (indexer, invocation)
//! 13. term (literal, identifier, function, parenthesized, external constant)

use crate::comments::validate_comments;
use crate::error::{enrich_parse_error, Error, ParseError, ParseErrorCategory, Result};
use crate::lexer::Lexer;
use crate::parse_tree::{RawKind, RawNode, RawOp, RawTemporalKind};
use crate::token::{Span, Token, TokenKind};

const MAX_RECURSION_DEPTH: usize = 200;

/// Calendar duration keywords that form quantity literals without quotes.
fn is_calendar_unit(word: &str) -> bool {
    matches!(
        word,
        "year"
            | "years"
            | "month"
            | "months"
            | "week"
            | "weeks"
            | "day"
            | "days"
            | "hour"
            | "hours"
            | "minute"
            | "minutes"
            | "second"
            | "seconds"
            | "millisecond"
            | "milliseconds"
    )
}

/// Parser for FHIRPath expressions
#[derive(Debug)]
pub struct Parser<'a> {
    source: &'a str,
    lexer: Lexer,
    current: Token,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(Error::Parse(
                ParseError::new("Empty expression", 1, 1)
                    .with_category(ParseErrorCategory::EmptyExpression),
            ));
        }
        validate_comments(source)?;

        let mut lexer = Lexer::new(source);
        let current = lexer.next_token().map_err(|e| Self::map_error(e, source))?;
        Ok(Self {
            source,
            lexer,
            current,
            depth: 0,
        })
    }

    fn map_error(error: Error, source: &str) -> Error {
        match error {
            Error::Parse(e) => Error::Parse(enrich_parse_error(e, source)),
            other => other,
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self
            .lexer
            .next_token()
            .map_err(|e| Self::map_error(e, self.source))?;
        Ok(())
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn at_one_of(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.current.kind)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.current.kind == kind {
            let token = self.current.clone();
            self.advance()?;
            Ok(token)
        } else {
            Err(self.syntax_error(format!(
                "Expected {} but found {:?}",
                what, self.current.kind
            )))
        }
    }

    fn syntax_error(&self, message: String) -> Error {
        Error::Parse(enrich_parse_error(
            ParseError::new(message, self.current.span.line, self.current.span.column)
                .with_category(ParseErrorCategory::Syntax),
            self.source,
        ))
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_RECURSION_DEPTH {
            return Err(self.syntax_error(format!(
                "Expression too deeply nested (max depth: {})",
                MAX_RECURSION_DEPTH
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parse the entire expression (top-level entry point)
    pub fn parse(&mut self) -> Result<RawNode> {
        let expr = self.parse_expression()?;
        if !self.at(TokenKind::Eof) {
            return Err(self.syntax_error(format!(
                "Unexpected token {:?} after expression",
                self.current.kind
            )));
        }
        Ok(expr)
    }

    fn parse_expression(&mut self) -> Result<RawNode> {
        self.enter()?;
        let result = self.parse_implies();
        self.leave();
        result
    }

    fn binary(left: RawNode, op: RawOp, right: RawNode) -> RawNode {
        let span = left.span.merge(right.span);
        RawNode::new(
            RawKind::BinaryExpression {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
        )
    }

    fn parse_implies(&mut self) -> Result<RawNode> {
        let mut left = self.parse_or()?;
        while self.at(TokenKind::Implies) {
            self.advance()?;
            let right = self.parse_or()?;
            left = Self::binary(left, RawOp::Implies, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<RawNode> {
        let mut left = self.parse_and()?;
        while self.at_one_of(&[TokenKind::Or, TokenKind::Xor]) {
            let op = if self.at(TokenKind::Or) {
                RawOp::Or
            } else {
                RawOp::Xor
            };
            self.advance()?;
            let right = self.parse_and()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<RawNode> {
        let mut left = self.parse_membership()?;
        while self.at(TokenKind::And) {
            self.advance()?;
            let right = self.parse_membership()?;
            left = Self::binary(left, RawOp::And, right);
        }
        Ok(left)
    }

    fn parse_membership(&mut self) -> Result<RawNode> {
        let mut left = self.parse_type()?;
        while self.at_one_of(&[TokenKind::In, TokenKind::Contains]) {
            let op = if self.at(TokenKind::In) {
                RawOp::In
            } else {
                RawOp::Contains
            };
            self.advance()?;
            let right = self.parse_type()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    /// Type operations sit between membership and equality so that
    /// `(1 | 1) is Integer` and `x = y is Boolean` group the way the HL7
    /// test suite expects.
    fn parse_type(&mut self) -> Result<RawNode> {
        let mut left = self.parse_equality()?;
        while self.at_one_of(&[TokenKind::Is, TokenKind::As]) {
            let is_operation = self.at(TokenKind::Is);
            self.advance()?;
            let (type_name, type_span) = self.parse_qualified_type_name()?;
            let span = left.span.merge(type_span);
            left = RawNode::new(
                RawKind::TypeExpression {
                    expression: Box::new(left),
                    is_operation,
                    type_name,
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_qualified_type_name(&mut self) -> Result<(String, Span)> {
        let first = self.expect_identifier_like("type name")?;
        let mut name = first.text;
        let mut span = first.span;
        while self.at(TokenKind::Dot) {
            self.advance()?;
            let next = self.expect_identifier_like("type name segment")?;
            name.push('.');
            name.push_str(&next.text);
            span = span.merge(next.span);
        }
        Ok((name, span))
    }

    fn parse_equality(&mut self) -> Result<RawNode> {
        let mut left = self.parse_inequality()?;
        while self.at_one_of(&[
            TokenKind::Equal,
            TokenKind::Equivalent,
            TokenKind::NotEqual,
            TokenKind::NotEquivalent,
        ]) {
            let op = match self.current.kind {
                TokenKind::Equal => RawOp::Equal,
                TokenKind::Equivalent => RawOp::Equivalent,
                TokenKind::NotEqual => RawOp::NotEqual,
                _ => RawOp::NotEquivalent,
            };
            self.advance()?;
            let right = self.parse_inequality()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_inequality(&mut self) -> Result<RawNode> {
        let mut left = self.parse_union()?;
        while self.at_one_of(&[
            TokenKind::LessThan,
            TokenKind::LessThanOrEqual,
            TokenKind::GreaterThan,
            TokenKind::GreaterThanOrEqual,
        ]) {
            let op = match self.current.kind {
                TokenKind::LessThan => RawOp::LessThan,
                TokenKind::LessThanOrEqual => RawOp::LessThanOrEqual,
                TokenKind::GreaterThan => RawOp::GreaterThan,
                _ => RawOp::GreaterThanOrEqual,
            };
            self.advance()?;
            let right = self.parse_union()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_union(&mut self) -> Result<RawNode> {
        let mut left = self.parse_additive()?;
        while self.at(TokenKind::Pipe) {
            self.advance()?;
            let right = self.parse_additive()?;
            left = Self::binary(left, RawOp::Union, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<RawNode> {
        let mut left = self.parse_multiplicative()?;
        while self.at_one_of(&[TokenKind::Plus, TokenKind::Minus, TokenKind::Ampersand]) {
            let op = match self.current.kind {
                TokenKind::Plus => RawOp::Plus,
                TokenKind::Minus => RawOp::Minus,
                _ => RawOp::Concat,
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<RawNode> {
        let mut left = self.parse_polarity()?;
        while self.at_one_of(&[
            TokenKind::Multiply,
            TokenKind::Divide,
            TokenKind::Div,
            TokenKind::Mod,
        ]) {
            let op = match self.current.kind {
                TokenKind::Multiply => RawOp::Multiply,
                TokenKind::Divide => RawOp::Divide,
                TokenKind::Div => RawOp::Div,
                _ => RawOp::Mod,
            };
            self.advance()?;
            let right = self.parse_polarity()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_polarity(&mut self) -> Result<RawNode> {
        if self.at_one_of(&[TokenKind::Plus, TokenKind::Minus]) {
            let negative = self.at(TokenKind::Minus);
            let start = self.current.span;
            self.advance()?;
            let operand = self.parse_polarity()?;
            let span = start.merge(operand.span);
            return Ok(RawNode::new(
                RawKind::PolarityExpression {
                    negative,
                    expression: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_postfix()
    }

    /// Postfix chain: indexers and dotted invocations bind tightest.
    fn parse_postfix(&mut self) -> Result<RawNode> {
        let mut node = self.parse_term()?;
        loop {
            if self.at(TokenKind::Dot) {
                self.advance()?;
                let invocation = self.parse_invocation()?;
                let span = node.span.merge(invocation.span);
                node = RawNode::new(
                    RawKind::InvocationExpression {
                        expression: Box::new(node),
                        invocation: Box::new(invocation),
                    },
                    span,
                );
            } else if self.at(TokenKind::OpenBracket) {
                self.advance()?;
                let index = self.parse_expression()?;
                let close = self.expect(TokenKind::CloseBracket, "']'")?;
                let span = node.span.merge(close.span);
                node = RawNode::new(
                    RawKind::IndexerExpression {
                        collection: Box::new(node),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                break;
            }
        }
        Ok(node)
    }

    /// Keyword tokens double as member/function names after a dot
    /// (`value.is(Integer)`, `list.contains('x')`).
    fn expect_identifier_like(&mut self, what: &str) -> Result<Token> {
        match self.current.kind {
            TokenKind::Identifier
            | TokenKind::DelimitedIdentifier
            | TokenKind::As
            | TokenKind::Is
            | TokenKind::Div
            | TokenKind::Mod
            | TokenKind::In
            | TokenKind::Contains
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::Xor
            | TokenKind::Implies => {
                let token = self.current.clone();
                self.advance()?;
                Ok(token)
            }
            _ => Err(self.syntax_error(format!(
                "Expected {} but found {:?}",
                what, self.current.kind
            ))),
        }
    }

    fn parse_invocation(&mut self) -> Result<RawNode> {
        match self.current.kind {
            TokenKind::This => {
                let span = self.current.span;
                self.advance()?;
                Ok(RawNode::new(RawKind::ThisInvocation, span))
            }
            TokenKind::Index => {
                let span = self.current.span;
                self.advance()?;
                Ok(RawNode::new(RawKind::IndexInvocation, span))
            }
            TokenKind::Total => {
                let span = self.current.span;
                self.advance()?;
                Ok(RawNode::new(RawKind::TotalInvocation, span))
            }
            _ => {
                let delimited = self.at(TokenKind::DelimitedIdentifier);
                let name = self.expect_identifier_like("member or function name")?;
                if self.at(TokenKind::OpenParen) {
                    self.parse_function_call(name)
                } else {
                    let span = name.span;
                    Ok(RawNode::new(
                        RawKind::MemberInvocation {
                            name: name.text,
                            delimited,
                        },
                        span,
                    ))
                }
            }
        }
    }

    fn parse_function_call(&mut self, name: Token) -> Result<RawNode> {
        self.expect(TokenKind::OpenParen, "'('")?;
        let mut arguments = Vec::new();
        if !self.at(TokenKind::CloseParen) {
            loop {
                arguments.push(self.parse_expression()?);
                if self.at(TokenKind::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::CloseParen, "')'")?;
        let span = name.span.merge(close.span);
        Ok(RawNode::new(
            RawKind::FunctionInvocation {
                name: name.text,
                arguments,
            },
            span,
        ))
    }

    fn parse_term(&mut self) -> Result<RawNode> {
        let span = self.current.span;
        match self.current.kind {
            TokenKind::OpenParen => {
                self.advance()?;
                let inner = self.parse_expression()?;
                let close = self.expect(TokenKind::CloseParen, "')'")?;
                Ok(RawNode::new(
                    RawKind::ParenthesizedTerm {
                        expression: Box::new(inner),
                    },
                    span.merge(close.span),
                ))
            }
            TokenKind::OpenBrace => {
                self.advance()?;
                let close = self.expect(TokenKind::CloseBrace, "'}' (empty collection)")?;
                Ok(RawNode::new(RawKind::NullLiteral, span.merge(close.span)))
            }
            TokenKind::Boolean => {
                let value = self.current.text == "true";
                self.advance()?;
                Ok(RawNode::new(RawKind::BooleanLiteral(value), span))
            }
            TokenKind::String => {
                let text = self.current.text.clone();
                self.advance()?;
                Ok(RawNode::new(RawKind::StringLiteral(text), span))
            }
            TokenKind::Number | TokenKind::LongNumber => self.parse_number_or_quantity(),
            TokenKind::Date => {
                let text = self.current.text.clone();
                self.advance()?;
                Ok(RawNode::new(
                    RawKind::TemporalLiteral {
                        text,
                        kind: RawTemporalKind::Date,
                    },
                    span,
                ))
            }
            TokenKind::DateTime => {
                let text = self.current.text.clone();
                self.advance()?;
                Ok(RawNode::new(
                    RawKind::TemporalLiteral {
                        text,
                        kind: RawTemporalKind::DateTime,
                    },
                    span,
                ))
            }
            TokenKind::Time => {
                let text = self.current.text.clone();
                self.advance()?;
                Ok(RawNode::new(
                    RawKind::TemporalLiteral {
                        text,
                        kind: RawTemporalKind::Time,
                    },
                    span,
                ))
            }
            TokenKind::ExternalConstant => {
                let name = self.current.text.clone();
                self.advance()?;
                Ok(RawNode::new(RawKind::ExternalConstant { name }, span))
            }
            TokenKind::This => {
                self.advance()?;
                Ok(RawNode::new(RawKind::ThisInvocation, span))
            }
            TokenKind::Index => {
                self.advance()?;
                Ok(RawNode::new(RawKind::IndexInvocation, span))
            }
            TokenKind::Total => {
                self.advance()?;
                Ok(RawNode::new(RawKind::TotalInvocation, span))
            }
            TokenKind::Identifier | TokenKind::DelimitedIdentifier => {
                let delimited = self.at(TokenKind::DelimitedIdentifier);
                let name = self.current.clone();
                self.advance()?;
                if self.at(TokenKind::OpenParen) {
                    self.parse_function_call(name)
                } else {
                    Ok(RawNode::new(
                        RawKind::MemberInvocation {
                            name: name.text,
                            delimited,
                        },
                        span,
                    ))
                }
            }
            TokenKind::Eof => Err(self.syntax_error("Unexpected end of expression".into())),
            other => Err(self.syntax_error(format!("Unexpected token {:?}", other))),
        }
    }

    /// A number is promoted to a quantity literal when immediately followed
    /// by a quoted UCUM unit or a calendar duration keyword.
    fn parse_number_or_quantity(&mut self) -> Result<RawNode> {
        let number = self.current.clone();
        let long = number.kind == TokenKind::LongNumber;
        self.advance()?;

        if !long {
            if self.at(TokenKind::String) {
                let unit = self.current.clone();
                self.advance()?;
                return Ok(RawNode::new(
                    RawKind::QuantityLiteral {
                        value: number.text,
                        unit: unit.text,
                    },
                    number.span.merge(unit.span),
                ));
            }
            if self.at(TokenKind::Identifier) && is_calendar_unit(&self.current.text) {
                let unit = self.current.clone();
                self.advance()?;
                return Ok(RawNode::new(
                    RawKind::QuantityLiteral {
                        value: number.text,
                        unit: unit.text,
                    },
                    number.span.merge(unit.span),
                ));
            }
        }

        Ok(RawNode::new(
            RawKind::NumberLiteral {
                text: number.text,
                long,
            },
            number.span,
        ))
    }
}

/// Parse `source` into a raw tree. This is the front door used by the AST
/// builder and the parse cache.
pub fn parse_raw(source: &str) -> Result<RawNode> {
    Parser::new(source)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_expression_is_rejected() {
        let err = Parser::new("   ").unwrap_err();
        assert_eq!(err.category(), ParseErrorCategory::EmptyExpression);
    }

    #[test]
    fn simple_path() {
        let node = parse_raw("Patient.name.given").unwrap();
        assert!(matches!(node.kind, RawKind::InvocationExpression { .. }));
    }

    #[test]
    fn precedence_arithmetic_over_comparison() {
        let node = parse_raw("1 + 2 < 5").unwrap();
        match node.kind {
            RawKind::BinaryExpression { op, left, .. } => {
                assert_eq!(op, RawOp::LessThan);
                assert!(matches!(
                    left.kind,
                    RawKind::BinaryExpression { op: RawOp::Plus, .. }
                ));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn type_expression_after_union() {
        let node = parse_raw("(1 | 1) is Integer").unwrap();
        match node.kind {
            RawKind::TypeExpression {
                is_operation,
                type_name,
                ..
            } => {
                assert!(is_operation);
                assert_eq!(type_name, "Integer");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn indexer() {
        let node = parse_raw("name[0]").unwrap();
        assert!(matches!(node.kind, RawKind::IndexerExpression { .. }));
    }

    #[test]
    fn function_with_arguments() {
        let node = parse_raw("where(use = 'official')").unwrap();
        match node.kind {
            RawKind::FunctionInvocation { name, arguments } => {
                assert_eq!(name, "where");
                assert_eq!(arguments.len(), 1);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn keyword_functions_after_dot() {
        assert!(parse_raw("value.is(Integer)").is_ok());
        assert!(parse_raw("value.as(Quantity)").is_ok());
        assert!(parse_raw("name.contains('x')").is_ok());
    }

    #[test]
    fn empty_collection_literal() {
        let node = parse_raw("{}").unwrap();
        assert!(matches!(node.kind, RawKind::NullLiteral));
    }

    #[test]
    fn quantity_literals() {
        match parse_raw("7 days").unwrap().kind {
            RawKind::QuantityLiteral { value, unit } => {
                assert_eq!(value, "7");
                assert_eq!(unit, "days");
            }
            other => panic!("unexpected node: {:?}", other),
        }
        match parse_raw("1 'wk'").unwrap().kind {
            RawKind::QuantityLiteral { unit, .. } => assert_eq!(unit, "wk"),
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn plain_identifier_next_to_number_is_not_a_quantity() {
        // `4 and true` must not absorb `and` as a unit.
        assert!(parse_raw("4 and true").is_ok());
    }

    #[test]
    fn unbalanced_paren_is_syntax_error_with_hint() {
        let err = parse_raw("Patient.name.where(use = 'official'").unwrap_err();
        let parse = err.parse_error().unwrap();
        assert_eq!(parse.category, ParseErrorCategory::Syntax);
        assert!(parse.hint.as_deref().unwrap_or("").contains("parenthes"));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse_raw("1 + 2 )").is_err());
    }

    #[test]
    fn polarity_is_preserved_raw() {
        let node = parse_raw("-count").unwrap();
        assert!(matches!(node.kind, RawKind::PolarityExpression { .. }));
    }

    #[test]
    fn deep_nesting_is_capped() {
        let mut source = String::new();
        for _ in 0..300 {
            source.push('(');
        }
        source.push('1');
        for _ in 0..300 {
            source.push(')');
        }
        assert!(parse_raw(&source).is_err());
    }

    #[test]
    fn parse_is_deterministic() {
        let a = parse_raw("Patient.name.where(use = 'official').family").unwrap();
        let b = parse_raw("Patient.name.where(use = 'official').family").unwrap();
        assert_eq!(a, b);
    }
}
