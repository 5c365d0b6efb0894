//! FHIRPath front-end: lexer, parser, typed AST
//!
//! Pipeline:
//!
//! ```text
//! Expression String
//!      |
//! Comment validation  (comments)
//!      |
//! Lexer -> Tokens     (lexer, token)
//!      |
//! Parser -> raw tree  (parser, parse_tree)
//!      |
//! Builder -> typed AST with categories and metadata (builder, ast)
//! ```
//!
//! The typed AST is what the SQL translator consumes. Parsing is pure and
//! deterministic; a bounded LRU cache with TTL fronts the whole pipeline.

pub mod analysis;
pub mod ast;
pub mod builder;
pub mod cache;
pub mod comments;
pub mod error;
pub mod lexer;
pub mod metadata;
pub mod parse_tree;
pub mod parser;
pub mod temporal;
pub mod token;
pub mod validate;

use std::sync::Arc;
use tracing::debug;

pub use ast::{
    AggregateFunction, CalendarUnit, ConditionalKind, ExprKind, ExprNode, LiteralValue, Operator,
    OperatorArity, QuantityValue, TypeOperationKind, VariableKind,
};
pub use cache::{CacheStatistics, ParseCache, ParseOptions};
pub use error::{Error, ParseError, ParseErrorCategory, Result};
pub use metadata::{Metadata, NodeCategory, OptimizationHint, SqlDataType};
pub use temporal::{TemporalInfo, TemporalKind, TemporalPrecision};
pub use token::Span;

/// Parse an expression straight through the pipeline, no caching.
pub fn parse(expression: &str) -> Result<ExprNode> {
    let raw = parser::parse_raw(expression)?;
    builder::build(&raw)
}

/// A parsed expression with its source, exposing the structural queries
/// tooling wants without re-walking the tree by hand.
#[derive(Debug, Clone)]
pub struct ParsedExpression {
    source: String,
    ast: Arc<ExprNode>,
}

impl ParsedExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &ExprNode {
        &self.ast
    }

    pub fn shared_ast(&self) -> Arc<ExprNode> {
        Arc::clone(&self.ast)
    }

    /// Dotted member names in navigation order (`Patient.name.given` →
    /// `["Patient", "name", "given"]`).
    pub fn path_components(&self) -> Vec<String> {
        fn collect(node: &ExprNode, out: &mut Vec<String>) {
            match &node.kind {
                ExprKind::Identifier { name, .. } => out.push(name.clone()),
                ExprKind::Path { base, member, .. } => {
                    collect(base, out);
                    out.push(member.clone());
                }
                _ => {
                    for child in node.children() {
                        collect(child, out);
                    }
                }
            }
        }
        let mut components = Vec::new();
        collect(&self.ast, &mut components);
        components
    }

    /// All invoked function names, including aggregations and
    /// conditionals, in visit order.
    pub fn function_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.ast.walk(&mut |node, _| match &node.kind {
            ExprKind::Function { name, .. } => names.push(name.clone()),
            ExprKind::Aggregation { function, .. } => names.push(function.name().to_string()),
            ExprKind::Conditional { kind, .. } => names.push(kind.function_name().to_string()),
            ExprKind::TypeOperation { kind, .. } => names.push(kind.as_str().to_string()),
            _ => {}
        });
        names
    }

    pub fn complexity(&self) -> analysis::ComplexityReport {
        analysis::analyze(&self.ast)
    }

    pub fn optimization_opportunities(&self) -> Vec<analysis::OptimizationOpportunity> {
        analysis::optimization_opportunities(&self.ast)
    }

    pub fn validate(&self) -> validate::ValidationReport {
        validate::validate(&self.ast)
    }
}

/// Caching parser front-end. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct FhirPathParser {
    cache: Arc<ParseCache>,
    options: ParseOptions,
}

impl FhirPathParser {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(ParseCache::default()),
            options: ParseOptions::default(),
        }
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self {
            cache: Arc::new(ParseCache::default()),
            options,
        }
    }

    pub fn with_cache(cache: Arc<ParseCache>, options: ParseOptions) -> Self {
        Self { cache, options }
    }

    /// Parse through the cache. Cache hits return the shared AST.
    pub fn parse(&self, expression: &str) -> Result<ParsedExpression> {
        if let Some(ast) = self.cache.get(expression, self.options) {
            return Ok(ParsedExpression {
                source: expression.to_string(),
                ast,
            });
        }

        debug!(expression, "parsing expression");
        let node = parse(expression)?;
        if self.options.validate {
            let report = validate::validate(&node);
            if !report.is_valid() {
                let first = report.errors().next().expect("invalid report has errors");
                return Err(Error::Build(format!(
                    "structural validation failed at {}: {}",
                    first.location, first.message
                )));
            }
        }

        let ast = Arc::new(node);
        self.cache.put(expression, self.options, Arc::clone(&ast));
        Ok(ParsedExpression {
            source: expression.to_string(),
            ast,
        })
    }

    pub fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }
}

impl Default for FhirPathParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_extracts_components() {
        let parser = FhirPathParser::new();
        let expr = parser
            .parse("Patient.name.where(use = 'official').family")
            .unwrap();
        assert_eq!(
            expr.path_components(),
            vec!["Patient", "name", "use", "family"]
        );
        assert_eq!(expr.function_names(), vec!["where"]);
    }

    #[test]
    fn cache_is_shared_across_calls() {
        let parser = FhirPathParser::new();
        parser.parse("1 + 1").unwrap();
        parser.parse("1 + 1").unwrap();
        let stats = parser.cache_statistics();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn cached_ast_is_shared() {
        let parser = FhirPathParser::new();
        let a = parser.parse("name.count()").unwrap();
        let b = parser.parse("name.count()").unwrap();
        assert!(Arc::ptr_eq(&a.shared_ast(), &b.shared_ast()));
    }

    #[test]
    fn reparsing_yields_identical_ast() {
        let first = parse("Patient.name.given.first()").unwrap();
        let second = parse("Patient.name.given.first()").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn comment_transparency() {
        let plain = parse("1 + 2").unwrap();
        let commented = parse("1 /* one */ + /* two */ 2").unwrap();
        // Spans differ but structure and values must not.
        assert_eq!(
            format!("{:?}", plain.kind).replace(char::is_numeric, ""),
            format!("{:?}", commented.kind).replace(char::is_numeric, "")
        );
    }

    #[test]
    fn empty_expression_error_category() {
        let err = parse("").unwrap_err();
        assert_eq!(err.category(), ParseErrorCategory::EmptyExpression);
    }
}
