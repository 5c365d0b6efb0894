//! AST node metadata
//!
//! Every typed AST node carries a metadata record. Construction is
//! two-phase by design: the cheap essentials (category, SQL data type,
//! collection/nullable flags) are filled in by the builder, while the
//! expensive analysis (optimization hints, CTE generation context) is
//! computed lazily on first request, so expressions that are parsed but
//! never translated don't pay for analysis they won't use.

use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Semantic category of a typed AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    Literal,
    PathExpression,
    FunctionCall,
    Operator,
    Conditional,
    Aggregation,
    TypeOperation,
}

impl NodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCategory::Literal => "literal",
            NodeCategory::PathExpression => "path_expression",
            NodeCategory::FunctionCall => "function_call",
            NodeCategory::Operator => "operator",
            NodeCategory::Conditional => "conditional",
            NodeCategory::Aggregation => "aggregation",
            NodeCategory::TypeOperation => "type_operation",
        }
    }
}

/// SQL-side data type inferred for a node's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDataType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Json,
    Array,
    #[default]
    Unknown,
}

/// Hints consumed by the translator's CTE and projection planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptimizationHint {
    ProjectionSafe,
    AggregationCandidate,
    PopulationFilter,
    IndexFriendly,
    CteReusable,
    Vectorizable,
}

/// Flags describing how a node's SQL wants to be placed in the CTE chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CteContext {
    pub requires_join: bool,
    pub can_be_subquery: bool,
    pub requires_window_function: bool,
    pub dependent_tables: Vec<String>,
}

/// Lazily computed slice of the metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedMetadata {
    pub hints: Vec<OptimizationHint>,
    pub cte: CteContext,
}

impl DerivedMetadata {
    pub fn has_hint(&self, hint: OptimizationHint) -> bool {
        self.hints.contains(&hint)
    }
}

/// Metadata attached to every typed AST node.
#[derive(Debug, Default)]
pub struct Metadata {
    pub category: Option<NodeCategory>,
    /// FHIR-flavoured type name when inferable (`string`, `HumanName`).
    pub fhir_type: Option<String>,
    pub sql_type: SqlDataType,
    pub is_collection: bool,
    pub nullable: bool,
    /// Free-form stash; used e.g. to keep the original source of a
    /// partial datetime literal for later recovery.
    pub attributes: BTreeMap<String, String>,
    derived: OnceLock<DerivedMetadata>,
}

impl Metadata {
    pub fn with_category(category: NodeCategory) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }

    /// Derived metadata for this node; `compute` runs at most once.
    pub fn derived_with(&self, compute: impl FnOnce() -> DerivedMetadata) -> &DerivedMetadata {
        self.derived.get_or_init(compute)
    }

    /// Whether the expensive analysis has already run.
    pub fn derived_ready(&self) -> bool {
        self.derived.get().is_some()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }
}

impl Clone for Metadata {
    fn clone(&self) -> Self {
        let derived = OnceLock::new();
        if let Some(d) = self.derived.get() {
            let _ = derived.set(d.clone());
        }
        Self {
            category: self.category,
            fhir_type: self.fhir_type.clone(),
            sql_type: self.sql_type,
            is_collection: self.is_collection,
            nullable: self.nullable,
            attributes: self.attributes.clone(),
            derived,
        }
    }
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        // Derived metadata is a pure function of the node; two nodes with
        // equal essentials are equal regardless of which has been analysed.
        self.category == other.category
            && self.fhir_type == other.fhir_type
            && self.sql_type == other.sql_type
            && self.is_collection == other.is_collection
            && self.nullable == other.nullable
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_is_computed_once() {
        let meta = Metadata::with_category(NodeCategory::Literal);
        let mut calls = 0;
        for _ in 0..3 {
            meta.derived_with(|| {
                calls += 1;
                DerivedMetadata::default()
            });
        }
        assert_eq!(calls, 1);
        assert!(meta.derived_ready());
    }

    #[test]
    fn equality_ignores_derived_state() {
        let a = Metadata::with_category(NodeCategory::Operator);
        let b = Metadata::with_category(NodeCategory::Operator);
        a.derived_with(DerivedMetadata::default);
        assert_eq!(a, b);
    }
}
