//! SQL fragments
//!
//! The visitor produces fragments bottom-up. A fragment is an inline SQL
//! expression plus its result shape and the CTE ids it depends on. Most
//! fragments inline into their parent; subtrees that repeat (or anchor an
//! aggregation feeding multiple consumers) are materialised as CTE entries
//! and referenced through their stable id.

/// Scalar result types, as far as they are statically known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Integer,
    Decimal,
    Boolean,
    Text,
    Date,
    Timestamp,
    Time,
    Unknown,
}

/// Declared result semantics of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// A plain SQL scalar.
    Scalar(ScalarType),
    /// A single JSON node (object, scalar, or array of unknown kind).
    JsonValue,
    /// A normalised JSON array (collection).
    JsonArray,
    /// A boolean predicate expression.
    BooleanPredicate,
}

impl ResultShape {
    pub fn is_collection(&self) -> bool {
        matches!(self, ResultShape::JsonArray)
    }
}

/// One emitted SQL unit.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub sql: String,
    pub shape: ResultShape,
    /// CTE ids this fragment's SQL references (always earlier ids).
    pub deps: Vec<usize>,
    /// Set after `extension(url)`: the next `.value` navigation extracts
    /// `value[x]` payloads instead of a literal `value` member.
    pub extension_values_pending: bool,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, shape: ResultShape) -> Self {
        Self {
            sql: sql.into(),
            shape,
            deps: Vec::new(),
            extension_values_pending: false,
        }
    }

    pub fn scalar(sql: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(sql, ResultShape::Scalar(scalar))
    }

    pub fn json(sql: impl Into<String>) -> Self {
        Self::new(sql, ResultShape::JsonValue)
    }

    pub fn array(sql: impl Into<String>) -> Self {
        Self::new(sql, ResultShape::JsonArray)
    }

    pub fn predicate(sql: impl Into<String>) -> Self {
        Self::new(sql, ResultShape::BooleanPredicate)
    }

    pub fn with_deps(mut self, deps: Vec<usize>) -> Self {
        self.deps = deps;
        self
    }

    /// Merge dependency lists from child fragments (order-preserving,
    /// de-duplicated).
    pub fn merge_deps(&mut self, other: &Fragment) {
        for dep in &other.deps {
            if !self.deps.contains(dep) {
                self.deps.push(*dep);
            }
        }
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self.shape {
            ResultShape::Scalar(t) => Some(t),
            ResultShape::BooleanPredicate => Some(ScalarType::Boolean),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deps_merge_without_duplicates() {
        let mut a = Fragment::json("x").with_deps(vec![0, 2]);
        let b = Fragment::json("y").with_deps(vec![2, 3]);
        a.merge_deps(&b);
        assert_eq!(a.deps, vec![0, 2, 3]);
    }

    #[test]
    fn shapes() {
        assert!(Fragment::array("[]").shape.is_collection());
        assert_eq!(
            Fragment::predicate("1=1").scalar_type(),
            Some(ScalarType::Boolean)
        );
        assert_eq!(Fragment::json("x").scalar_type(), None);
    }
}
