//! CTE plan assembly
//!
//! Fragments that materialise become `(id, sql)` entries; ids are assigned
//! monotonically in visit order, so every entry references only earlier
//! entries or the base `resource` table and the chain is acyclic by
//! construction (asserted here regardless). The final entry is the root
//! expression; the assembler projects its result column as text.

use crate::error::{Result, TranslationError};
use basalt_dialect::Dialect;

/// Name of the base table every chain reads from.
pub const RESOURCE_TABLE: &str = "resource";
/// JSON column holding one FHIR resource per row.
pub const RESOURCE_COLUMN: &str = "resource";
/// Row key column.
pub const ID_COLUMN: &str = "id";

/// One named intermediate result.
#[derive(Debug, Clone)]
pub struct CteEntry {
    pub id: usize,
    /// Body: a SELECT over the resource table producing (id, result).
    pub sql: String,
    /// Earlier entries the body references.
    pub deps: Vec<usize>,
}

impl CteEntry {
    pub fn name(&self) -> String {
        cte_name(self.id)
    }
}

pub fn cte_name(id: usize) -> String {
    format!("c_{}", id)
}

/// Ordered, acyclic list of CTE entries.
#[derive(Debug, Clone, Default)]
pub struct CtePlan {
    pub entries: Vec<CteEntry>,
}

impl CtePlan {
    pub fn push(&mut self, entry: CteEntry) {
        self.entries.push(entry);
    }

    /// Verify the back-reference invariant: every entry only references
    /// entries with a smaller id.
    fn check_acyclic(&self) -> Result<()> {
        for entry in &self.entries {
            if let Some(bad) = entry.deps.iter().find(|dep| **dep >= entry.id) {
                return Err(TranslationError::Unsupported {
                    message: format!(
                        "CTE {} references {} which is not an earlier entry",
                        cte_name(entry.id),
                        cte_name(*bad)
                    ),
                    source_text: String::new(),
                });
            }
        }
        Ok(())
    }

    /// Render the full query: `WITH c_0 AS (…), … SELECT … FROM c_N`.
    /// The last entry is the final result; its `result` column is
    /// projected as text so row decoding is uniform across engines.
    pub fn assemble(&self, dialect: &dyn Dialect) -> Result<String> {
        self.check_acyclic()?;
        let last = self.entries.last().ok_or_else(|| TranslationError::Unsupported {
            message: "empty CTE plan".to_string(),
            source_text: String::new(),
        })?;

        let with_clause = self
            .entries
            .iter()
            .map(|entry| format!("{} AS ({})", entry.name(), entry.sql))
            .collect::<Vec<_>>()
            .join(",\n     ");

        let final_name = last.name();
        let projection = dialect.cast_to_text(&format!("{}.result", final_name));
        Ok(format!(
            "WITH {}\nSELECT {} AS result FROM {}",
            with_clause, projection, final_name
        ))
    }
}

/// Body for a materialised sub-expression: one result row per resource
/// row, keyed by id so later references can correlate.
pub fn cte_body(expression_sql: &str) -> String {
    format!(
        "SELECT {table}.{id} AS {id}, {expr} AS result FROM {table}",
        table = RESOURCE_TABLE,
        id = ID_COLUMN,
        expr = expression_sql
    )
}

/// Correlated scalar reference to an earlier CTE's result.
pub fn cte_reference(id: usize) -> String {
    format!(
        "(SELECT {name}.result FROM {name} WHERE {name}.{id_col} = {table}.{id_col})",
        name = cte_name(id),
        id_col = ID_COLUMN,
        table = RESOURCE_TABLE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_monotonic() {
        assert_eq!(cte_name(0), "c_0");
        assert_eq!(cte_name(12), "c_12");
    }

    #[test]
    fn body_selects_from_resource() {
        let body = cte_body("1 + 1");
        assert_eq!(body, "SELECT resource.id AS id, 1 + 1 AS result FROM resource");
    }

    #[test]
    fn reference_correlates_on_id() {
        let sql = cte_reference(3);
        assert!(sql.contains("FROM c_3"));
        assert!(sql.contains("c_3.id = resource.id"));
    }

    #[test]
    fn forward_reference_is_rejected() {
        let mut plan = CtePlan::default();
        plan.push(CteEntry {
            id: 0,
            sql: cte_body("1"),
            deps: vec![1],
        });
        assert!(plan.check_acyclic().is_err());
    }
}
