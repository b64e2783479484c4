//! Join suggestions derived from discovered foreign keys.

use crate::discovery::snapshot::SchemaSnapshot;
use serde::Serialize;

/// One foreign-key edge, flattened for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub join_suggestion: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipReport {
    pub total_relationships: usize,
    pub relationships: Vec<Relationship>,
}

/// Flatten every foreign key in table order, then declaration order.
///
/// Dangling targets are reported as-is; nothing is deduplicated.
pub fn analyze(snapshot: &SchemaSnapshot) -> RelationshipReport {
    let relationships: Vec<Relationship> = snapshot
        .tables
        .iter()
        .flat_map(|table| {
            table.foreign_keys.iter().map(move |fk| {
                let to_table = fk.target().to_string();
                Relationship {
                    join_suggestion: format!(
                        "JOIN {to} ON {from}.{from_col} = {to}.{to_col}",
                        to = to_table,
                        from = table.full_name,
                        from_col = fk.column,
                        to_col = fk.references_column,
                    ),
                    from_table: table.full_name.clone(),
                    from_column: fk.column.clone(),
                    to_table,
                    to_column: fk.references_column.clone(),
                }
            })
        })
        .collect();

    RelationshipReport {
        total_relationships: relationships.len(),
        relationships,
    }
}
