//! Immutable schema snapshot produced by one discovery pass.

use crate::database::result::{ColumnDescriptor, ForeignKeyDescriptor, TableName};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sub-lookups that may degrade for a single table without failing discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogLookup {
    Columns,
    PrimaryKeys,
    ForeignKeys,
    RowCount,
}

/// Everything discovery learned about one base table.
#[derive(Debug, Clone, Serialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    /// `schema.name`, unquoted.
    pub full_name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// Engine estimate, 0 when unavailable.
    pub approx_rows: i64,
    /// False when `approx_rows` is a placeholder rather than an estimate.
    pub approx_rows_available: bool,
    /// Lookups that failed and left their field empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded_lookups: Vec<CatalogLookup>,
}

impl TableDescriptor {
    pub fn new(table: TableName) -> Self {
        Self {
            full_name: table.to_string(),
            schema: table.schema,
            name: table.name,
            columns: Vec::new(),
            primary_keys: Vec::new(),
            foreign_keys: Vec::new(),
            approx_rows: 0,
            approx_rows_available: false,
            degraded_lookups: Vec::new(),
        }
    }

    pub fn table_name(&self) -> TableName {
        TableName::new(&self.schema, &self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Tables of one database at one point in time, ordered by (schema, name).
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableDescriptor>,
    pub discovered_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// Build a snapshot, sorting tables by (schema, name).
    pub fn new(mut tables: Vec<TableDescriptor>, discovered_at: DateTime<Utc>) -> Self {
        tables.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
        Self {
            tables,
            discovered_at,
        }
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Look up a table, preferring an exact match over a unique
    /// case-insensitive one.
    pub fn find(&self, table: &TableName) -> Option<&TableDescriptor> {
        if let Some(exact) = self
            .tables
            .iter()
            .find(|t| t.schema == table.schema && t.name == table.name)
        {
            return Some(exact);
        }

        let mut matches = self.tables.iter().filter(|t| {
            t.schema.eq_ignore_ascii_case(&table.schema) && t.name.eq_ignore_ascii_case(&table.name)
        });
        match (matches.next(), matches.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }
}
