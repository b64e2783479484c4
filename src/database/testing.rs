//! In-memory catalog used by unit tests.

use crate::config::DatabaseType;
use crate::database::result::{
    CellValue, ColumnDescriptor, ForeignKeyDescriptor, RowSet, TableName,
};
use crate::database::traits::CatalogIntrospector;
use crate::discovery::CatalogLookup;
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use parking_lot::Mutex;

pub(crate) struct FakeTable {
    name: TableName,
    columns: Vec<ColumnDescriptor>,
    primary_keys: Vec<String>,
    foreign_keys: Vec<ForeignKeyDescriptor>,
    row_count: Option<i64>,
    failing: Vec<CatalogLookup>,
}

impl FakeTable {
    pub(crate) fn new(schema: &str, name: &str) -> Self {
        Self {
            name: TableName::new(schema, name),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            foreign_keys: Vec::new(),
            row_count: None,
            failing: Vec::new(),
        }
    }

    pub(crate) fn column(mut self, name: &str, data_type: &str) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
            nullable: true,
            default: None,
        });
        self
    }

    pub(crate) fn primary_key(mut self, column: &str) -> Self {
        self.primary_keys.push(column.into());
        self
    }

    pub(crate) fn foreign_key(mut self, column: &str, schema: &str, table: &str, target: &str) -> Self {
        self.foreign_keys.push(ForeignKeyDescriptor {
            column: column.into(),
            references_schema: schema.into(),
            references_table: table.into(),
            references_column: target.into(),
        });
        self
    }

    pub(crate) fn rows(mut self, count: i64) -> Self {
        self.row_count = Some(count);
        self
    }

    pub(crate) fn failing(mut self, lookup: CatalogLookup) -> Self {
        self.failing.push(lookup);
        self
    }

    fn check(&self, lookup: CatalogLookup) -> DbResult<()> {
        if self.failing.contains(&lookup) {
            return Err(DatabaseError::CatalogFailed(format!("{:?} lookup failed for {}", lookup, self.name)));
        }
        Ok(())
    }
}

/// Catalog with canned tables and a canned result for every statement.
pub(crate) struct FakeCatalog {
    engine: DatabaseType,
    tables: Vec<FakeTable>,
    fail_enumeration: bool,
    result_columns: Vec<String>,
    available_rows: usize,
    fetch_error: Option<String>,
    statements: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub(crate) fn new(engine: DatabaseType) -> Self {
        Self {
            engine,
            tables: Vec::new(),
            fail_enumeration: false,
            result_columns: vec!["id".into(), "city".into()],
            available_rows: 0,
            fetch_error: None,
            statements: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn table(mut self, table: FakeTable) -> Self {
        self.tables.push(table);
        self
    }

    pub(crate) fn fail_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    /// Every fetch returns up to `rows` rows with these columns.
    pub(crate) fn result(mut self, columns: &[&str], rows: usize) -> Self {
        self.result_columns = columns.iter().map(|c| c.to_string()).collect();
        self.available_rows = rows;
        self
    }

    pub(crate) fn fetch_error(mut self, message: &str) -> Self {
        self.fetch_error = Some(message.into());
        self
    }

    /// Statements received by `fetch`, in order.
    pub(crate) fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    fn find(&self, table: &TableName) -> DbResult<&FakeTable> {
        self.tables
            .iter()
            .find(|t| &t.name == table)
            .ok_or_else(|| DatabaseError::CatalogFailed(format!("no such table {}", table)))
    }
}

#[async_trait]
impl CatalogIntrospector for FakeCatalog {
    fn engine(&self) -> DatabaseType {
        self.engine
    }

    async fn list_base_tables(&self) -> DbResult<Vec<TableName>> {
        if self.fail_enumeration {
            return Err(DatabaseError::CatalogFailed("permission denied for information_schema".into()));
        }
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn columns(&self, table: &TableName) -> DbResult<Vec<ColumnDescriptor>> {
        let table = self.find(table)?;
        table.check(CatalogLookup::Columns)?;
        Ok(table.columns.clone())
    }

    async fn primary_keys(&self, table: &TableName) -> DbResult<Vec<String>> {
        let table = self.find(table)?;
        table.check(CatalogLookup::PrimaryKeys)?;
        Ok(table.primary_keys.clone())
    }

    async fn foreign_keys(&self, table: &TableName) -> DbResult<Vec<ForeignKeyDescriptor>> {
        let table = self.find(table)?;
        table.check(CatalogLookup::ForeignKeys)?;
        Ok(table.foreign_keys.clone())
    }

    async fn approximate_row_count(&self, table: &TableName) -> DbResult<Option<i64>> {
        let table = self.find(table)?;
        table.check(CatalogLookup::RowCount)?;
        Ok(table.row_count)
    }

    async fn fetch(&self, sql: &str, max_rows: usize) -> DbResult<RowSet> {
        self.statements.lock().push(sql.to_string());
        if let Some(message) = &self.fetch_error {
            return Err(DatabaseError::QueryFailed(message.clone()));
        }

        let mut rows = RowSet::new(self.result_columns.clone());
        for i in 0..self.available_rows.min(max_rows) {
            let values = self
                .result_columns
                .iter()
                .enumerate()
                .map(|(c, _)| match c {
                    0 => CellValue::Int(i as i64 + 1),
                    _ => CellValue::String(format!("value {}", i + 1)),
                })
                .collect();
            rows.push_values(values);
        }
        Ok(rows)
    }
}
