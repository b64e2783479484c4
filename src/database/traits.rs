//! Catalog introspection trait.

use crate::config::DatabaseType;
use crate::database::result::{ColumnDescriptor, ForeignKeyDescriptor, RowSet, TableName};
use crate::error::DbResult;
use async_trait::async_trait;

/// Engine-specific access to the catalog and to bounded reads.
///
/// Implementations: [`MssqlIntrospector`](crate::database::MssqlIntrospector),
/// [`PostgresIntrospector`](crate::database::PostgresIntrospector).
/// Each holds a single live connection; callers serialize their use.
#[async_trait]
pub trait CatalogIntrospector: Send + Sync {
    /// Engine this introspector talks to.
    fn engine(&self) -> DatabaseType;

    /// Base tables outside the engine's system schemas.
    ///
    /// Ordering is not guaranteed; discovery sorts the result.
    async fn list_base_tables(&self) -> DbResult<Vec<TableName>>;

    /// Columns of `table` in ordinal position order.
    async fn columns(&self, table: &TableName) -> DbResult<Vec<ColumnDescriptor>>;

    /// Primary-key column names in key order; empty when the table has none.
    async fn primary_keys(&self, table: &TableName) -> DbResult<Vec<String>>;

    /// Foreign-key edges in declaration order, composite keys paired column by column.
    async fn foreign_keys(&self, table: &TableName) -> DbResult<Vec<ForeignKeyDescriptor>>;

    /// Row count from engine statistics.
    ///
    /// `None` means the engine has no estimate yet.
    async fn approximate_row_count(&self, table: &TableName) -> DbResult<Option<i64>>;

    /// Run one statement and read at most `max_rows` rows.
    ///
    /// The statement must already have passed validation. Column names come
    /// from the driver's result-set metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::QueryFailed`](crate::error::DatabaseError::QueryFailed)
    /// carrying the driver's message.
    async fn fetch(&self, sql: &str, max_rows: usize) -> DbResult<RowSet>;
}
