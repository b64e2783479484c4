//! Catalog walk that builds a [`SchemaSnapshot`].

use crate::database::result::TableName;
use crate::database::traits::CatalogIntrospector;
use crate::discovery::snapshot::{CatalogLookup, SchemaSnapshot, TableDescriptor};
use crate::error::{DatabaseError, DbResult};
use chrono::Utc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Introspect every base table reachable through `introspector`.
///
/// Only the table enumeration is fatal. A failing per-table lookup leaves
/// that field empty, records it in `degraded_lookups` and discovery moves on.
#[instrument(skip(introspector), fields(engine = %introspector.engine()))]
pub async fn discover(introspector: &dyn CatalogIntrospector) -> DbResult<SchemaSnapshot> {
    let start = Instant::now();
    let engine = introspector.engine();

    let mut tables = introspector.list_base_tables().await?;
    tables.retain(|t| !engine.system_schemas().contains(&t.schema.as_str()));
    tables.sort();
    tables.dedup();

    let mut descriptors = Vec::with_capacity(tables.len());
    for table in tables {
        descriptors.push(describe_table(introspector, table).await);
    }

    let snapshot = SchemaSnapshot::new(descriptors, Utc::now());
    let degraded = snapshot
        .tables
        .iter()
        .filter(|t| !t.degraded_lookups.is_empty())
        .count();
    info!(
        tables = snapshot.table_count(),
        degraded,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Schema discovery complete"
    );
    Ok(snapshot)
}

async fn describe_table(introspector: &dyn CatalogIntrospector, table: TableName) -> TableDescriptor {
    let mut descriptor = TableDescriptor::new(table.clone());

    if let Some(columns) = lookup(&mut descriptor, CatalogLookup::Columns, introspector.columns(&table).await) {
        descriptor.columns = columns;
    }
    if let Some(keys) = lookup(
        &mut descriptor,
        CatalogLookup::PrimaryKeys,
        introspector.primary_keys(&table).await,
    ) {
        descriptor.primary_keys = keys;
    }
    if let Some(keys) = lookup(
        &mut descriptor,
        CatalogLookup::ForeignKeys,
        introspector.foreign_keys(&table).await,
    ) {
        descriptor.foreign_keys = keys;
    }
    if let Some(Some(rows)) = lookup(
        &mut descriptor,
        CatalogLookup::RowCount,
        introspector.approximate_row_count(&table).await,
    ) {
        descriptor.approx_rows = rows;
        descriptor.approx_rows_available = true;
    }

    descriptor
}

fn lookup<T>(
    descriptor: &mut TableDescriptor,
    kind: CatalogLookup,
    result: Result<T, DatabaseError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(table = %descriptor.full_name, lookup = ?kind, error = %e, "Catalog lookup degraded");
            descriptor.degraded_lookups.push(kind);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseType;
    use crate::database::testing::{FakeCatalog, FakeTable};

    #[tokio::test]
    async fn test_discovery_orders_tables_and_keeps_column_order() {
        let catalog = FakeCatalog::new(DatabaseType::Mssql)
            .table(FakeTable::new("sales", "Orders").column("id", "int").column("customer_id", "int"))
            .table(FakeTable::new("dbo", "Properties").column("id", "int").column("city", "nvarchar"))
            .table(FakeTable::new("dbo", "Agents").column("name", "nvarchar"));

        let snapshot = discover(&catalog).await.unwrap();

        let names: Vec<_> = snapshot.tables.iter().map(|t| t.full_name.as_str()).collect();
        assert_eq!(names, ["dbo.Agents", "dbo.Properties", "sales.Orders"]);
        let columns: Vec<_> = snapshot.tables[2].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(columns, ["id", "customer_id"]);
    }

    #[tokio::test]
    async fn test_row_count_failure_degrades_only_that_table() {
        let catalog = FakeCatalog::new(DatabaseType::Postgres)
            .table(FakeTable::new("public", "a").rows(12))
            .table(FakeTable::new("public", "b").rows(7).failing(CatalogLookup::RowCount));

        let snapshot = discover(&catalog).await.unwrap();

        let a = &snapshot.tables[0];
        assert_eq!(a.approx_rows, 12);
        assert!(a.approx_rows_available);

        let b = &snapshot.tables[1];
        assert_eq!(b.approx_rows, 0);
        assert!(!b.approx_rows_available);
        assert_eq!(b.degraded_lookups, [CatalogLookup::RowCount]);
    }

    #[tokio::test]
    async fn test_column_failure_keeps_descriptor() {
        let catalog = FakeCatalog::new(DatabaseType::Postgres).table(
            FakeTable::new("public", "broken")
                .column("id", "integer")
                .primary_key("id")
                .failing(CatalogLookup::Columns),
        );

        let snapshot = discover(&catalog).await.unwrap();
        let table = &snapshot.tables[0];
        assert!(table.columns.is_empty());
        assert_eq!(table.primary_keys, ["id"]);
        assert_eq!(table.degraded_lookups, [CatalogLookup::Columns]);
    }

    #[tokio::test]
    async fn test_unknown_statistics_are_not_zero_rows() {
        let catalog = FakeCatalog::new(DatabaseType::Postgres).table(FakeTable::new("public", "fresh"));
        let snapshot = discover(&catalog).await.unwrap();
        assert!(!snapshot.tables[0].approx_rows_available);
        assert!(snapshot.tables[0].degraded_lookups.is_empty());
    }

    #[tokio::test]
    async fn test_enumeration_failure_aborts() {
        let catalog = FakeCatalog::new(DatabaseType::Mssql)
            .table(FakeTable::new("dbo", "t"))
            .fail_enumeration();
        assert!(discover(&catalog).await.is_err());
    }

    #[tokio::test]
    async fn test_system_schemas_filtered() {
        let catalog = FakeCatalog::new(DatabaseType::Postgres)
            .table(FakeTable::new("pg_catalog", "pg_class"))
            .table(FakeTable::new("public", "users"));
        let snapshot = discover(&catalog).await.unwrap();
        assert_eq!(snapshot.table_count(), 1);
    }
}
