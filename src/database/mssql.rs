//! SQL Server introspector using `tiberius` and a `bb8` pool.

use crate::config::{DatabaseConfig, DatabaseType};
use crate::database::result::{
    CellValue, ColumnDescriptor, ForeignKeyDescriptor, RowSet, TableName,
};
use crate::database::traits::CatalogIntrospector;
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use bb8::{Pool, PooledConnection, RunError};
use bb8_tiberius::ConnectionManager;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::TryStreamExt;
use tiberius::{AuthMethod, ColumnData, Config, EncryptionLevel, FromSql, QueryItem, Row as TiberiusRow};
use tracing::{debug, info, instrument, warn};

const LIST_TABLES: &str = r#"
    SELECT TABLE_SCHEMA, TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_TYPE = 'BASE TABLE'
      AND TABLE_SCHEMA NOT IN ('sys', 'INFORMATION_SCHEMA')
    ORDER BY TABLE_SCHEMA, TABLE_NAME
"#;

const LIST_COLUMNS: &str = r#"
    SELECT
        COLUMN_NAME,
        DATA_TYPE,
        CHARACTER_MAXIMUM_LENGTH,
        IS_NULLABLE,
        COLUMN_DEFAULT
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
    ORDER BY ORDINAL_POSITION
"#;

const PRIMARY_KEYS: &str = r#"
    SELECT kcu.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
      ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
     AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
      AND tc.TABLE_SCHEMA = @P1
      AND tc.TABLE_NAME = @P2
    ORDER BY kcu.ORDINAL_POSITION
"#;

const FOREIGN_KEYS: &str = r#"
    SELECT
        COL_NAME(fkc.parent_object_id, fkc.parent_column_id) AS column_name,
        OBJECT_SCHEMA_NAME(fkc.referenced_object_id) AS foreign_schema,
        OBJECT_NAME(fkc.referenced_object_id) AS foreign_table,
        COL_NAME(fkc.referenced_object_id, fkc.referenced_column_id) AS foreign_column
    FROM sys.foreign_key_columns fkc
    JOIN sys.foreign_keys fk ON fk.object_id = fkc.constraint_object_id
    WHERE fkc.parent_object_id = OBJECT_ID(@P1)
    ORDER BY fk.name, fkc.constraint_column_id
"#;

const ROW_ESTIMATE: &str = r#"
    SELECT SUM(p.rows)
    FROM sys.partitions p
    WHERE p.object_id = OBJECT_ID(@P1)
      AND p.index_id IN (0, 1)
"#;

/// Ad hoc statements run inside a transaction that is always rolled back.
const BEGIN_READ: &str = "BEGIN TRANSACTION";
const END_READ: &str = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Row,
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep,
    Skip,
    Stop,
}

/// Rows of a later result set never join the first one's columns.
fn first_result_set(item: Item, result_index: usize) -> Step {
    match (item, result_index) {
        (_, index) if index > 0 => Step::Stop,
        (Item::Row, _) => Step::Keep,
        (Item::Metadata, _) => Step::Skip,
    }
}

/// SQL Server catalog introspector over a single pooled connection.
pub struct MssqlIntrospector {
    pool: Pool<ConnectionManager>,
}

impl MssqlIntrospector {
    /// Open the connection and verify it with a trivial query.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!(
            "Connecting to MSSQL: {}:{}/{}",
            config.host, config.port, config.database
        );

        let mut tiberius_config = Config::new();
        tiberius_config.host(&config.host);
        tiberius_config.port(config.port);
        tiberius_config.database(&config.database);
        tiberius_config.application_name(env!("CARGO_PKG_NAME"));
        tiberius_config.authentication(AuthMethod::sql_server(&config.username, &config.password));
        if config.trust_cert {
            tiberius_config.trust_cert();
        }
        tiberius_config.encryption(EncryptionLevel::On);

        let manager = ConnectionManager::new(tiberius_config);
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let wait = config.connection_timeout.as_secs();
        {
            let mut conn = pool.get().await.map_err(|e| match e {
                RunError::TimedOut => DatabaseError::ConnectTimeout(wait),
                RunError::User(e) => DatabaseError::ConnectionFailed(e.to_string()),
            })?;
            conn.simple_query("SELECT 1")
                .await
                .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?
                .into_results()
                .await
                .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        }

        info!("MSSQL connection established");
        Ok(Self { pool })
    }

    async fn connection(&self) -> DbResult<PooledConnection<'_, ConnectionManager>> {
        self.pool.get().await.map_err(|e| match e {
            RunError::TimedOut => DatabaseError::ConnectionFailed("connection checkout timed out".into()),
            RunError::User(e) => DatabaseError::ConnectionFailed(e.to_string()),
        })
    }

    async fn catalog_rows(&self, sql: &str, table: &TableName) -> DbResult<Vec<TiberiusRow>> {
        let mut conn = self.connection().await?;
        conn.query(sql, &[&table.schema, &table.name])
            .await
            .map_err(catalog_failed)?
            .into_first_result()
            .await
            .map_err(catalog_failed)
    }

    async fn object_rows(&self, sql: &str, table: &TableName) -> DbResult<Vec<TiberiusRow>> {
        let object = DatabaseType::Mssql.qualified_name(table);
        let mut conn = self.connection().await?;
        conn.query(sql, &[&object])
            .await
            .map_err(catalog_failed)?
            .into_first_result()
            .await
            .map_err(catalog_failed)
    }
}

fn query_failed(error: tiberius::error::Error) -> DatabaseError {
    DatabaseError::QueryFailed(error.to_string())
}

fn catalog_failed(error: tiberius::error::Error) -> DatabaseError {
    DatabaseError::CatalogFailed(error.to_string())
}

fn text(row: &TiberiusRow, index: usize) -> DbResult<Option<String>> {
    row.try_get::<&str, _>(index)
        .map(|v| v.map(str::to_string))
        .map_err(catalog_failed)
}

fn required_text(row: &TiberiusRow, index: usize) -> DbResult<String> {
    text(row, index)?.ok_or_else(|| {
        DatabaseError::CatalogFailed(format!("unexpected NULL in catalog column {}", index))
    })
}

/// Convert one cell into the tagged value model.
fn cell_value(data: ColumnData<'static>) -> CellValue {
    match data {
        ColumnData::U8(v) => v.into(),
        ColumnData::I16(v) => v.into(),
        ColumnData::I32(v) => v.into(),
        ColumnData::I64(v) => v.into(),
        ColumnData::F32(v) => v.into(),
        ColumnData::F64(v) => v.into(),
        ColumnData::Bit(v) => v.into(),
        ColumnData::String(v) => v.map(|s| CellValue::String(s.into_owned())).into(),
        ColumnData::Guid(v) => v.map(CellValue::encoded).into(),
        ColumnData::Binary(v) => v.map(|b| CellValue::hex(&b)).into(),
        ColumnData::Xml(v) => v
            .map(|x| CellValue::Encoded(x.into_owned().into_string()))
            .into(),
        ColumnData::Numeric(v) => v.map(CellValue::encoded).into(),
        other => temporal(&other).unwrap_or_else(|| CellValue::Encoded(format!("{:?}", other))),
    }
}

fn temporal(data: &ColumnData<'static>) -> Option<CellValue> {
    if let Ok(v) = chrono::DateTime::<FixedOffset>::from_sql(data) {
        return Some(v.map(|d| CellValue::Encoded(d.to_rfc3339())).into());
    }
    if let Ok(v) = NaiveDateTime::from_sql(data) {
        return Some(v.into());
    }
    if let Ok(v) = NaiveDate::from_sql(data) {
        return Some(v.into());
    }
    if let Ok(v) = NaiveTime::from_sql(data) {
        return Some(v.into());
    }
    None
}

#[async_trait]
impl CatalogIntrospector for MssqlIntrospector {
    fn engine(&self) -> DatabaseType {
        DatabaseType::Mssql
    }

    #[instrument(skip(self), fields(db = "mssql"))]
    async fn list_base_tables(&self) -> DbResult<Vec<TableName>> {
        let mut conn = self.connection().await?;
        let rows = conn
            .simple_query(LIST_TABLES)
            .await
            .map_err(catalog_failed)?
            .into_first_result()
            .await
            .map_err(catalog_failed)?;

        rows.iter()
            .map(|row| Ok(TableName::new(required_text(row, 0)?, required_text(row, 1)?)))
            .collect()
    }

    #[instrument(skip(self), fields(db = "mssql", table = %table))]
    async fn columns(&self, table: &TableName) -> DbResult<Vec<ColumnDescriptor>> {
        let rows = self.catalog_rows(LIST_COLUMNS, table).await?;

        rows.iter()
            .map(|row| {
                Ok(ColumnDescriptor {
                    name: required_text(row, 0)?,
                    data_type: required_text(row, 1)?,
                    max_length: row.try_get::<i32, _>(2).map_err(catalog_failed)?,
                    nullable: text(row, 3)?.as_deref() == Some("YES"),
                    default: text(row, 4)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(db = "mssql", table = %table))]
    async fn primary_keys(&self, table: &TableName) -> DbResult<Vec<String>> {
        let rows = self.catalog_rows(PRIMARY_KEYS, table).await?;
        rows.iter().map(|row| required_text(row, 0)).collect()
    }

    #[instrument(skip(self), fields(db = "mssql", table = %table))]
    async fn foreign_keys(&self, table: &TableName) -> DbResult<Vec<ForeignKeyDescriptor>> {
        let rows = self.object_rows(FOREIGN_KEYS, table).await?;

        rows.iter()
            .map(|row| {
                Ok(ForeignKeyDescriptor {
                    column: required_text(row, 0)?,
                    references_schema: required_text(row, 1)?,
                    references_table: required_text(row, 2)?,
                    references_column: required_text(row, 3)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(db = "mssql", table = %table))]
    async fn approximate_row_count(&self, table: &TableName) -> DbResult<Option<i64>> {
        let rows = self.object_rows(ROW_ESTIMATE, table).await?;
        match rows.first() {
            Some(row) => row.try_get::<i64, _>(0).map_err(catalog_failed),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, sql), fields(db = "mssql"))]
    async fn fetch(&self, sql: &str, max_rows: usize) -> DbResult<RowSet> {
        let mut conn = self.connection().await?;
        debug!("Executing query: {}", sql);

        conn.simple_query(BEGIN_READ)
            .await
            .map_err(query_failed)?
            .into_results()
            .await
            .map_err(query_failed)?;

        let fetched = async {
            let mut stream = conn.query(sql, &[]).await.map_err(query_failed)?;
            let columns = stream
                .columns()
                .await
                .map_err(query_failed)?
                .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();
            let mut rows = RowSet::new(columns);

            // Only the first result set is read; the rest is drained by the next request.
            while rows.rows.len() < max_rows {
                let item = stream.try_next().await.map_err(query_failed)?;
                let step = match &item {
                    Some(QueryItem::Row(row)) => first_result_set(Item::Row, row.result_index()),
                    Some(QueryItem::Metadata(meta)) => first_result_set(Item::Metadata, meta.result_index()),
                    None => Step::Stop,
                };
                match (step, item) {
                    (Step::Keep, Some(QueryItem::Row(row))) => {
                        rows.push_values(row.into_iter().map(cell_value).collect());
                    }
                    (Step::Stop, _) => break,
                    _ => {}
                }
            }
            Ok::<_, DatabaseError>(rows)
        }
        .await;

        let rolled_back = async {
            conn.simple_query(END_READ).await?.into_results().await?;
            Ok::<_, tiberius::error::Error>(())
        }
        .await;

        match (fetched, rolled_back) {
            (Ok(rows), Ok(())) => {
                debug!("Fetched {} rows", rows.rows.len());
                Ok(rows)
            }
            (Ok(_), Err(e)) => Err(query_failed(e)),
            (Err(e), rolled_back) => {
                if let Err(rollback) = rolled_back {
                    warn!("Rollback after failed query also failed: {}", rollback);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use std::borrow::Cow;
    use tiberius::IntoSql;
    use tiberius::numeric::Numeric;

    #[test]
    fn test_native_values() {
        assert_eq!(cell_value(ColumnData::I32(Some(42))), CellValue::Int(42));
        assert_eq!(cell_value(ColumnData::U8(Some(7))), CellValue::Int(7));
        assert_eq!(cell_value(ColumnData::I64(Some(-3))), CellValue::Int(-3));
        assert_eq!(cell_value(ColumnData::F64(Some(1.5))), CellValue::Float(1.5));
        assert_eq!(cell_value(ColumnData::Bit(Some(true))), CellValue::Bool(true));
        assert_eq!(
            cell_value(ColumnData::String(Some(Cow::Borrowed("Lisbon")))),
            CellValue::String("Lisbon".into())
        );
    }

    #[test]
    fn test_non_finite_floats_are_encoded() {
        assert_eq!(cell_value(ColumnData::F64(Some(f64::NAN))), CellValue::Encoded("NaN".into()));
        assert_eq!(
            cell_value(ColumnData::F32(Some(f32::INFINITY))),
            CellValue::Encoded("inf".into())
        );
    }

    #[test]
    fn test_only_first_result_set_is_kept() {
        assert_eq!(first_result_set(Item::Metadata, 0), Step::Skip);
        assert_eq!(first_result_set(Item::Row, 0), Step::Keep);
        assert_eq!(first_result_set(Item::Metadata, 1), Step::Stop);
        assert_eq!(first_result_set(Item::Row, 1), Step::Stop);
        assert_eq!(first_result_set(Item::Row, 3), Step::Stop);
    }

    #[test]
    fn test_nulls() {
        assert!(cell_value(ColumnData::I32(None)).is_null());
        assert!(cell_value(ColumnData::String(None)).is_null());
        assert!(cell_value(ColumnData::Numeric(None)).is_null());
        assert!(cell_value(ColumnData::Binary(None)).is_null());
        assert!(cell_value(ColumnData::Guid(None)).is_null());
        assert!(cell_value(ColumnData::DateTime2(None)).is_null());
    }

    #[test]
    fn test_numeric_binary_and_guid_are_encoded() {
        assert_eq!(
            cell_value(ColumnData::Numeric(Some(Numeric::new_with_scale(12345, 2)))),
            CellValue::Encoded("123.45".into())
        );
        assert_eq!(
            cell_value(ColumnData::Binary(Some(Cow::Owned(vec![0xDE, 0xAD, 0x01])))),
            CellValue::Encoded("0xDEAD01".into())
        );

        let guid = uuid::Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            cell_value(ColumnData::Guid(Some(guid))),
            CellValue::Encoded("67e55044-10b1-426f-9247-bb680e5fe0c8".into())
        );
    }

    #[test]
    fn test_temporal_values_are_iso_text() {
        let listed = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap();
        let value = cell_value(listed.into_sql());
        assert_eq!(value, CellValue::from(listed));
        assert_eq!(value.as_str(), Some("2024-03-01T12:30:05"));

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let closed: DateTime<FixedOffset> = offset.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(
            cell_value(closed.into_sql()),
            CellValue::Encoded("2024-03-01T09:00:00+02:00".into())
        );
    }
}
