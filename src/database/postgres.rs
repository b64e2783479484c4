//! PostgreSQL introspector using `tokio-postgres` and `deadpool`.

use crate::config::{DatabaseConfig, DatabaseType};
use crate::database::result::{
    CellValue, ColumnDescriptor, ForeignKeyDescriptor, RowSet, TableName,
};
use crate::database::traits::CatalogIntrospector;
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{Config as DeadpoolConfig, Object, Pool, PoolConfig, Runtime};
use futures_util::TryStreamExt;
use rust_decimal::Decimal;
use std::error::Error;
use std::net::IpAddr;
use std::pin::pin;
use tokio::time::timeout;
use tokio_postgres::NoTls;
use tokio_postgres::types::{FromSql, Kind, Type};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const LIST_TABLES: &str = r#"
    SELECT table_schema::text, table_name::text
    FROM information_schema.tables
    WHERE table_type = 'BASE TABLE'
      AND table_schema NOT IN ('pg_catalog', 'information_schema')
    ORDER BY table_schema, table_name
"#;

const LIST_COLUMNS: &str = r#"
    SELECT
        column_name::text,
        data_type::text,
        character_maximum_length::int4,
        is_nullable::text,
        column_default::text
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position
"#;

const PRIMARY_KEYS: &str = r#"
    SELECT a.attname::text
    FROM pg_index i
    JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
    WHERE i.indrelid = format('%I.%I', $1::text, $2::text)::regclass
      AND i.indisprimary
    ORDER BY array_position(i.indkey::int2[], a.attnum)
"#;

const FOREIGN_KEYS: &str = r#"
    SELECT
        src.attname::text AS column_name,
        tn.nspname::text AS foreign_schema,
        tc.relname::text AS foreign_table,
        tgt.attname::text AS foreign_column
    FROM pg_constraint c
    CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(src_attnum, tgt_attnum, ord)
    JOIN pg_attribute src ON src.attrelid = c.conrelid AND src.attnum = k.src_attnum
    JOIN pg_class tc ON tc.oid = c.confrelid
    JOIN pg_namespace tn ON tn.oid = tc.relnamespace
    JOIN pg_attribute tgt ON tgt.attrelid = c.confrelid AND tgt.attnum = k.tgt_attnum
    WHERE c.contype = 'f'
      AND c.conrelid = format('%I.%I', $1::text, $2::text)::regclass
    ORDER BY c.conname, k.ord
"#;

const ROW_ESTIMATE: &str = r#"
    SELECT reltuples::int8
    FROM pg_class
    WHERE oid = format('%I.%I', $1::text, $2::text)::regclass
"#;

/// PostgreSQL catalog introspector over a single pooled connection.
pub struct PostgresIntrospector {
    pool: Pool,
}

impl PostgresIntrospector {
    /// Open the connection and verify it answers within the connect timeout.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!(
            "Connecting to PostgreSQL: {}:{}/{}",
            config.host, config.port, config.database
        );

        let mut deadpool_config = DeadpoolConfig::new();
        deadpool_config.host = Some(config.host.clone());
        deadpool_config.port = Some(config.port);
        deadpool_config.dbname = Some(config.database.clone());
        deadpool_config.user = Some(config.username.clone());
        deadpool_config.password = Some(config.password.clone());
        deadpool_config.application_name = Some(env!("CARGO_PKG_NAME").into());
        deadpool_config.pool = Some(PoolConfig::new(1));

        let pool = deadpool_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let wait = config.connection_timeout;
        let conn = timeout(wait, pool.get())
            .await
            .map_err(|_| DatabaseError::ConnectTimeout(wait.as_secs()))?
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        drop(conn);

        info!("PostgreSQL connection established");
        Ok(Self { pool })
    }

    async fn client(&self) -> DbResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
    }

    async fn catalog_rows(
        &self,
        sql: &str,
        table: &TableName,
    ) -> DbResult<Vec<tokio_postgres::Row>> {
        let client = self.client().await?;
        client
            .query(sql, &[&table.schema, &table.name])
            .await
            .map_err(|e| DatabaseError::CatalogFailed(describe(&e)))
    }
}

/// Prefer the server's own message over the driver's wrapper text.
fn describe(error: &tokio_postgres::Error) -> String {
    error
        .as_db_error()
        .map(ToString::to_string)
        .unwrap_or_else(|| error.to_string())
}

fn query_failed(error: tokio_postgres::Error) -> DatabaseError {
    DatabaseError::QueryFailed(describe(&error))
}

fn catalog_failed(error: tokio_postgres::Error) -> DatabaseError {
    DatabaseError::CatalogFailed(describe(&error))
}

/// Convert one cell using the column's wire type.
fn cell_value(row: &tokio_postgres::Row, index: usize, ty: &Type) -> CellValue {
    match row.try_get::<_, Option<RawValue<'_>>>(index) {
        Ok(Some(raw)) => decode(ty, raw.0),
        Ok(None) => CellValue::Null,
        Err(e) => {
            debug!("Column {} of type {} not readable: {}", index, ty.name(), e);
            undecodable(ty)
        }
    }
}

/// Binary wire bytes of a non-null value of any type.
struct RawValue<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Self(raw))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn typed<'a, T>(ty: &Type, raw: &'a [u8]) -> Option<CellValue>
where
    T: FromSql<'a> + Into<CellValue>,
{
    T::from_sql(ty, raw).ok().map(Into::into)
}

fn decode(ty: &Type, raw: &[u8]) -> CellValue {
    let value = match *ty {
        Type::BOOL => typed::<bool>(ty, raw),
        Type::INT2 => typed::<i16>(ty, raw),
        Type::INT4 => typed::<i32>(ty, raw),
        Type::INT8 => typed::<i64>(ty, raw),
        Type::OID => u32::from_sql(ty, raw).ok().map(|v| CellValue::Int(v.into())),
        Type::FLOAT4 => typed::<f32>(ty, raw),
        Type::FLOAT8 => typed::<f64>(ty, raw),
        // NaN, infinities and values wider than Decimal fall through to the text rendering.
        Type::NUMERIC => {
            typed::<Decimal>(ty, raw).or_else(|| numeric_text(raw).map(CellValue::Encoded))
        }
        Type::TIMESTAMP => typed::<NaiveDateTime>(ty, raw),
        Type::TIMESTAMPTZ => typed::<DateTime<Utc>>(ty, raw),
        Type::DATE => typed::<NaiveDate>(ty, raw),
        Type::TIME => typed::<NaiveTime>(ty, raw),
        Type::UUID => typed::<Uuid>(ty, raw),
        Type::JSON | Type::JSONB => typed::<serde_json::Value>(ty, raw),
        Type::BYTEA => typed::<Vec<u8>>(ty, raw),
        Type::INTERVAL => interval_text(raw).map(CellValue::Encoded),
        Type::INET | Type::CIDR => inet_text(raw).map(CellValue::Encoded),
        Type::MONEY => Wire(raw).i64().map(|cents| CellValue::encoded(Decimal::new(cents, 2))),
        _ => match ty.kind() {
            Kind::Enum(_) => std::str::from_utf8(raw).ok().map(CellValue::from),
            Kind::Domain(base) => Some(decode(base, raw)),
            Kind::Array(element) => array_value(element, raw),
            _ if <String as FromSql<'_>>::accepts(ty) => typed::<String>(ty, raw),
            _ => None,
        },
    };

    value.unwrap_or_else(|| {
        debug!("No decoder for values of type {}", ty.name());
        undecodable(ty)
    })
}

fn undecodable(ty: &Type) -> CellValue {
    CellValue::Encoded(format!("<{}>", ty.name()))
}

/// Big-endian reader over wire bytes.
struct Wire<'a>(&'a [u8]);

impl<'a> Wire<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.0.len() < n {
            return None;
        }
        let (head, rest) = self.0.split_at(n);
        self.0 = rest;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn i16(&mut self) -> Option<i16> {
        self.take(2)?.try_into().ok().map(i16::from_be_bytes)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2)?.try_into().ok().map(u16::from_be_bytes)
    }

    fn i32(&mut self) -> Option<i32> {
        self.take(4)?.try_into().ok().map(i32::from_be_bytes)
    }

    fn i64(&mut self) -> Option<i64> {
        self.take(8)?.try_into().ok().map(i64::from_be_bytes)
    }
}

/// Decimal text of a `numeric` value, base-10000 digits and all.
fn numeric_text(raw: &[u8]) -> Option<String> {
    let mut wire = Wire(raw);
    let ndigits = usize::try_from(wire.i16()?).ok()?;
    let weight = i32::from(wire.i16()?);
    let sign = wire.u16()?;
    let scale = usize::from(wire.u16()?);
    match sign {
        0xC000 => return Some("NaN".into()),
        0xD000 => return Some("Infinity".into()),
        0xF000 => return Some("-Infinity".into()),
        _ => {}
    }
    let digits = (0..ndigits).map(|_| wire.i16()).collect::<Option<Vec<_>>>()?;
    let digit = |position: i32| {
        usize::try_from(position)
            .ok()
            .and_then(|p| digits.get(p).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for position in 1..=weight {
            out.push_str(&format!("{:04}", digit(position)));
        }
    }

    if scale > 0 {
        let mut fraction = String::new();
        let mut position = weight + 1;
        while fraction.len() < scale {
            fraction.push_str(&format!("{:04}", digit(position)));
            position += 1;
        }
        fraction.truncate(scale);
        out.push('.');
        out.push_str(&fraction);
    }
    Some(out)
}

/// `interval` in the server's default output style, e.g. `1 year 2 mons 3 days 04:05:06`.
fn interval_text(raw: &[u8]) -> Option<String> {
    let mut wire = Wire(raw);
    let micros = wire.i64()?;
    let days = wire.i32()?;
    let months = wire.i32()?;

    let unit = |n: i32, name: &str| {
        if n.abs() == 1 {
            format!("{} {}", n, name)
        } else {
            format!("{} {}s", n, name)
        }
    };

    let mut parts = Vec::new();
    if months / 12 != 0 {
        parts.push(unit(months / 12, "year"));
    }
    if months % 12 != 0 {
        parts.push(unit(months % 12, "mon"));
    }
    if days != 0 {
        parts.push(unit(days, "day"));
    }
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let mut clock = format!("{}{:02}:{:02}:{:02}", sign, secs / 3600, secs / 60 % 60, secs % 60);
        let fraction = total % 1_000_000;
        if fraction != 0 {
            clock.push_str(format!(".{:06}", fraction).trim_end_matches('0'));
        }
        parts.push(clock);
    }
    Some(parts.join(" "))
}

/// `inet`/`cidr` as an address, with the prefix length when it is not a single host.
fn inet_text(raw: &[u8]) -> Option<String> {
    let mut wire = Wire(raw);
    let family = wire.u8()?;
    let bits = wire.u8()?;
    let is_cidr = wire.u8()? != 0;
    let len = wire.u8()?;

    let (addr, host_bits) = match (family, len) {
        (2, 4) => (IpAddr::from(<[u8; 4]>::try_from(wire.take(4)?).ok()?), 32),
        (3, 16) => (IpAddr::from(<[u8; 16]>::try_from(wire.take(16)?).ok()?), 128),
        _ => return None,
    };

    Some(if is_cidr || bits != host_bits {
        format!("{}/{}", addr, bits)
    } else {
        addr.to_string()
    })
}

/// Arrays become JSON text, nested once per dimension.
fn array_value(element: &Type, raw: &[u8]) -> Option<CellValue> {
    let mut wire = Wire(raw);
    let ndim = usize::try_from(wire.i32()?).ok()?;
    let _has_nulls = wire.i32()?;
    let _element_oid = wire.i32()?;
    let mut dims = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        dims.push(usize::try_from(wire.i32()?).ok()?);
        let _lower_bound = wire.i32()?;
    }

    let total = if dims.is_empty() { 0 } else { dims.iter().product() };
    let mut items = Vec::with_capacity(total);
    for _ in 0..total {
        let len = wire.i32()?;
        let item = match usize::try_from(len) {
            Ok(len) => serde_json::to_value(decode(element, wire.take(len)?)).ok()?,
            Err(_) => serde_json::Value::Null,
        };
        items.push(item);
    }

    let nested = nest(&dims, &mut items.into_iter());
    Some(CellValue::Encoded(nested.to_string()))
}

fn nest<I: Iterator<Item = serde_json::Value>>(dims: &[usize], items: &mut I) -> serde_json::Value {
    match dims.split_first() {
        None => serde_json::Value::Array(Vec::new()),
        Some((&len, [])) => serde_json::Value::Array(items.by_ref().take(len).collect()),
        Some((&len, rest)) => serde_json::Value::Array((0..len).map(|_| nest(rest, items)).collect()),
    }
}

#[async_trait]
impl CatalogIntrospector for PostgresIntrospector {
    fn engine(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    #[instrument(skip(self), fields(db = "postgres"))]
    async fn list_base_tables(&self) -> DbResult<Vec<TableName>> {
        let client = self.client().await?;
        let rows = client.query(LIST_TABLES, &[]).await.map_err(catalog_failed)?;

        rows.iter()
            .map(|row| {
                Ok(TableName::new(
                    row.try_get::<_, String>(0).map_err(catalog_failed)?,
                    row.try_get::<_, String>(1).map_err(catalog_failed)?,
                ))
            })
            .collect()
    }

    #[instrument(skip(self), fields(db = "postgres", table = %table))]
    async fn columns(&self, table: &TableName) -> DbResult<Vec<ColumnDescriptor>> {
        let rows = self.catalog_rows(LIST_COLUMNS, table).await?;

        rows.iter()
            .map(|row| {
                let nullable: Option<String> = row.try_get(3).map_err(catalog_failed)?;
                Ok(ColumnDescriptor {
                    name: row.try_get(0).map_err(catalog_failed)?,
                    data_type: row.try_get(1).map_err(catalog_failed)?,
                    max_length: row.try_get(2).map_err(catalog_failed)?,
                    nullable: nullable.as_deref() == Some("YES"),
                    default: row.try_get(4).map_err(catalog_failed)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(db = "postgres", table = %table))]
    async fn primary_keys(&self, table: &TableName) -> DbResult<Vec<String>> {
        let rows = self.catalog_rows(PRIMARY_KEYS, table).await?;
        rows.iter()
            .map(|row| row.try_get(0).map_err(catalog_failed))
            .collect()
    }

    #[instrument(skip(self), fields(db = "postgres", table = %table))]
    async fn foreign_keys(&self, table: &TableName) -> DbResult<Vec<ForeignKeyDescriptor>> {
        let rows = self.catalog_rows(FOREIGN_KEYS, table).await?;

        rows.iter()
            .map(|row| {
                Ok(ForeignKeyDescriptor {
                    column: row.try_get(0).map_err(catalog_failed)?,
                    references_schema: row.try_get(1).map_err(catalog_failed)?,
                    references_table: row.try_get(2).map_err(catalog_failed)?,
                    references_column: row.try_get(3).map_err(catalog_failed)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(db = "postgres", table = %table))]
    async fn approximate_row_count(&self, table: &TableName) -> DbResult<Option<i64>> {
        let rows = self.catalog_rows(ROW_ESTIMATE, table).await?;
        let estimate = match rows.first() {
            Some(row) => row.try_get::<_, Option<i64>>(0).map_err(catalog_failed)?,
            None => None,
        };
        // reltuples is -1 until the table has been vacuumed or analyzed.
        Ok(estimate.filter(|n| *n >= 0))
    }

    #[instrument(skip(self, sql), fields(db = "postgres"))]
    async fn fetch(&self, sql: &str, max_rows: usize) -> DbResult<RowSet> {
        let mut client = self.client().await?;
        debug!("Executing query: {}", sql);

        let transaction = client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(query_failed)?;

        let statement = transaction.prepare(sql).await.map_err(query_failed)?;
        let types: Vec<Type> = statement
            .columns()
            .iter()
            .map(|c| c.type_().clone())
            .collect();
        let mut rows = RowSet::new(
            statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        );

        {
            let stream = transaction
                .query_raw(&statement, Vec::<String>::new())
                .await
                .map_err(query_failed)?;
            let mut stream = pin!(stream);

            while rows.rows.len() < max_rows {
                let Some(row) = stream.try_next().await.map_err(query_failed)? else {
                    break;
                };
                let values = types
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| cell_value(&row, i, ty))
                    .collect();
                rows.push_values(values);
            }
        }

        transaction.rollback().await.map_err(query_failed)?;
        debug!("Fetched {} rows", rows.rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(weight: i16, sign: u16, scale: u16, digits: &[i16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&scale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    fn int4_array(dims: &[i32], items: &[Option<i32>]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(dims.len() as i32).to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        raw.extend_from_slice(&23i32.to_be_bytes());
        for d in dims {
            raw.extend_from_slice(&d.to_be_bytes());
            raw.extend_from_slice(&1i32.to_be_bytes());
        }
        for item in items {
            match item {
                Some(v) => {
                    raw.extend_from_slice(&4i32.to_be_bytes());
                    raw.extend_from_slice(&v.to_be_bytes());
                }
                None => raw.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        raw
    }

    #[test]
    fn test_native_values() {
        assert_eq!(decode(&Type::INT4, &7i32.to_be_bytes()), CellValue::Int(7));
        assert_eq!(decode(&Type::BOOL, &[1]), CellValue::Bool(true));
        assert_eq!(decode(&Type::TEXT, b"Lisbon"), CellValue::String("Lisbon".into()));
        assert_eq!(decode(&Type::VARCHAR, b"Porto"), CellValue::String("Porto".into()));
    }

    #[test]
    fn test_enum_and_domain_values() {
        let mood = Type::new("mood".into(), 90_001, Kind::Enum(vec!["happy".into()]), "public".into());
        assert_eq!(decode(&mood, b"happy"), CellValue::String("happy".into()));

        let price = Type::new("price".into(), 90_002, Kind::Domain(Type::INT4), "public".into());
        assert_eq!(decode(&price, &5i32.to_be_bytes()), CellValue::Int(5));
    }

    #[test]
    fn test_numeric_text() {
        assert_eq!(numeric_text(&numeric(0, 0, 2, &[123, 4500])).unwrap(), "123.45");
        assert_eq!(numeric_text(&numeric(-1, 0x4000, 4, &[12])).unwrap(), "-0.0012");
        assert_eq!(numeric_text(&numeric(1, 0, 0, &[7, 1])).unwrap(), "70001");
        assert_eq!(
            numeric_text(&numeric(7, 0, 0, &[100])).unwrap(),
            format!("1{}", "0".repeat(30))
        );
        assert_eq!(numeric_text(&numeric(0, 0xC000, 0, &[])).unwrap(), "NaN");
        assert_eq!(
            decode(&Type::NUMERIC, &numeric(0, 0xC000, 0, &[])),
            CellValue::Encoded("NaN".into())
        );
    }

    #[test]
    fn test_interval_text() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&14_706_000_000i64.to_be_bytes());
        raw.extend_from_slice(&3i32.to_be_bytes());
        raw.extend_from_slice(&14i32.to_be_bytes());
        assert_eq!(
            decode(&Type::INTERVAL, &raw),
            CellValue::Encoded("1 year 2 mons 3 days 04:05:06".into())
        );

        let mut raw = Vec::new();
        raw.extend_from_slice(&1_500_000i64.to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        assert_eq!(interval_text(&raw).unwrap(), "1 day 00:00:01.5");
    }

    #[test]
    fn test_network_and_money() {
        assert_eq!(
            decode(&Type::INET, &[2, 32, 0, 4, 192, 168, 0, 1]),
            CellValue::Encoded("192.168.0.1".into())
        );
        assert_eq!(
            decode(&Type::CIDR, &[2, 24, 1, 4, 10, 0, 0, 0]),
            CellValue::Encoded("10.0.0.0/24".into())
        );
        assert_eq!(
            decode(&Type::MONEY, &12_345i64.to_be_bytes()),
            CellValue::Encoded("123.45".into())
        );
    }

    #[test]
    fn test_arrays_become_json_text() {
        assert_eq!(
            decode(&Type::INT4_ARRAY, &int4_array(&[3], &[Some(1), None, Some(3)])),
            CellValue::Encoded("[1,null,3]".into())
        );
        assert_eq!(
            decode(&Type::INT4_ARRAY, &int4_array(&[2, 2], &[Some(1), Some(2), Some(3), Some(4)])),
            CellValue::Encoded("[[1,2],[3,4]]".into())
        );
        assert_eq!(decode(&Type::INT4_ARRAY, &int4_array(&[], &[])), CellValue::Encoded("[]".into()));
    }

    #[test]
    fn test_unknown_binary_type_is_named() {
        assert_eq!(decode(&Type::POINT, &[0; 16]), CellValue::Encoded("<point>".into()));
    }
}
