//! Query result types and catalog structures.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use uuid::Uuid;

/// One result row, keyed by column name in result-set order.
pub type Row = IndexMap<String, CellValue>;

/// Rows read from the engine before any shaping.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row built from values in column order.
    pub fn push_values(&mut self, values: Vec<CellValue>) {
        let row = self.columns.iter().cloned().zip(values).collect();
        self.rows.push(row);
    }
}

/// Uniform tabular result of a bounded read.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(rename = "count")]
    pub row_count: usize,
    /// True exactly when the number of rows returned equals the requested cap.
    pub limited: bool,
}

impl QueryResult {
    /// Shape a row set under a cap of `limit` rows.
    pub fn capped(mut rows: RowSet, limit: usize) -> Self {
        rows.rows.truncate(limit);
        let row_count = rows.rows.len();
        Self {
            columns: rows.columns,
            rows: rows.rows,
            row_count,
            limited: row_count == limit,
        }
    }
}

/// Tagged cell value at the serialization boundary.
///
/// Values without a JSON-native form (timestamps, decimals, UUIDs, binary,
/// documents) travel as [`CellValue::Encoded`] strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Encoded(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Encoded(s) => Some(s),
            _ => None,
        }
    }

    /// Encode any displayable value as a string fallback.
    pub fn encoded(value: impl fmt::Display) -> Self {
        Self::Encoded(value.to_string())
    }

    /// Encode binary data as `0x`-prefixed upper-case hex.
    pub fn hex(bytes: &[u8]) -> Self {
        let mut out = String::with_capacity(2 + bytes.len() * 2);
        out.push_str("0x");
        for byte in bytes {
            let _ = write!(out, "{:02X}", byte);
        }
        Self::Encoded(out)
    }
}

impl<T> From<Option<T>> for CellValue
where
    T: Into<CellValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i16> for CellValue {
    fn from(v: i16) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u8> for CellValue {
    fn from(v: u8) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            Self::Float(v)
        } else {
            Self::Encoded(v.to_string())
        }
    }
}

impl From<f32> for CellValue {
    fn from(v: f32) -> Self {
        Self::from(v as f64)
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Decimal> for CellValue {
    fn from(v: Decimal) -> Self {
        Self::encoded(v)
    }
}

impl From<Uuid> for CellValue {
    fn from(v: Uuid) -> Self {
        Self::encoded(v)
    }
}

impl From<DateTime<Utc>> for CellValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Encoded(v.to_rfc3339())
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Encoded(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }
}

impl From<NaiveDate> for CellValue {
    fn from(v: NaiveDate) -> Self {
        Self::encoded(v)
    }
}

impl From<NaiveTime> for CellValue {
    fn from(v: NaiveTime) -> Self {
        Self::encoded(v)
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(v: serde_json::Value) -> Self {
        Self::encoded(v)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(v: Vec<u8>) -> Self {
        Self::hex(&v)
    }
}

/// A base table addressed by schema and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column as declared in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Dialect-specific type name, not normalized across engines.
    #[serde(rename = "type")]
    pub data_type: String,
    pub max_length: Option<i32>,
    pub nullable: bool,
    pub default: Option<String>,
}

/// One foreign-key edge from a column of the owning table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub column: String,
    pub references_schema: String,
    pub references_table: String,
    pub references_column: String,
}

impl ForeignKeyDescriptor {
    pub fn target(&self) -> TableName {
        TableName::new(&self.references_schema, &self.references_table)
    }
}
