//! Engine-specific SQL text: identifier quoting, row caps and the
//! statements behind table preview and text search.

use crate::config::DatabaseType;
use crate::database::result::TableName;
use crate::error::{DatabaseError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;

static ROW_CAP_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:LIMIT|FETCH)\b").expect("valid regex"));

const POSTGRES_TEXT_TYPES: &[&str] = &["character varying", "text", "character", "varchar", "char"];
const MSSQL_TEXT_TYPES: &[&str] = &["VARCHAR", "NVARCHAR", "TEXT", "NTEXT", "CHAR", "NCHAR"];

impl DatabaseType {
    /// Quote one identifier for this engine.
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Self::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::Mssql => format!("[{}]", ident.replace(']', "]]")),
        }
    }

    /// Fully quoted `schema.table`.
    pub fn qualified_name(&self, table: &TableName) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(&table.schema),
            self.quote_identifier(&table.name)
        )
    }

    /// Parse `table`, `schema.table` or a quoted form such as `[dbo].[Orders]`.
    ///
    /// Dots inside quoted parts belong to the name. With more than two parts
    /// the last two are used.
    pub fn parse_table_ref(&self, input: &str) -> DbResult<TableName> {
        let parts = split_reference(input);
        let (schema, name) = match parts.as_slice() {
            [name] => (self.default_schema(), name.as_str()),
            [.., schema, name] => (schema.as_str(), name.as_str()),
            [] => ("", ""),
        };

        if schema.is_empty() || name.is_empty() {
            return Err(DatabaseError::InvalidIdentifier(format!(
                "'{}' is not a valid table reference",
                input
            )));
        }
        Ok(TableName::new(schema, name))
    }

    /// Whether a declared column type belongs to this engine's text types.
    pub fn is_text_type(&self, declared: &str) -> bool {
        let declared = declared.trim();
        match self {
            Self::Postgres => POSTGRES_TEXT_TYPES.iter().any(|t| t.eq_ignore_ascii_case(declared)),
            Self::Mssql => MSSQL_TEXT_TYPES.iter().any(|t| t.eq_ignore_ascii_case(declared)),
        }
    }

    /// Add a native row cap when the statement text has none.
    ///
    /// A statement with its own `LIMIT` or `FETCH` clause is left alone, as
    /// are SQL Server statements; the fetch layer caps those while reading rows.
    pub fn with_row_cap(&self, sql: &str, limit: usize) -> String {
        match self {
            Self::Postgres if !ROW_CAP_CLAUSE.is_match(sql) => {
                let body = sql.trim_end().trim_end_matches(';').trim_end();
                format!("{}\nLIMIT {}", body, limit)
            }
            _ => sql.to_string(),
        }
    }

    /// `SELECT` of the first `limit` rows of a table.
    pub fn preview_sql(&self, table: &TableName, limit: usize) -> String {
        match self {
            Self::Postgres => format!("SELECT * FROM {} LIMIT {}", self.qualified_name(table), limit),
            Self::Mssql => format!("SELECT TOP {} * FROM {}", limit, self.qualified_name(table)),
        }
    }

    /// `SELECT` of rows where any of `columns` contains `term`, case-insensitively.
    pub fn search_sql(&self, table: &TableName, columns: &[String], term: &str, limit: usize) -> String {
        let pattern = self.string_literal(&format!("%{}%", self.escape_like(term)));
        let predicate = columns
            .iter()
            .map(|column| {
                let column = self.quote_identifier(column);
                match self {
                    Self::Postgres => format!("CAST({} AS TEXT) ILIKE {}", column, pattern),
                    Self::Mssql => format!(
                        "LOWER(CAST({} AS NVARCHAR(MAX))) LIKE LOWER({})",
                        column, pattern
                    ),
                }
            })
            .collect::<Vec<_>>()
            .join(" OR ");

        match self {
            Self::Postgres => format!(
                "SELECT * FROM {} WHERE {} LIMIT {}",
                self.qualified_name(table),
                predicate,
                limit
            ),
            Self::Mssql => format!(
                "SELECT TOP {} * FROM {} WHERE {}",
                limit,
                self.qualified_name(table),
                predicate
            ),
        }
    }

    /// Make LIKE wildcards in `term` match literally.
    fn escape_like(&self, term: &str) -> String {
        let mut out = String::with_capacity(term.len());
        for c in term.chars() {
            match (self, c) {
                (Self::Postgres, '\\' | '%' | '_') => {
                    out.push('\\');
                    out.push(c);
                }
                (Self::Mssql, '[' | '%' | '_') => {
                    out.push('[');
                    out.push(c);
                    out.push(']');
                }
                _ => out.push(c),
            }
        }
        out
    }

    fn string_literal(&self, value: &str) -> String {
        let escaped = value.replace('\'', "''");
        match self {
            Self::Postgres => format!("'{}'", escaped),
            Self::Mssql => format!("N'{}'", escaped),
        }
    }
}

/// Split a dotted reference into unquoted parts.
///
/// `"..."`, `[...]` and `` `...` `` parts keep their dots and inner spaces,
/// and a doubled closing delimiter stands for itself.
fn split_reference(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut closing: Option<char> = None;
    let mut chars = input.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match closing {
            Some(end) if c == end => {
                if chars.peek() == Some(&end) {
                    chars.next();
                    current.push(end);
                } else {
                    closing = None;
                }
            }
            Some(_) => current.push(c),
            None => match c {
                '"' | '[' | '`' => {
                    if current.trim().is_empty() {
                        current.clear();
                    }
                    closing = Some(if c == '[' { ']' } else { c });
                    quoted = true;
                }
                '.' => {
                    parts.push(finish_part(std::mem::take(&mut current), quoted));
                    quoted = false;
                }
                c if quoted && c.is_whitespace() => {}
                _ => current.push(c),
            },
        }
    }
    parts.push(finish_part(current, quoted));
    parts
}

fn finish_part(part: String, quoted: bool) -> String {
    if quoted { part } else { part.trim().to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG: DatabaseType = DatabaseType::Postgres;
    const MS: DatabaseType = DatabaseType::Mssql;

    #[test]
    fn test_parse_table_ref_defaults_schema() {
        assert_eq!(PG.parse_table_ref("orders").unwrap(), TableName::new("public", "orders"));
        assert_eq!(MS.parse_table_ref("Properties").unwrap(), TableName::new("dbo", "Properties"));
    }

    #[test]
    fn test_parse_table_ref_quoted_and_qualified() {
        assert_eq!(
            MS.parse_table_ref("[sales].[Orders]").unwrap(),
            TableName::new("sales", "Orders")
        );
        assert_eq!(
            PG.parse_table_ref("\"Sales\".\"Line Items\"").unwrap(),
            TableName::new("Sales", "Line Items")
        );
        assert_eq!(
            MS.parse_table_ref("RealEstate.dbo.Properties").unwrap(),
            TableName::new("dbo", "Properties")
        );
        assert!(PG.parse_table_ref("sales.").is_err());
        assert!(PG.parse_table_ref("\"\"").is_err());
        assert!(PG.parse_table_ref("  ").is_err());
    }

    #[test]
    fn test_parse_table_ref_dots_inside_quotes() {
        assert_eq!(
            PG.parse_table_ref("\"my.schema\".\"t\"").unwrap(),
            TableName::new("my.schema", "t")
        );
        assert_eq!(MS.parse_table_ref("[dbo].[a.b]").unwrap(), TableName::new("dbo", "a.b"));
        assert_eq!(MS.parse_table_ref("[dbo] . [a b]").unwrap(), TableName::new("dbo", "a b"));
        assert_eq!(MS.parse_table_ref("dbo.[odd]]name]").unwrap(), TableName::new("dbo", "odd]name"));
        assert_eq!(
            PG.parse_table_ref("\"we\"\"ird.t\"").unwrap(),
            TableName::new("public", "we\"ird.t")
        );
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(PG.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(MS.quote_identifier("we]ird"), "[we]]ird]");
    }

    #[test]
    fn test_text_types() {
        assert!(PG.is_text_type("character varying"));
        assert!(PG.is_text_type("TEXT"));
        assert!(!PG.is_text_type("integer"));
        assert!(MS.is_text_type("nvarchar"));
        assert!(MS.is_text_type("NTEXT"));
        assert!(!MS.is_text_type("decimal"));
    }

    #[test]
    fn test_row_cap_postgres() {
        assert_eq!(PG.with_row_cap("SELECT * FROM t;  ", 5), "SELECT * FROM t\nLIMIT 5");
        assert_eq!(PG.with_row_cap("select 1 limit 3", 5), "select 1 limit 3");
        assert_eq!(
            PG.with_row_cap("SELECT * FROM t ORDER BY id FETCH FIRST 3 ROWS ONLY", 5),
            "SELECT * FROM t ORDER BY id FETCH FIRST 3 ROWS ONLY"
        );
        assert_eq!(MS.with_row_cap("SELECT * FROM t", 5), "SELECT * FROM t");
    }

    #[test]
    fn test_preview_sql() {
        let table = TableName::new("dbo", "Properties");
        assert_eq!(MS.preview_sql(&table, 2), "SELECT TOP 2 * FROM [dbo].[Properties]");
        let table = TableName::new("public", "orders");
        assert_eq!(PG.preview_sql(&table, 10), "SELECT * FROM \"public\".\"orders\" LIMIT 10");
    }

    #[test]
    fn test_search_sql_postgres() {
        let sql = PG.search_sql(
            &TableName::new("public", "listings"),
            &["city".into(), "title".into()],
            "o'neil 50%",
            50,
        );
        assert_eq!(
            sql,
            "SELECT * FROM \"public\".\"listings\" WHERE CAST(\"city\" AS TEXT) ILIKE '%o''neil 50\\%%' \
             OR CAST(\"title\" AS TEXT) ILIKE '%o''neil 50\\%%' LIMIT 50"
        );
    }

    #[test]
    fn test_search_sql_mssql() {
        let sql = MS.search_sql(&TableName::new("dbo", "Properties"), &["city".into()], "a_b", 50);
        assert_eq!(
            sql,
            "SELECT TOP 50 * FROM [dbo].[Properties] WHERE LOWER(CAST([city] AS NVARCHAR(MAX))) LIKE LOWER(N'%a[_]b%')"
        );
    }
}
