//! SQL statement validator.
//!
//! Two checks, in order: the statement must start with `SELECT`, and its
//! upper-cased text must not contain any blacklisted token. The token check is
//! a plain substring match over the whole statement, so it also fires inside
//! string literals and identifiers (`'UPDATE-2024'`, `created_at`).
//!
//! SQL Server gets a third check. T-SQL batches need no separator and
//! `SELECT ... INTO` writes, so statements bound for SQL Server must be a
//! single statement free of the words in [`MSSQL_FORBIDDEN_WORDS`]. This check
//! looks at code only: string literals, quoted identifiers and comments are
//! blanked out first.

use crate::config::DatabaseType;
use crate::error::{SecurityError, SecurityResult};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Tokens refused anywhere in a statement.
pub const FORBIDDEN_TOKENS: &[&str] = &[
    "DROP",
    "DELETE",
    "UPDATE",
    "INSERT",
    "TRUNCATE",
    "ALTER",
    "CREATE",
    "EXEC",
    "XP_CMDSHELL",
    "SP_",
];

static FORBIDDEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternation = FORBIDDEN_TOKENS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).expect("Invalid regex: forbidden token pattern")
});

/// Words refused in the code of a SQL Server statement.
pub const MSSQL_FORBIDDEN_WORDS: &[&str] = &[
    "INTO",
    "MERGE",
    "GRANT",
    "REVOKE",
    "DENY",
    "KILL",
    "COMMIT",
    "ROLLBACK",
    "SHUTDOWN",
    "RECONFIGURE",
    "DBCC",
    "BACKUP",
    "RESTORE",
    "BULK",
    "USE",
    "WAITFOR",
    "OPENROWSET",
    "OPENDATASOURCE",
    "OPENQUERY",
];

static MSSQL_FORBIDDEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternation = MSSQL_FORBIDDEN_WORDS.join("|");
    Regex::new(&format!(r"\b(?:{})\b", alternation)).expect("Invalid regex: T-SQL word pattern")
});

/// SELECT-only statement validator.
#[derive(Debug, Clone, Default)]
pub struct SqlValidator;

impl SqlValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a statement before it reaches the engine.
    pub fn validate(&self, query: &str) -> SecurityResult<()> {
        let upper = query.trim().to_uppercase();
        debug!("Validating query: {}", preview(&upper));

        if !upper.starts_with("SELECT") {
            warn!("Rejected non-SELECT statement");
            return Err(SecurityError::NotSelect);
        }

        if let Some(found) = FORBIDDEN_PATTERN.find(&upper) {
            warn!("Forbidden token detected: {}", found.as_str());
            return Err(SecurityError::ForbiddenKeyword(found.as_str().to_string()));
        }

        Ok(())
    }

    /// [`validate`](Self::validate) plus the checks specific to `engine`.
    pub fn validate_for(&self, engine: DatabaseType, query: &str) -> SecurityResult<()> {
        self.validate(query)?;

        if engine == DatabaseType::Mssql {
            let code = code_only(query).to_uppercase();
            if code.trim_end().trim_end_matches(';').contains(';') {
                warn!("Rejected multi-statement batch");
                return Err(SecurityError::MultipleStatements);
            }
            if let Some(found) = MSSQL_FORBIDDEN_PATTERN.find(&code) {
                warn!("Forbidden T-SQL word detected: {}", found.as_str());
                return Err(SecurityError::ForbiddenKeyword(found.as_str().to_string()));
            }
        }

        Ok(())
    }
}

/// `query` with literal, quoted-identifier and comment contents replaced by spaces.
fn code_only(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();
    let mut closing: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(end) = closing {
            if c == end {
                // Doubled delimiters are escapes ('' and ]] and "").
                if chars.peek() == Some(&end) {
                    chars.next();
                    out.push_str("  ");
                } else {
                    closing = None;
                    out.push(c);
                }
            } else {
                out.push(' ');
            }
            continue;
        }

        match (c, chars.peek()) {
            ('\'', _) => closing = Some('\''),
            ('"', _) => closing = Some('"'),
            ('[', _) => closing = Some(']'),
            ('-', Some('-')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                out.push('\n');
                continue;
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
                continue;
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

fn preview(query: &str) -> &str {
    match query.char_indices().nth(100) {
        Some((end, _)) => &query[..end],
        None => query,
    }
}
