//! SQL statement validation.

pub mod validator;

pub use validator::{FORBIDDEN_TOKENS, MSSQL_FORBIDDEN_WORDS, SqlValidator};
