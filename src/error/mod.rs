//! Error types for the discovery server.
//!
//! Every layer has its own `thiserror` enum; [`McpError`] wraps them all and
//! [`McpError::kind`] folds any failure into the small taxonomy that tool
//! callers see.

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Main error type for the server.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Query rejected: {0}")]
    Security(#[from] SecurityError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: Cow<'static, str> },
}

impl McpError {
    /// Classifies the error for structured tool failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Database(e) => e.kind(),
            Self::Security(_) => ErrorKind::ValidationRejected,
            Self::Config(_) => ErrorKind::InvalidArguments,
            Self::Tool(_) => ErrorKind::InvalidArguments,
            Self::Protocol(_) | Self::Io(_) | Self::Json(_) | Self::Internal { .. } => {
                ErrorKind::InternalError
            }
        }
    }
}

/// Failure classes reported to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credential, network or timeout failure while connecting, or no live connection.
    ConnectionError,
    /// The statement failed validation and never reached the engine.
    ValidationRejected,
    /// The engine reported a failure for a permitted statement.
    ExecutionError,
    /// No schema snapshot exists yet.
    NotDiscovered,
    /// The referenced table is not part of the snapshot.
    NotFound,
    InvalidArguments,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionError => "connection_error",
            Self::ValidationRejected => "validation_rejected",
            Self::ExecutionError => "execution_error",
            Self::NotDiscovered => "not_discovered",
            Self::NotFound => "not_found",
            Self::InvalidArguments => "invalid_arguments",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-RPC 2.0 and MCP protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parse error: invalid JSON")]
    ParseError,

    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(Cow<'static, str>),

    #[error("Internal error: {0}")]
    InternalError(Cow<'static, str>),

    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),
}

impl ProtocolError {
    /// Returns the JSON-RPC 2.0 error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::InternalError(_) => -32603,
            Self::Transport(_) => -32000,
        }
    }
}

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("No active database connection. Call 'connect_database' first.")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Catalog lookup failed: {0}")]
    CatalogFailed(String),

    #[error("Unsupported database type: {0}")]
    UnsupportedType(String),

    #[error("Schema not discovered. Call 'connect_database' first.")]
    SchemaNotDiscovered,

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("No text column found in {0}")]
    NoTextColumns(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl DatabaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConnected
            | Self::ConnectionFailed(_)
            | Self::ConnectTimeout(_)
            | Self::UnsupportedType(_) => ErrorKind::ConnectionError,
            Self::QueryFailed(_) | Self::CatalogFailed(_) => ErrorKind::ExecutionError,
            Self::SchemaNotDiscovered => ErrorKind::NotDiscovered,
            Self::TableNotFound(_) | Self::NoTextColumns(_) => ErrorKind::NotFound,
            Self::InvalidIdentifier(_) => ErrorKind::InvalidArguments,
        }
    }
}

/// Reasons a statement is refused before execution.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Only SELECT queries are permitted")]
    NotSelect,

    #[error("Forbidden keyword: {0}")]
    ForbiddenKeyword(String),

    #[error("Only a single statement is permitted")]
    MultipleStatements,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(Cow<'static, str>),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
}

/// Tool execution errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(Cow<'static, str>),
}

/// Result type alias for McpError.
pub type Result<T> = std::result::Result<T, McpError>;

/// Result type alias for DatabaseError.
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// Result type alias for ProtocolError.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Result type alias for SecurityError.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;
