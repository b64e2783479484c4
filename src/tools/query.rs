//! Read tools: execute_query, preview_table, search_data.

use crate::error::Result;
use crate::protocol::{CallToolResult, Tool};
use crate::session::DiscoverySession;
use crate::tools::registry::{ToolHandler, parse_args, success_result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
pub struct ExecuteQueryArgs {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub struct ExecuteQueryTool {
    session: Arc<DiscoverySession>,
}

impl ExecuteQueryTool {
    pub fn new(session: Arc<DiscoverySession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ToolHandler for ExecuteQueryTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "execute_query".into(),
            description: Some(
                "Execute a read-only SQL query against the connected database. \
                Only SELECT statements are allowed; statements mentioning DROP, DELETE, UPDATE, \
                INSERT, TRUNCATE, ALTER, CREATE, EXEC, XP_CMDSHELL or SP_ anywhere \
                (string literals and identifiers included) are rejected. \
                Use the 'limit' parameter to cap the number of rows."
                    .into(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The SELECT statement to run"
                    },
                    "limit": {
                        "type": "integer",
                        "description": format!(
                            "Maximum number of rows to return (default: {})",
                            self.session.query_config().default_limit
                        ),
                        "minimum": 1
                    }
                },
                "required": ["query"]
            }),
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "execute_query"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: ExecuteQueryArgs = parse_args(arguments)?;
        let result = self.session.execute(&args.query, args.limit).await?;
        debug!(rows = result.row_count, limited = result.limited, "Query returned");
        Ok(success_result(&result))
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewTableArgs {
    pub table: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub struct PreviewTableTool {
    session: Arc<DiscoverySession>,
}

impl PreviewTableTool {
    pub fn new(session: Arc<DiscoverySession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ToolHandler for PreviewTableTool {
    fn definition(&self) -> Tool {
        let engine = self.session.engine();
        Tool {
            name: "preview_table".into(),
            description: Some("Return the first rows of a table or view.".into()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table": {
                        "type": "string",
                        "description": format!(
                            "Table name, optionally schema-qualified (default schema: {})",
                            engine.default_schema()
                        )
                    },
                    "limit": {
                        "type": "integer",
                        "description": format!(
                            "Number of rows (default: {})",
                            self.session.query_config().preview_limit
                        ),
                        "minimum": 1
                    }
                },
                "required": ["table"]
            }),
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "preview_table"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: PreviewTableArgs = parse_args(arguments)?;
        let result = self.session.preview(&args.table, args.limit).await?;
        Ok(success_result(&result))
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchDataArgs {
    pub table: String,
    pub search_term: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

pub struct SearchDataTool {
    session: Arc<DiscoverySession>,
}

impl SearchDataTool {
    pub fn new(session: Arc<DiscoverySession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ToolHandler for SearchDataTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "search_data".into(),
            description: Some(format!(
                "Case-insensitive substring search over a table's text columns. \
                Returns at most {} rows. Without 'columns', every text column of the \
                discovered table is searched.",
                self.session.query_config().search_limit
            )),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table": {
                        "type": "string",
                        "description": format!(
                            "Table name, optionally schema-qualified (default schema: {})",
                            self.session.engine().default_schema()
                        )
                    },
                    "search_term": {
                        "type": "string",
                        "description": "Text to look for"
                    },
                    "columns": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Columns to search (default: all text columns)"
                    }
                },
                "required": ["table", "search_term"]
            }),
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "search_data"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: SearchDataArgs = parse_args(arguments)?;
        let result = self
            .session
            .search(&args.table, &args.search_term, args.columns.as_deref())
            .await?;
        Ok(success_result(&result))
    }
}
