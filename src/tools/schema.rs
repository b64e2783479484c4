//! Schema inspection tools: get_database_schema, analyze_relationships, get_table_info.

use crate::error::{McpError, Result};
use crate::protocol::{CallToolResult, Tool};
use crate::session::DiscoverySession;
use crate::tools::registry::{ToolHandler, json_result, parse_args};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

pub struct GetDatabaseSchemaTool {
    session: Arc<DiscoverySession>,
}

impl GetDatabaseSchemaTool {
    pub fn new(session: Arc<DiscoverySession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ToolHandler for GetDatabaseSchemaTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "get_database_schema".into(),
            description: Some(
                "Return the schema discovered at connect time: every table with its columns, \
                primary keys, foreign keys and approximate row count. \
                Requires a prior connect_database call."
                    .into(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    #[instrument(skip(self, _arguments), fields(tool = "get_database_schema"))]
    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        let snapshot = self.session.schema().map_err(McpError::from)?;
        Ok(json_result(&*snapshot))
    }
}

pub struct AnalyzeRelationshipsTool {
    session: Arc<DiscoverySession>,
}

impl AnalyzeRelationshipsTool {
    pub fn new(session: Arc<DiscoverySession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ToolHandler for AnalyzeRelationshipsTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "analyze_relationships".into(),
            description: Some(
                "List every foreign-key relationship in the discovered schema \
                with a suggested JOIN clause for each."
                    .into(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    #[instrument(skip(self, _arguments), fields(tool = "analyze_relationships"))]
    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        let report = self.session.analyze_relationships().map_err(McpError::from)?;
        Ok(json_result(&report))
    }
}

#[derive(Debug, Deserialize)]
pub struct TableArgs {
    pub table: String,
}

pub struct GetTableInfoTool {
    session: Arc<DiscoverySession>,
}

impl GetTableInfoTool {
    pub fn new(session: Arc<DiscoverySession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ToolHandler for GetTableInfoTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "get_table_info".into(),
            description: Some(
                "Return the discovered description of one table: columns, keys and row estimate."
                    .into(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table": {
                        "type": "string",
                        "description": format!(
                            "Table name, optionally schema-qualified (default schema: {})",
                            self.session.engine().default_schema()
                        )
                    }
                },
                "required": ["table"]
            }),
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "get_table_info"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: TableArgs = parse_args(arguments)?;
        let table = self.session.table_info(&args.table).map_err(McpError::from)?;
        Ok(json_result(&table))
    }
}
