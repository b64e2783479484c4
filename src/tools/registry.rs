//! Tool registry and the result shapes shared by every tool.

use crate::error::{McpError, Result, ToolError};
use crate::protocol::{CallToolParams, CallToolResult, Tool};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> Tool;
    async fn execute(&self, arguments: Value) -> Result<CallToolResult>;
}

pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    pub fn register<T: ToolHandler + 'static>(&self, tool: T) {
        let definition = tool.definition();
        let name = definition.name.clone();
        debug!("Registering tool: {}", name);
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|r| Arc::clone(&*r))
    }

    /// Tool definitions ordered by name.
    pub fn list(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.iter().map(|r| r.value().definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn execute(&self, params: CallToolParams) -> Result<CallToolResult> {
        let tool = self
            .get(&params.name)
            .ok_or_else(|| ToolError::NotFound(params.name.clone()))?;

        tool.execute(params.arguments).await
    }

    /// Run a tool, folding any failure into a structured failure result.
    pub async fn call(&self, params: CallToolParams) -> CallToolResult {
        let name = params.name.clone();
        match self.execute(params).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %name, kind = %e.kind(), error = %e, "Tool call failed");
                failure_result(&e)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize tool arguments, treating a missing object as empty.
pub fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()).into())
}

pub fn json_result<T: serde::Serialize>(data: &T) -> CallToolResult {
    CallToolResult::json(data)
}

/// `{success: true, ...}` with the fields of `data` merged in.
pub fn success_result<T: serde::Serialize>(data: &T) -> CallToolResult {
    let mut value = serde_json::to_value(data).unwrap_or_else(|e| json!({ "detail": e.to_string() }));
    if let Value::Object(map) = &mut value {
        map.insert("success".into(), Value::Bool(true));
    }
    CallToolResult::json(&value)
}

/// `{success: false, error_kind, error}`, flagged as an error result.
pub fn failure_result(error: &McpError) -> CallToolResult {
    let payload = json!({
        "success": false,
        "error_kind": error.kind(),
        "error": error.to_string(),
    });
    CallToolResult::json_error(&payload)
}
