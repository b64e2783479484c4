//! MCP request handler implementation.

use crate::error::ProtocolResult;
use crate::protocol::{
    CallToolParams, CallToolResult, Handler, InitializeParams, InitializeResult, ListToolsResult,
    Implementation, MCP_VERSION, ServerCapabilities, ToolsCapability,
};
use crate::server::state::ServerState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// MCP request handler backed by one discovery session.
pub struct McpHandler {
    state: Arc<ServerState>,
}

impl McpHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    fn instructions(&self) -> String {
        let info = self.state.session.connection_info();
        let tools = self
            .state
            .tools
            .list()
            .into_iter()
            .map(|t| t.name)
            .collect::<Vec<_>>()
            .join(", ");

        if info.connected {
            format!(
                "Schema discovery server connected to {} on {} ({} tables discovered). \
                Start with get_database_schema, then use execute_query, preview_table or search_data. \
                Available tools: {}.",
                info.database.as_deref().unwrap_or("unknown"),
                info.host.as_deref().unwrap_or("unknown"),
                info.tables.unwrap_or(0),
                tools
            )
        } else {
            format!(
                "Schema discovery server for {} (not connected). \
                Call connect_database first; it discovers the schema used by the other tools. \
                Available tools: {}.",
                info.engine, tools
            )
        }
    }
}

#[async_trait]
impl Handler for McpHandler {
    async fn initialize(&self, params: InitializeParams) -> ProtocolResult<InitializeResult> {
        info!("Initialize request from {}", params.client_info);
        debug!("Client capabilities: {:?}", params.capabilities);

        self.state.set_initialized(params.client_info);

        Ok(InitializeResult {
            protocol_version: MCP_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: Implementation::new(
                self.state.config.name.to_string(),
                self.state.config.version.to_string(),
            ),
            instructions: Some(self.instructions()),
        })
    }

    async fn initialized(&self) -> ProtocolResult<()> {
        info!("Client confirmed initialization");
        Ok(())
    }

    async fn shutdown(&self) -> ProtocolResult<()> {
        info!(tool_calls = self.state.tool_calls(), "Shutdown request received");
        Ok(())
    }

    async fn list_tools(&self) -> ProtocolResult<ListToolsResult> {
        let tools = self.state.tools.list();
        debug!("Listing {} tools", tools.len());

        Ok(ListToolsResult { tools })
    }

    #[instrument(skip(self, params), fields(tool = %params.name, call))]
    async fn call_tool(&self, params: CallToolParams) -> ProtocolResult<CallToolResult> {
        let call = self.state.next_tool_call();
        tracing::Span::current().record("call", call);
        debug!("Tool call");

        Ok(self.state.tools.call(params).await)
    }
}
