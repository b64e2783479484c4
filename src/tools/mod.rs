//! MCP tool definitions and registry.

pub mod connection;
pub mod query;
pub mod registry;
pub mod schema;

pub use connection::{ConnectDatabaseTool, ConnectionInfoTool};
pub use query::{ExecuteQueryTool, PreviewTableTool, SearchDataTool};
pub use registry::{ToolHandler, ToolRegistry, failure_result, json_result, success_result};
pub use schema::{AnalyzeRelationshipsTool, GetDatabaseSchemaTool, GetTableInfoTool};

use crate::session::DiscoverySession;
use std::sync::Arc;

/// Create and register all tools against one session.
pub fn create_registry(session: Arc<DiscoverySession>) -> ToolRegistry {
    let registry = ToolRegistry::new();

    registry.register(ConnectDatabaseTool::new(Arc::clone(&session)));
    registry.register(ConnectionInfoTool::new(Arc::clone(&session)));

    // Snapshot tools
    registry.register(GetDatabaseSchemaTool::new(Arc::clone(&session)));
    registry.register(AnalyzeRelationshipsTool::new(Arc::clone(&session)));
    registry.register(GetTableInfoTool::new(Arc::clone(&session)));

    // Read tools (require connection)
    registry.register(ExecuteQueryTool::new(Arc::clone(&session)));
    registry.register(PreviewTableTool::new(Arc::clone(&session)));
    registry.register(SearchDataTool::new(session));

    registry
}
