//! MCP server for schema discovery and safe, read-only querying.
//!
//! Connects to PostgreSQL or SQL Server, discovers the catalog once per
//! connection and exposes it to MCP clients alongside row-capped
//! SELECT execution, table previews and text search.
//!
//! # Example
//!
//! ```no_run
//! use schema_discovery_mcp::{
//!     config::ServerConfig,
//!     protocol::McpServerBuilder,
//!     server::{McpHandler, ServerStateBuilder},
//!     session::DiscoverySession,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!
//!     // The session starts disconnected until `connect_database` is called
//!     let session = Arc::new(DiscoverySession::new(config.database_type, config.query));
//!
//!     let state = Arc::new(
//!         ServerStateBuilder::new()
//!             .config(config)
//!             .session(session)
//!             .build()
//!             .map_err(|e| anyhow::anyhow!(e))?,
//!     );
//!
//!     let server = McpServerBuilder::new()
//!         .handler(McpHandler::new(state))
//!         .with_tools()
//!         .build()?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod security;
pub mod server;
pub mod session;
pub mod tools;

pub use config::{DatabaseConfig, DatabaseConfigBuilder, DatabaseType, QueryConfig, ServerConfig};
pub use database::{CatalogIntrospector, Connection, Connector, QueryResult, create_introspector};
pub use discovery::{SchemaSnapshot, TableDescriptor};
pub use error::{ErrorKind, McpError, Result};
pub use protocol::{McpServer, McpServerBuilder};
pub use security::SqlValidator;
pub use server::{McpHandler, ServerState, ServerStateBuilder};
pub use session::{ConnectSummary, DiscoverySession};
