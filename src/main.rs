//! MCP server binary entry point.

use anyhow::Result;
use schema_discovery_mcp::{
    config::ServerConfig,
    protocol::McpServerBuilder,
    server::{McpHandler, ServerStateBuilder},
    session::DiscoverySession,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = ServerConfig::from_env()?;
    let session = Arc::new(DiscoverySession::new(config.database_type, config.query));

    match &config.auto_connect {
        Some(database) => {
            info!(
                "Connecting to {} database at {}:{}",
                database.database_type, database.host, database.port
            );
            match session.connect(database).await {
                Ok(summary) => info!(
                    tables = summary.tables_discovered,
                    "{}", summary.message
                ),
                Err(e) => {
                    warn!("Startup connection failed: {}", e);
                    warn!("Server will start without a connection. Use 'connect_database' to retry.");
                }
            }
        }
        None => info!("No database configured. Use 'connect_database' to establish a connection."),
    }

    let state = Arc::new(
        ServerStateBuilder::new()
            .config(config)
            .session(session)
            .build()
            .map_err(|e| anyhow::anyhow!(e))?,
    );

    info!("Server state initialized with {} tools", state.tools.len());

    let handler = McpHandler::new(state);
    let server = McpServerBuilder::new()
        .handler(handler)
        .name(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .with_tools()
        .build()?;

    info!("MCP server ready, waiting for requests...");

    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("schema_discovery_mcp=info,warn"));

    // stdout carries the protocol, so logs go to stderr
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .init();
}
