//! Tools: connect_database, connection_info

use crate::config::{DatabaseConfig, DatabaseConfigBuilder, DatabaseType};
use crate::error::{McpError, Result, ToolError};
use crate::protocol::{CallToolResult, Tool};
use crate::session::DiscoverySession;
use crate::tools::registry::{ToolHandler, json_result, parse_args};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct ConnectArgs {
    #[serde(default, alias = "server")]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default, alias = "user")]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub trust_server_certificate: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

pub struct ConnectDatabaseTool {
    session: Arc<DiscoverySession>,
}

impl ConnectDatabaseTool {
    pub fn new(session: Arc<DiscoverySession>) -> Self {
        Self { session }
    }

    fn host_field(&self) -> &'static str {
        match self.session.engine() {
            DatabaseType::Mssql => "server",
            DatabaseType::Postgres => "host",
        }
    }

    fn build_config(&self, args: ConnectArgs) -> Result<DatabaseConfig> {
        let host = args
            .host
            .ok_or_else(|| ToolError::MissingArgument(self.host_field().into()))?;
        let database = args
            .database
            .ok_or_else(|| ToolError::MissingArgument("database".into()))?;
        let username = args
            .username
            .ok_or_else(|| ToolError::MissingArgument("username".into()))?;
        let password = args
            .password
            .ok_or_else(|| ToolError::MissingArgument("password".into()))?;

        let mut builder = DatabaseConfigBuilder::new()
            .database_type(self.session.engine())
            .host(host)
            .database(database)
            .username(username)
            .password(password);
        if let Some(port) = args.port {
            builder = builder.port(port);
        }
        if let Some(trust) = args.trust_server_certificate {
            builder = builder.trust_cert(trust);
        }
        if let Some(secs) = args.timeout_secs {
            builder = builder.connection_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

#[async_trait]
impl ToolHandler for ConnectDatabaseTool {
    fn definition(&self) -> Tool {
        let engine = self.session.engine();
        let host_field = self.host_field();

        let mut properties = json!({
            host_field: {
                "type": "string",
                "description": "Database server hostname or IP address"
            },
            "database": {
                "type": "string",
                "description": "Database name to connect to"
            },
            "username": {
                "type": "string",
                "description": "Database username"
            },
            "password": {
                "type": "string",
                "description": "Database password"
            },
            "port": {
                "type": "integer",
                "description": format!("Server port (default: {})", engine.default_port())
            }
        });
        if engine == DatabaseType::Mssql {
            properties["trust_server_certificate"] = json!({
                "type": "boolean",
                "description": "Accept the server certificate without validation (default: true)"
            });
        }

        Tool {
            name: "connect_database".into(),
            description: Some(format!(
                "Connect to a {} database and discover its schema: tables, columns, \
                primary keys, foreign keys and approximate row counts. \
                Replaces any previous connection.",
                match engine {
                    DatabaseType::Mssql => "SQL Server",
                    DatabaseType::Postgres => "PostgreSQL",
                }
            )),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": [host_field, "database", "username", "password"]
            }),
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "connect_database"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: ConnectArgs = parse_args(arguments)?;
        let config = self.build_config(args)?;

        let summary = self.session.connect(&config).await.map_err(McpError::from)?;
        Ok(json_result(&summary))
    }
}

pub struct ConnectionInfoTool {
    session: Arc<DiscoverySession>,
}

impl ConnectionInfoTool {
    pub fn new(session: Arc<DiscoverySession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ToolHandler for ConnectionInfoTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "connection_info".into(),
            description: Some(
                "Show the current connection: engine, server, database, user, \
                when it was opened and how many tables were discovered."
                    .into(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    #[instrument(skip(self, _arguments), fields(tool = "connection_info"))]
    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        Ok(json_result(&self.session.connection_info()))
    }
}
