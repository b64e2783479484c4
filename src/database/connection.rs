//! Live connections and the seam that opens them.

use crate::config::{DatabaseConfig, DatabaseType};
use crate::database::create_introspector;
use crate::database::traits::CatalogIntrospector;
use crate::error::DbResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// An open connection plus the settings it was opened with.
///
/// The password is not retained.
#[derive(Clone)]
pub struct Connection {
    pub introspector: Arc<dyn CatalogIntrospector>,
    pub engine: DatabaseType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(introspector: Arc<dyn CatalogIntrospector>, config: &DatabaseConfig) -> Self {
        Self {
            engine: introspector.engine(),
            introspector,
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            username: config.username.clone(),
            connected_at: Utc::now(),
        }
    }

    pub fn info(&self, tables: usize) -> ConnectionInfo {
        ConnectionInfo {
            connected: true,
            engine: self.engine,
            host: Some(self.host.clone()),
            port: Some(self.port),
            database: Some(self.database.clone()),
            username: Some(self.username.clone()),
            connected_at: Some(self.connected_at),
            tables: Some(tables),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Payload of the `connection_info` tool.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub connected: bool,
    pub engine: DatabaseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<usize>,
}

impl ConnectionInfo {
    pub fn disconnected(engine: DatabaseType) -> Self {
        Self {
            connected: false,
            engine,
            host: None,
            port: None,
            database: None,
            username: None,
            connected_at: None,
            tables: None,
        }
    }
}

/// Opens connections for a session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, config: &DatabaseConfig) -> DbResult<Connection>;
}

/// Connector backed by the compiled-in drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector;

#[async_trait]
impl Connector for DriverConnector {
    async fn open(&self, config: &DatabaseConfig) -> DbResult<Connection> {
        info!(
            engine = %config.database_type,
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connecting"
        );
        let introspector = create_introspector(config).await?;
        Ok(Connection::new(introspector, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::FakeCatalog;

    fn config() -> DatabaseConfig {
        DatabaseConfig {
            database_type: DatabaseType::Mssql,
            host: "db.internal".into(),
            port: 1433,
            database: "RealEstate".into(),
            username: "reader".into(),
            password: "s3cret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_info_reports_settings_without_password() {
        let connection = Connection::new(Arc::new(FakeCatalog::new(DatabaseType::Mssql)), &config());
        let info = connection.info(4);

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"connected\":true"));
        assert!(json.contains("\"engine\":\"mssql\""));
        assert!(json.contains("\"tables\":4"));
        assert!(!json.contains("s3cret"));
    }

    #[test]
    fn test_disconnected_info_omits_settings() {
        let json = serde_json::to_value(ConnectionInfo::disconnected(DatabaseType::Postgres)).unwrap();
        assert_eq!(json["connected"], false);
        assert_eq!(json["engine"], "postgres");
        assert!(json.get("host").is_none());
    }

    #[test]
    fn test_debug_hides_introspector() {
        let connection = Connection::new(Arc::new(FakeCatalog::new(DatabaseType::Mssql)), &config());
        let debug = format!("{:?}", connection);
        assert!(debug.contains("db.internal"));
        assert!(!debug.contains("s3cret"));
    }
}
