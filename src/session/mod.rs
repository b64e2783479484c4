//! Per-session connection and schema snapshot.
//!
//! A [`DiscoverySession`] owns at most one live [`Connection`] and the
//! [`SchemaSnapshot`] discovered through it. Both are replaced together by
//! the next successful [`connect`](DiscoverySession::connect) and never
//! patched in place.

use crate::config::{DatabaseConfig, DatabaseType, QueryConfig};
use crate::database::{
    Connection, ConnectionInfo, Connector, DriverConnector, QueryResult, SafeQueryExecutor, TableName,
};
use crate::discovery::{RelationshipReport, SchemaSnapshot, TableDescriptor, analyze, discover};
use crate::error::{DatabaseError, DbResult, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// A connection together with the snapshot discovered through it.
#[derive(Debug)]
pub struct SessionState {
    pub connection: Connection,
    pub snapshot: Arc<SchemaSnapshot>,
}

/// Payload returned by a successful connect.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectSummary {
    pub success: bool,
    pub message: String,
    pub tables_discovered: usize,
    pub engine: DatabaseType,
    pub discovered_at: DateTime<Utc>,
}

/// Connection and snapshot owned by one logical session.
pub struct DiscoverySession {
    engine: DatabaseType,
    query: QueryConfig,
    executor: SafeQueryExecutor,
    connector: Arc<dyn Connector>,
    state: RwLock<Option<Arc<SessionState>>>,
}

impl DiscoverySession {
    /// Session that opens connections through the compiled-in drivers.
    pub fn new(engine: DatabaseType, query: QueryConfig) -> Self {
        Self::with_connector(engine, query, Arc::new(DriverConnector))
    }

    pub fn with_connector(engine: DatabaseType, query: QueryConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            engine,
            query,
            executor: SafeQueryExecutor::default(),
            connector,
            state: RwLock::new(None),
        }
    }

    pub fn engine(&self) -> DatabaseType {
        self.engine
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().is_some()
    }

    /// Open a connection and discover its schema.
    ///
    /// A failed open leaves the previous connection in place. Once the new
    /// connection is open the previous pair is dropped; the new pair becomes
    /// visible only when discovery succeeds.
    #[instrument(skip(self, config), fields(engine = %config.database_type, host = %config.host, database = %config.database))]
    pub async fn connect(&self, config: &DatabaseConfig) -> DbResult<ConnectSummary> {
        let connection = self.connector.open(config).await?;

        if self.state.write().take().is_some() {
            info!("Replaced previous connection");
        }

        let snapshot = discover(connection.introspector.as_ref()).await?;
        let summary = ConnectSummary {
            success: true,
            message: format!("Connected to {}/{}", connection.host, connection.database),
            tables_discovered: snapshot.table_count(),
            engine: connection.engine,
            discovered_at: snapshot.discovered_at,
        };

        *self.state.write() = Some(Arc::new(SessionState {
            connection,
            snapshot: Arc::new(snapshot),
        }));

        info!(tables = summary.tables_discovered, "Connected");
        Ok(summary)
    }

    fn current(&self) -> Option<Arc<SessionState>> {
        self.state.read().clone()
    }

    fn connected(&self) -> DbResult<Arc<SessionState>> {
        self.current().ok_or(DatabaseError::NotConnected)
    }

    fn discovered(&self) -> DbResult<Arc<SessionState>> {
        self.current().ok_or(DatabaseError::SchemaNotDiscovered)
    }

    /// The current snapshot.
    pub fn schema(&self) -> DbResult<Arc<SchemaSnapshot>> {
        Ok(Arc::clone(&self.discovered()?.snapshot))
    }

    /// Run a caller-supplied statement under the SELECT-only policy.
    pub async fn execute(&self, query: &str, limit: Option<usize>) -> Result<QueryResult> {
        let state = self.connected()?;
        let limit = limit.unwrap_or(self.query.default_limit);
        self.executor
            .execute(state.connection.introspector.as_ref(), query, limit)
            .await
    }

    pub fn analyze_relationships(&self) -> DbResult<RelationshipReport> {
        Ok(analyze(&self.discovered()?.snapshot))
    }

    /// First `limit` rows of a table.
    ///
    /// The table does not have to be in the snapshot; views and tables
    /// created after discovery can be previewed too.
    pub async fn preview(&self, table: &str, limit: Option<usize>) -> Result<QueryResult> {
        let state = self.connected()?;
        let limit = limit.unwrap_or(self.query.preview_limit);
        let table = self.resolve(&state.snapshot, table)?;

        let sql = self.engine.preview_sql(&table, limit);
        self.executor
            .execute(state.connection.introspector.as_ref(), &sql, limit)
            .await
    }

    /// Rows where any of the searched columns contains `term`, case-insensitively.
    ///
    /// Without explicit `columns`, every text column of the table is searched,
    /// which requires the table to be in the snapshot.
    pub async fn search(&self, table: &str, term: &str, columns: Option<&[String]>) -> Result<QueryResult> {
        let state = self.discovered()?;
        let reference = self.engine.parse_table_ref(table)?;
        let descriptor = state.snapshot.find(&reference);

        let columns = match columns.filter(|c| !c.is_empty()) {
            Some(requested) => requested
                .iter()
                .map(|name| canonical_column(descriptor, name))
                .collect::<Vec<_>>(),
            None => {
                let descriptor = descriptor.ok_or_else(|| DatabaseError::TableNotFound(reference.to_string()))?;
                let text: Vec<String> = descriptor
                    .columns
                    .iter()
                    .filter(|c| self.engine.is_text_type(&c.data_type))
                    .map(|c| c.name.clone())
                    .collect();
                if text.is_empty() {
                    return Err(DatabaseError::NoTextColumns(descriptor.full_name.clone()).into());
                }
                text
            }
        };

        let table = descriptor.map(TableDescriptor::table_name).unwrap_or(reference);
        let limit = self.query.search_limit;
        let sql = self.engine.search_sql(&table, &columns, term, limit);
        self.executor
            .execute(state.connection.introspector.as_ref(), &sql, limit)
            .await
    }

    /// Descriptor of one discovered table.
    pub fn table_info(&self, table: &str) -> DbResult<TableDescriptor> {
        let state = self.discovered()?;
        let reference = self.engine.parse_table_ref(table)?;
        state
            .snapshot
            .find(&reference)
            .cloned()
            .ok_or_else(|| DatabaseError::TableNotFound(reference.to_string()))
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        match self.current() {
            Some(state) => state.connection.info(state.snapshot.table_count()),
            None => ConnectionInfo::disconnected(self.engine),
        }
    }

    /// Parse a table reference and prefer the snapshot's spelling of it.
    fn resolve(&self, snapshot: &SchemaSnapshot, table: &str) -> DbResult<TableName> {
        let reference = self.engine.parse_table_ref(table)?;
        Ok(snapshot
            .find(&reference)
            .map(TableDescriptor::table_name)
            .unwrap_or(reference))
    }
}

fn canonical_column(descriptor: Option<&TableDescriptor>, name: &str) -> String {
    descriptor
        .and_then(|d| {
            d.column(name)
                .or_else(|| d.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
        })
        .map(|c| c.name.clone())
        .unwrap_or_else(|| name.to_string())
}
