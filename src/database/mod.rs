//! Database access layer.
//!
//! Catalog introspection and bounded reads for the engines this server
//! speaks to, behind the [`CatalogIntrospector`] trait.
//!
//! # Feature Flags
//!
//! - `mssql` - Enable Microsoft SQL Server support (enabled by default)
//! - `postgres` - Enable PostgreSQL support (enabled by default)
//!
//! # Example
//!
//! ```toml
//! # Cargo.toml - Use only PostgreSQL
//! [dependencies]
//! schema-discovery-mcp = { version = "0.1", default-features = false, features = ["postgres"] }
//! ```

pub mod connection;
pub mod dialect;
pub mod executor;
#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod result;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;

pub use connection::{Connection, ConnectionInfo, Connector, DriverConnector};
pub use executor::SafeQueryExecutor;
#[cfg(feature = "mssql")]
pub use mssql::MssqlIntrospector;
#[cfg(feature = "postgres")]
pub use postgres::PostgresIntrospector;
pub use result::*;
pub use traits::CatalogIntrospector;

use crate::config::{DatabaseConfig, DatabaseType};
#[cfg(not(all(feature = "mssql", feature = "postgres")))]
use crate::error::DatabaseError;
use crate::error::DbResult;
use std::sync::Arc;

/// Open a live introspector for `config`.
///
/// # Errors
///
/// Returns [`DatabaseError::UnsupportedType`] if the requested engine is not
/// enabled via feature flags, otherwise whatever the driver reports while
/// opening the connection.
pub async fn create_introspector(config: &DatabaseConfig) -> DbResult<Arc<dyn CatalogIntrospector>> {
    match config.database_type {
        #[cfg(feature = "mssql")]
        DatabaseType::Mssql => Ok(Arc::new(MssqlIntrospector::connect(config).await?)),
        #[cfg(not(feature = "mssql"))]
        DatabaseType::Mssql => Err(DatabaseError::UnsupportedType(
            "MSSQL support not enabled. Enable the 'mssql' feature.".to_string(),
        )),

        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => Ok(Arc::new(PostgresIntrospector::connect(config).await?)),
        #[cfg(not(feature = "postgres"))]
        DatabaseType::Postgres => Err(DatabaseError::UnsupportedType(
            "PostgreSQL support not enabled. Enable the 'postgres' feature.".to_string(),
        )),
    }
}
