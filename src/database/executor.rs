//! Validated, row-capped statement execution.

use crate::database::result::QueryResult;
use crate::database::traits::CatalogIntrospector;
use crate::error::{Result, ToolError};
use crate::security::SqlValidator;
use std::time::Instant;
use tracing::{debug, instrument};

/// Runs statements under the SELECT-only policy with a row cap.
///
/// Every statement, generated or caller-supplied, goes through
/// [`SqlValidator::validate_for`] before anything is sent to the engine.
#[derive(Debug, Clone, Default)]
pub struct SafeQueryExecutor {
    validator: SqlValidator,
}

impl SafeQueryExecutor {
    /// Validate `query`, run it and return at most `limit` rows.
    ///
    /// `limited` on the result is true exactly when `limit` rows came back.
    #[instrument(skip(self, introspector, query), fields(engine = %introspector.engine(), limit))]
    pub async fn execute(
        &self,
        introspector: &dyn CatalogIntrospector,
        query: &str,
        limit: usize,
    ) -> Result<QueryResult> {
        if limit == 0 {
            return Err(ToolError::InvalidArguments("limit must be at least 1".into()).into());
        }

        self.validator.validate_for(introspector.engine(), query)?;

        let sql = introspector.engine().with_row_cap(query.trim(), limit);
        let start = Instant::now();
        let rows = introspector.fetch(&sql, limit).await?;
        let result = QueryResult::capped(rows, limit);

        debug!(
            rows = result.row_count,
            limited = result.limited,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query completed"
        );
        Ok(result)
    }
}
