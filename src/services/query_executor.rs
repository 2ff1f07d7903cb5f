use std::time::{Duration, Instant};

use crate::api::middleware::AppError;
use crate::models::QueryResult;
use crate::services::connection_registry::Connection;
use crate::services::deadline::{bounded, Stage};
use crate::validation::SqlValidator;

/// Runs verified SQL on a tenant's connection
pub struct QueryExecutor {
    read_only: bool,
}

impl QueryExecutor {
    pub fn new(read_only: bool) -> Self {
        Self { read_only }
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Execute `sql` as-is. Engine failures come back as `Execution` with the
    /// engine's message untouched and the statement attached.
    pub async fn execute(
        &self,
        connection: &Connection,
        sql: &str,
        limit: Duration,
    ) -> Result<QueryResult, AppError> {
        if self.read_only {
            SqlValidator::validate_read_only(sql, connection.engine())?;
        }

        let start_time = Instant::now();
        let raw = bounded(Stage::Execution, limit, connection.execute_raw(sql))
            .await
            .map_err(|e| match e {
                AppError::Database(cause) | AppError::Connection(cause) => AppError::Execution {
                    sql: sql.to_string(),
                    cause,
                },
                other => other,
            })?;

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            "Query on {} returned {} rows in {} ms",
            connection.database(),
            raw.rows.len(),
            execution_time_ms
        );

        Ok(QueryResult::new(sql, raw, execution_time_ms))
    }
}
