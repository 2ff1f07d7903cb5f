use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::models::SchemaSnapshot;
use crate::services::connection_registry::Connection;
use crate::services::deadline::{bounded, Stage};

/// Schema snapshots keyed by database name
#[derive(Default)]
pub struct SchemaCatalog {
    snapshots: RwLock<HashMap<String, Arc<SchemaSnapshot>>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture tables, columns and foreign keys of `database` in one pass.
    /// Any failing catalog query fails the whole pass.
    pub async fn introspect(
        connection: &Connection,
        database: &str,
        limit: Duration,
    ) -> Result<SchemaSnapshot, AppError> {
        let engine = connection.engine();

        bounded(Stage::Introspection, limit, async {
            let adapter = connection.lease().await?;

            let tables = adapter
                .fetch_tables(database)
                .await
                .map_err(|e| introspection_error("tables", e))?;
            let columns = adapter
                .fetch_columns(database)
                .await
                .map_err(|e| introspection_error("columns", e))?;
            let foreign_keys = adapter
                .fetch_foreign_keys(database)
                .await
                .map_err(|e| introspection_error("foreign keys", e))?;

            if !tables.is_empty() && columns.is_empty() {
                return Err(AppError::IntrospectionFailed(format!(
                    "found {} tables in {} but no columns; check the user's privileges",
                    tables.len(),
                    database
                )));
            }

            tracing::info!(
                "Introspected {} database {}: {} tables, {} columns, {} foreign keys",
                engine.display_name(),
                database,
                tables.len(),
                columns.len(),
                foreign_keys.len()
            );

            Ok(SchemaSnapshot::new(
                database.to_string(),
                engine,
                tables,
                columns,
                foreign_keys,
            ))
        })
        .await
    }

    /// Store a snapshot, replacing any earlier one for the same database
    pub fn save(&self, snapshot: SchemaSnapshot) -> Arc<SchemaSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.database_name.clone(), snapshot.clone());
        snapshot
    }

    pub fn get(&self, database: &str) -> Option<Arc<SchemaSnapshot>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(database)
            .cloned()
    }

    pub fn remove(&self, database: &str) -> Option<Arc<SchemaSnapshot>> {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(database)
    }
}

fn introspection_error(query: &str, err: AppError) -> AppError {
    match err {
        AppError::Database(message) | AppError::Connection(message) => {
            AppError::IntrospectionFailed(format!("{} query failed: {}", query, message))
        }
        other => other,
    }
}
