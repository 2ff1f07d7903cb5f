// Database adapter trait for multi-engine support
use crate::api::middleware::AppError;
use crate::models::{ColumnInfo, DatabaseTarget, EngineKind, ForeignKey, RawRows};

/// Engine-specific connection handle.
///
/// Failures from `execute_raw` and the catalog queries come back as
/// `AppError::Database` carrying the engine's message untouched; callers
/// decide how to classify them.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Engine this adapter talks to
    fn engine(&self) -> EngineKind;

    /// Cheap round trip proving the credentials and network path work
    async fn test_connection(&self) -> Result<(), AppError>;

    /// Send `sql` as-is and collect the first result set
    async fn execute_raw(&self, sql: &str) -> Result<RawRows, AppError>;

    /// Table (and view) names in `database`
    async fn fetch_tables(&self, database: &str) -> Result<Vec<String>, AppError>;

    /// Columns of every table in `database`, ordered by table then position
    async fn fetch_columns(&self, database: &str) -> Result<Vec<ColumnInfo>, AppError>;

    /// Single-column foreign key references in `database`
    async fn fetch_foreign_keys(&self, database: &str) -> Result<Vec<ForeignKey>, AppError>;

    /// Release pooled or open connections
    async fn close(&self);
}

/// Opens adapters for connect requests
#[async_trait::async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn open(&self, target: &DatabaseTarget) -> Result<Box<dyn DatabaseAdapter>, AppError>;
}
