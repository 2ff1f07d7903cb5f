// Database abstraction layer for multi-engine support
pub mod adapter;
pub mod mssql;
pub mod mysql;
pub mod pg_types;
pub mod postgresql;

pub use adapter::{AdapterFactory, DatabaseAdapter};
pub use mssql::MssqlAdapter;
pub use mysql::MySQLAdapter;
pub use postgresql::PostgreSQLAdapter;

use crate::api::middleware::AppError;
use crate::models::{DatabaseTarget, EngineKind};

/// Maximum pooled connections per tenant for pooled engines
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Create the adapter matching the target's engine
pub async fn create_adapter(target: &DatabaseTarget) -> Result<Box<dyn DatabaseAdapter>, AppError> {
    match target.engine {
        EngineKind::MySql => Ok(Box::new(MySQLAdapter::new(target, DEFAULT_POOL_SIZE))),
        EngineKind::Postgres => Ok(Box::new(PostgreSQLAdapter::new(target, DEFAULT_POOL_SIZE)?)),
        EngineKind::MsSql => Ok(Box::new(MssqlAdapter::connect(target).await?)),
    }
}

/// Factory backed by the real drivers
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineAdapterFactory;

#[async_trait::async_trait]
impl AdapterFactory for EngineAdapterFactory {
    async fn open(&self, target: &DatabaseTarget) -> Result<Box<dyn DatabaseAdapter>, AppError> {
        create_adapter(target).await
    }
}

/// Wrap a driver connect failure with the engine name, without leaking credentials
pub(crate) fn connect_error(engine: EngineKind, err: impl std::fmt::Display) -> AppError {
    AppError::Connection(format!("{} connection failed: {}", engine.display_name(), err))
}
