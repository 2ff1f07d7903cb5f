pub mod connection_registry;
pub mod database; // Engine adapters: MySQL, PostgreSQL, SQL Server
pub mod db_service;
pub mod deadline;
pub mod llm_service;
pub mod prompt_formatter;
pub mod query_executor;
pub mod schema_catalog;
pub mod translation;

#[cfg(test)]
pub(crate) mod testing;

pub use connection_registry::*;
pub use db_service::*;
pub use deadline::*;
pub use llm_service::*;
pub use prompt_formatter::*;
pub use query_executor::*;
pub use schema_catalog::*;
pub use translation::*;
