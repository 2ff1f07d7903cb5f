use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::{
    ConnectRequest, ConnectResponse, ConnectionInfo, EngineKind, QueryAnswer, QueryRequest,
    SchemaSnapshot,
};
use crate::services::connection_registry::ConnectionRegistry;
use crate::services::database::AdapterFactory;
use crate::services::deadline::{Stage, StageTimeouts};
use crate::services::llm_service::TextGenerator;
use crate::services::query_executor::QueryExecutor;
use crate::services::schema_catalog::SchemaCatalog;
use crate::services::translation::TranslationPipeline;

/// Behaviour switches for [`DbService`]
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub timeouts: StageTimeouts,
    pub read_only: bool,
    pub summarize_on_connect: bool,
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeouts: StageTimeouts::from_config(&config.timeouts),
            read_only: config.query.read_only,
            summarize_on_connect: config.llm.summarize_on_connect,
        }
    }
}

/// Connect and query flows for tenants
pub struct DbService {
    registry: ConnectionRegistry,
    catalog: SchemaCatalog,
    pipeline: TranslationPipeline,
    executor: QueryExecutor,
    timeouts: StageTimeouts,
    summarize_on_connect: bool,
}

impl DbService {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        generator: Arc<dyn TextGenerator>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(factory),
            catalog: SchemaCatalog::new(),
            pipeline: TranslationPipeline::new(generator),
            executor: QueryExecutor::new(options.read_only),
            timeouts: options.timeouts,
            summarize_on_connect: options.summarize_on_connect,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Connect the tenant, capture the schema and describe it.
    /// The new connection replaces the previous one only after introspection
    /// succeeds; on any failure the tenant keeps what it had.
    pub async fn connect(
        &self,
        tenant: &str,
        request: ConnectRequest,
    ) -> Result<ConnectResponse, AppError> {
        let target = request.to_target()?;
        let timeouts = self.timeouts.with_override(request.timeout_secs);

        let connection = self
            .registry
            .open(tenant, &target, timeouts.for_stage(Stage::Connect))
            .await?;

        let snapshot = match SchemaCatalog::introspect(
            &connection,
            &target.database,
            timeouts.for_stage(Stage::Introspection),
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Introspection failed for tenant {}: {}", tenant, e);
                connection.close().await;
                return Err(e);
            }
        };

        let connection = Arc::new(connection);
        self.registry.install(tenant, connection.clone()).await;
        let snapshot = self.catalog.save(snapshot);

        let summary = if self.summarize_on_connect {
            match self
                .pipeline
                .summarize(&snapshot, timeouts.for_stage(Stage::Summary))
                .await
            {
                Ok(summary) if !summary.is_empty() => Some(summary),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Database summary unavailable for {}: {}", target.alias, e);
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            "Tenant {} connected to {} database '{}'",
            tenant,
            target.engine.display_name(),
            target.alias
        );

        Ok(ConnectResponse {
            connection: connection.info().clone(),
            summary,
            schema: (*snapshot).clone(),
        })
    }

    /// Translate the question and run the resulting SQL on the tenant's connection
    pub async fn query(&self, tenant: &str, request: QueryRequest) -> Result<QueryAnswer, AppError> {
        let question = request.query.trim();
        if question.is_empty() {
            return Err(AppError::Validation("Query cannot be empty".to_string()));
        }

        let connection = self.registry.get(tenant)?;
        let schema = self.catalog.get(connection.database()).ok_or_else(|| {
            AppError::NotConnected(format!(
                "schema for database {} is not loaded; connect first",
                connection.database()
            ))
        })?;

        let timeouts = self.timeouts.with_override(request.timeout_secs);
        let translation = self
            .pipeline
            .translate(question, &schema, connection.engine(), &timeouts)
            .await?;
        let result = self
            .executor
            .execute(&connection, &translation.sql, timeouts.for_stage(Stage::Execution))
            .await?;

        Ok(QueryAnswer {
            candidate_sql: translation.candidate_sql,
            result,
        })
    }

    pub async fn disconnect(&self, tenant: &str) -> bool {
        let removed = self.registry.disconnect(tenant).await;
        if removed {
            tracing::info!("Tenant {} disconnected", tenant);
        }
        removed
    }

    pub fn connection_info(&self, tenant: &str) -> Result<ConnectionInfo, AppError> {
        Ok(self.registry.get(tenant)?.info().clone())
    }

    /// Snapshot of the tenant's connected database, with the engine of the
    /// tenant's own connection
    pub fn schema(&self, tenant: &str) -> Result<(EngineKind, Arc<SchemaSnapshot>), AppError> {
        let connection = self.registry.get(tenant)?;
        let snapshot = self.catalog.get(connection.database()).ok_or_else(|| {
            AppError::NotConnected(format!(
                "schema for database {} is not loaded; connect first",
                connection.database()
            ))
        })?;
        Ok((connection.engine(), snapshot))
    }
}
