use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::{RwLock as GateLock, RwLockReadGuard as GateReadGuard};

use crate::api::middleware::AppError;
use crate::models::{ConnectionInfo, DatabaseTarget, EngineKind, RawRows};
use crate::services::database::{AdapterFactory, DatabaseAdapter};
use crate::services::deadline::{bounded, Stage};

/// A tenant's live database connection.
///
/// Every use of the adapter goes through a [`ConnectionLease`], which holds the
/// read side of `gate`. Teardown takes the write side, so it waits for in-flight
/// work to finish and nothing starts on the adapter once it is closed.
pub struct Connection {
    info: ConnectionInfo,
    adapter: Box<dyn DatabaseAdapter>,
    gate: GateLock<()>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(info: ConnectionInfo, adapter: Box<dyn DatabaseAdapter>) -> Self {
        Self {
            info,
            adapter,
            gate: GateLock::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn engine(&self) -> EngineKind {
        self.info.engine
    }

    pub fn database(&self) -> &str {
        &self.info.database
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Borrow the adapter for one unit of work
    pub async fn lease(&self) -> Result<ConnectionLease<'_>, AppError> {
        let guard = self.gate.read().await;
        if self.is_closed() {
            return Err(AppError::NotConnected(format!(
                "connection for tenant {} was closed",
                self.info.tenant_id
            )));
        }
        Ok(ConnectionLease {
            _guard: guard,
            adapter: self.adapter.as_ref(),
        })
    }

    pub async fn execute_raw(&self, sql: &str) -> Result<RawRows, AppError> {
        self.lease().await?.execute_raw(sql).await
    }

    /// Wait for leases to drain, then release the driver handle. Safe to call twice.
    pub async fn close(&self) {
        let _gate = self.gate.write().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.adapter.close().await;
        tracing::info!(
            "Closed {} connection '{}' for tenant {}",
            self.info.engine.display_name(),
            self.info.alias,
            self.info.tenant_id
        );
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Shared access to a connection's adapter; teardown waits until it is dropped
pub struct ConnectionLease<'a> {
    _guard: GateReadGuard<'a, ()>,
    adapter: &'a (dyn DatabaseAdapter + 'static),
}

impl Deref for ConnectionLease<'_> {
    type Target = dyn DatabaseAdapter;

    fn deref(&self) -> &Self::Target {
        self.adapter
    }
}

/// Live connections keyed by tenant, one per tenant
pub struct ConnectionRegistry {
    factory: Arc<dyn AdapterFactory>,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new(factory: Arc<dyn AdapterFactory>) -> Self {
        Self {
            factory,
            connections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Connection>>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a connection for `tenant`, replacing and closing any previous one.
    /// The previous connection stays in place if opening fails.
    pub async fn connect(
        &self,
        tenant: &str,
        target: &DatabaseTarget,
        limit: Duration,
    ) -> Result<Arc<Connection>, AppError> {
        let connection = Arc::new(self.open(tenant, target, limit).await?);
        self.install(tenant, connection.clone()).await;
        Ok(connection)
    }

    /// Open and test a connection without registering it
    pub async fn open(
        &self,
        tenant: &str,
        target: &DatabaseTarget,
        limit: Duration,
    ) -> Result<Connection, AppError> {
        tracing::info!(
            "Opening {} connection '{}' (database: {}) for tenant {}",
            target.engine.display_name(),
            target.alias,
            target.database,
            tenant
        );

        let adapter = bounded(Stage::Connect, limit, async {
            let adapter = self.factory.open(target).await?;
            if let Err(e) = adapter.test_connection().await {
                adapter.close().await;
                return Err(e);
            }
            Ok(adapter)
        })
        .await
        .inspect_err(|e| tracing::warn!("Connect failed for tenant {}: {}", tenant, e))?;

        Ok(Connection::new(ConnectionInfo::new(tenant, target), adapter))
    }

    /// Make `connection` the tenant's active connection and close the one it replaces
    pub async fn install(&self, tenant: &str, connection: Arc<Connection>) {
        let previous = self.write().insert(tenant.to_string(), connection);

        if let Some(previous) = previous {
            tracing::info!("Replacing existing connection for tenant {}", tenant);
            previous.close().await;
        }
    }

    /// Active connection for `tenant`
    pub fn get(&self, tenant: &str) -> Result<Arc<Connection>, AppError> {
        self.read().get(tenant).cloned().ok_or_else(|| {
            AppError::NotConnected(format!("no active database connection for tenant {}", tenant))
        })
    }

    /// Remove and close the tenant's connection. Returns false when there was none.
    pub async fn disconnect(&self, tenant: &str) -> bool {
        let removed = self.write().remove(tenant);
        match removed {
            Some(connection) => {
                connection.close().await;
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<_> = self.read().values().map(|c| c.info().clone()).collect();
        infos.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        infos
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Close every connection
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.write().drain().map(|(_, c)| c).collect();
        if drained.is_empty() {
            return;
        }
        tracing::info!("Closing {} database connection(s)", drained.len());
        futures::future::join_all(drained.iter().map(|c| c.close())).await;
    }
}
