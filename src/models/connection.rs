use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::api::middleware::AppError;

/// Database engines the assistant can connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    MySql,
    Postgres,
    MsSql,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::MySql => "mysql",
            EngineKind::Postgres => "postgres",
            EngineKind::MsSql => "mssql",
        }
    }

    /// Human readable product name, used in prompts and error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            EngineKind::MySql => "MySQL",
            EngineKind::Postgres => "PostgreSQL",
            EngineKind::MsSql => "SQL Server",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            EngineKind::MySql => 3306,
            EngineKind::Postgres => 5432,
            EngineKind::MsSql => 1433,
        }
    }
}

impl FromStr for EngineKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(EngineKind::MySql),
            "postgres" | "postgresql" => Ok(EngineKind::Postgres),
            "mssql" | "sqlserver" => Ok(EngineKind::MsSql),
            _ => Err(AppError::UnsupportedEngine(format!(
                "{}. Supported types: mysql, postgres, mssql",
                s
            ))),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login for a target database. The password never shows up in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One connectable database, built from the connect request
#[derive(Debug, Clone)]
pub struct DatabaseTarget {
    pub engine: EngineKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub credentials: Credentials,
    pub alias: String,
}

/// Public view of a live connection (no credentials)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub tenant_id: String,
    pub engine: EngineKind,
    pub alias: String,
    pub database: String,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(tenant_id: &str, target: &DatabaseTarget) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            engine: target.engine,
            alias: target.alias.clone(),
            database: target.database.clone(),
            connected_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(rename = "type", alias = "engine")]
    pub engine: String,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub alias: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ConnectRequest {
    /// Validate the request and turn it into a target.
    /// The engine kind is checked first so unsupported engines never reach a driver.
    pub fn to_target(&self) -> Result<DatabaseTarget, AppError> {
        let engine: EngineKind = self.engine.parse()?;

        let host = self.host.trim();
        if host.is_empty() {
            return Err(AppError::Validation("Host cannot be empty".to_string()));
        }

        let database = self.database.trim();
        if database.is_empty() {
            return Err(AppError::Validation("Database name cannot be empty".to_string()));
        }

        if self.username.trim().is_empty() {
            return Err(AppError::Validation("Username cannot be empty".to_string()));
        }

        let alias = self
            .alias
            .as_deref()
            .map(str::trim)
            .filter(|alias| !alias.is_empty())
            .unwrap_or(database)
            .to_string();

        Ok(DatabaseTarget {
            engine,
            host: host.to_string(),
            port: self.port.unwrap_or_else(|| engine.default_port()),
            database: database.to_string(),
            credentials: Credentials {
                username: self.username.trim().to_string(),
                password: self.password.clone(),
            },
            alias,
        })
    }
}
