use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::config::TimeoutConfig;

/// Remote call sites that are bounded by a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Connect,
    Introspection,
    Generation,
    Verification,
    Summary,
    Execution,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Connect => "connect",
            Stage::Introspection => "introspection",
            Stage::Generation => "generation",
            Stage::Verification => "verification",
            Stage::Summary => "summary",
            Stage::Execution => "execution",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage limits for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub connect: Duration,
    pub introspection: Duration,
    pub generation: Duration,
    pub verification: Duration,
    pub execution: Duration,
}

impl StageTimeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            introspection: Duration::from_secs(config.introspection_secs),
            generation: Duration::from_secs(config.generation_secs),
            verification: Duration::from_secs(config.verification_secs),
            execution: Duration::from_secs(config.execution_secs),
        }
    }

    /// Same limit for every stage
    pub fn uniform(limit: Duration) -> Self {
        Self {
            connect: limit,
            introspection: limit,
            generation: limit,
            verification: limit,
            execution: limit,
        }
    }

    /// Apply a caller-supplied `timeoutSecs` to every stage
    pub fn with_override(self, timeout_secs: Option<u64>) -> Self {
        match timeout_secs {
            Some(secs) if secs > 0 => Self::uniform(Duration::from_secs(secs)),
            _ => self,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Connect => self.connect,
            Stage::Introspection => self.introspection,
            Stage::Generation | Stage::Summary => self.generation,
            Stage::Verification => self.verification,
            Stage::Execution => self.execution,
        }
    }
}

/// Run `fut`, abandoning it once `limit` elapses
pub async fn bounded<T, F>(stage: Stage, limit: Duration, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} abandoned after {:?}", stage, limit);
            Err(AppError::Timeout { stage, limit })
        }
    }
}
