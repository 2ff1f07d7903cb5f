// In-memory stand-ins for drivers and the model gateway, used by unit tests
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::models::{ColumnInfo, DatabaseTarget, EngineKind, ForeignKey, RawRows, Record};
use crate::services::database::{AdapterFactory, DatabaseAdapter};
use crate::services::llm_service::TextGenerator;

/// What a mock adapter answers with
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    pub tables: Vec<String>,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
    pub rows: RawRows,
    pub connect_error: Option<String>,
    /// Stall inside `test_connection`, for connect timeouts
    pub connect_delay: Option<Duration>,
    pub execute_error: Option<String>,
    /// Which catalog query fails: "tables", "columns" or "foreign_keys"
    pub failing_catalog_query: Option<&'static str>,
    pub execute_delay: Option<Duration>,
    pub catalog_delay: Option<Duration>,
}

impl MockScript {
    /// `Orders` / `Customer` schema with one foreign key
    pub fn shop() -> Self {
        let column = |table: &str, column: &str, data_type: &str, is_key: bool| ColumnInfo {
            table: table.to_string(),
            column: column.to_string(),
            data_type: data_type.to_string(),
            nullable: !is_key,
            is_key,
        };

        let mut row = Record::new();
        row.insert("OrderId".to_string(), serde_json::json!(1));

        Self {
            tables: vec!["Customer".to_string(), "Orders".to_string()],
            columns: vec![
                column("Customer", "ID", "int", true),
                column("Customer", "FullName", "varchar", false),
                column("Orders", "OrderId", "int", true),
                column("Orders", "CustomerId", "int", false),
            ],
            foreign_keys: vec![ForeignKey {
                table: "Orders".to_string(),
                column: "CustomerId".to_string(),
                ref_table: "Customer".to_string(),
                ref_column: "ID".to_string(),
            }],
            rows: RawRows {
                columns: vec!["OrderId".to_string()],
                rows: vec![row],
            },
            ..Default::default()
        }
    }
}

/// Observations shared between a test and the adapter it drives
#[derive(Debug, Default)]
pub struct AdapterProbe {
    events: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl AdapterProbe {
    fn record(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("execute:").map(str::to_string))
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}

pub struct MockAdapter {
    engine: EngineKind,
    script: MockScript,
    probe: Arc<AdapterProbe>,
}

impl MockAdapter {
    pub fn new(engine: EngineKind, script: MockScript) -> (Self, Arc<AdapterProbe>) {
        let probe = Arc::new(AdapterProbe::default());
        let adapter = Self {
            engine,
            script,
            probe: probe.clone(),
        };
        (adapter, probe)
    }

    async fn catalog<T: Clone>(&self, query: &'static str, data: &[T]) -> Result<Vec<T>, AppError> {
        if let Some(delay) = self.script.catalog_delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.failing_catalog_query == Some(query) {
            return Err(AppError::Database(format!("permission denied for {}", query)));
        }
        Ok(data.to_vec())
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MockAdapter {
    fn engine(&self) -> EngineKind {
        self.engine
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        if let Some(delay) = self.script.connect_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script.connect_error {
            Some(message) => Err(AppError::Connection(message.clone())),
            None => Ok(()),
        }
    }

    async fn execute_raw(&self, sql: &str) -> Result<RawRows, AppError> {
        self.probe.record(format!("execute:{}", sql));
        if let Some(delay) = self.script.execute_delay {
            tokio::time::sleep(delay).await;
        }
        self.probe.record("finished");
        match &self.script.execute_error {
            Some(message) => Err(AppError::Database(message.clone())),
            None => Ok(self.script.rows.clone()),
        }
    }

    async fn fetch_tables(&self, _database: &str) -> Result<Vec<String>, AppError> {
        self.catalog("tables", &self.script.tables).await
    }

    async fn fetch_columns(&self, _database: &str) -> Result<Vec<ColumnInfo>, AppError> {
        self.catalog("columns", &self.script.columns).await
    }

    async fn fetch_foreign_keys(&self, _database: &str) -> Result<Vec<ForeignKey>, AppError> {
        self.catalog("foreign_keys", &self.script.foreign_keys).await
    }

    async fn close(&self) {
        self.probe.record("close");
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out mock adapters and remembers every one it opened
#[derive(Default)]
pub struct MockFactory {
    script: Mutex<MockScript>,
    opened: Mutex<Vec<(EngineKind, Arc<AdapterProbe>)>>,
}

impl MockFactory {
    pub fn new(script: MockScript) -> Self {
        Self {
            script: Mutex::new(script),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Script used for adapters opened from now on
    pub fn set_script(&self, script: MockScript) {
        *self.script.lock().unwrap_or_else(|e| e.into_inner()) = script;
    }

    pub fn opened_engines(&self) -> Vec<EngineKind> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(engine, _)| *engine)
            .collect()
    }

    pub fn probe(&self, index: usize) -> Arc<AdapterProbe> {
        self.opened.lock().unwrap_or_else(|e| e.into_inner())[index].1.clone()
    }

    pub fn last_probe(&self) -> Arc<AdapterProbe> {
        let opened = self.opened.lock().unwrap_or_else(|e| e.into_inner());
        opened[opened.len() - 1].1.clone()
    }
}

#[async_trait::async_trait]
impl AdapterFactory for MockFactory {
    async fn open(&self, target: &DatabaseTarget) -> Result<Box<dyn DatabaseAdapter>, AppError> {
        let script = self.script.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let (adapter, probe) = MockAdapter::new(target.engine, script);
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((target.engine, probe));
        Ok(Box::new(adapter))
    }
}

/// Text generator answering from a queue of canned responses
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, AppError>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
    call_delays: Mutex<VecDeque<Duration>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Default::default()
        }
    }

    pub fn failing(error: AppError) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(error)])),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay for each call in turn; calls past the list fall back to `with_delay`
    pub fn with_call_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        *self.call_delays.lock().unwrap_or_else(|e| e.into_inner()) = delays.into_iter().collect();
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        let delay = self
            .call_delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .or(self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(AppError::GenerationService("no scripted response left".to_string())))
    }
}

pub fn target(engine: EngineKind, database: &str) -> DatabaseTarget {
    DatabaseTarget {
        engine,
        host: "db.test".to_string(),
        port: engine.default_port(),
        database: database.to_string(),
        credentials: crate::models::Credentials {
            username: "app".to_string(),
            password: "secret".to_string(),
        },
        alias: database.to_string(),
    }
}
