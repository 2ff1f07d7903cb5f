// SQL Server adapter over a single TDS connection.
// The client needs `&mut` access, so calls from one tenant are serialized by the mutex.
// Each call checks the client out of its slot; a call abandoned on timeout drops the
// client with it, which ends the server-side request, and the next call reconnects.
use crate::api::middleware::AppError;
use crate::models::{ColumnInfo, DatabaseTarget, EngineKind, ForeignKey, RawRows, Record};
use crate::services::database::adapter::DatabaseAdapter;
use crate::services::database::connect_error;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, Row, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type MssqlClient = Client<Compat<TcpStream>>;

pub struct MssqlAdapter {
    config: Config,
    client: Mutex<Option<MssqlClient>>,
    closed: AtomicBool,
}

impl MssqlAdapter {
    pub async fn connect(target: &DatabaseTarget) -> Result<Self, AppError> {
        let mut config = Config::new();
        config.host(&target.host);
        config.port(target.port);
        config.database(&target.database);
        config.authentication(AuthMethod::sql_server(
            &target.credentials.username,
            &target.credentials.password,
        ));
        config.trust_cert();

        let client = open_client(&config).await?;

        Ok(Self {
            config,
            client: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
        })
    }

    /// Take the client out of `slot`, reopening it if an abandoned call dropped it
    async fn checkout(&self, slot: &mut Option<MssqlClient>) -> Result<MssqlClient, AppError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed());
        }
        match slot.take() {
            Some(client) => Ok(client),
            None => {
                tracing::info!("Reopening SQL Server connection");
                open_client(&self.config).await
            }
        }
    }

    /// Run a parameterized catalog query and return its first result set
    async fn catalog_query(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, AppError> {
        let mut slot = self.client.lock().await;
        let mut client = self.checkout(&mut slot).await?;
        let rows = first_result(&mut client, sql, params).await;
        *slot = Some(client);
        rows
    }
}

async fn open_client(config: &Config) -> Result<MssqlClient, AppError> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| connect_error(EngineKind::MsSql, e))?;
    tcp.set_nodelay(true)
        .map_err(|e| connect_error(EngineKind::MsSql, e))?;

    Client::connect(config.clone(), tcp.compat_write())
        .await
        .map_err(|e| connect_error(EngineKind::MsSql, e))
}

async fn first_result(
    client: &mut MssqlClient,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Row>, AppError> {
    let stream = client
        .query(sql, params)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    let rows = stream
        .into_first_result()
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    Ok(rows)
}

async fn ping(client: &mut MssqlClient) -> Result<(), AppError> {
    let stream = client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| connect_error(EngineKind::MsSql, e))?;
    stream
        .into_results()
        .await
        .map_err(|e| connect_error(EngineKind::MsSql, e))?;
    Ok(())
}

async fn run_batch(client: &mut MssqlClient, sql: &str) -> Result<RawRows, AppError> {
    let mut stream = client
        .simple_query(sql)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    let columns: Vec<String> = stream
        .columns()
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let rows = stream
        .into_first_result()
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    let records = rows
        .into_iter()
        .map(|row| {
            let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
            let mut record = Record::new();
            for (name, data) in names.into_iter().zip(row.into_iter()) {
                record.insert(name, mssql_value_to_json(&data));
            }
            record
        })
        .collect();

    Ok(RawRows {
        columns,
        rows: records,
    })
}

fn closed() -> AppError {
    AppError::Database("SQL Server connection is closed".to_string())
}

fn text(row: &Row, idx: usize) -> Result<String, AppError> {
    row.try_get::<&str, _>(idx)
        .map(|v| v.unwrap_or_default().to_string())
        .map_err(|e| AppError::Database(e.to_string()))
}

fn flag(row: &Row, idx: usize) -> Result<bool, AppError> {
    row.try_get::<bool, _>(idx)
        .map(|v| v.unwrap_or(false))
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Schema-qualified table name, bare for `dbo`
fn qualified(schema_col: &str, table_col: &str) -> String {
    format!(
        "CASE WHEN {s} = 'dbo' THEN {t} ELSE {s} + '.' + {t} END",
        s = schema_col,
        t = table_col
    )
}

#[async_trait::async_trait]
impl DatabaseAdapter for MssqlAdapter {
    fn engine(&self) -> EngineKind {
        EngineKind::MsSql
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        let mut slot = self.client.lock().await;
        let mut client = self.checkout(&mut slot).await?;
        let result = ping(&mut client).await;
        *slot = Some(client);
        result
    }

    async fn execute_raw(&self, sql: &str) -> Result<RawRows, AppError> {
        let mut slot = self.client.lock().await;
        let mut client = self.checkout(&mut slot).await?;
        let result = run_batch(&mut client, sql).await;
        *slot = Some(client);
        result
    }

    async fn fetch_tables(&self, database: &str) -> Result<Vec<String>, AppError> {
        let sql = format!(
            "SELECT {name} FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_CATALOG = @P1 \
             ORDER BY TABLE_SCHEMA, TABLE_NAME",
            name = qualified("TABLE_SCHEMA", "TABLE_NAME"),
        );
        let rows = self.catalog_query(&sql, &[&database]).await?;
        rows.iter().map(|row| text(row, 0)).collect()
    }

    async fn fetch_columns(&self, database: &str) -> Result<Vec<ColumnInfo>, AppError> {
        let sql = format!(
            r#"
            SELECT
                {name},
                c.COLUMN_NAME,
                c.DATA_TYPE,
                c.IS_NULLABLE,
                CAST(CASE WHEN EXISTS (
                    SELECT 1
                    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
                        ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
                        AND tc.TABLE_SCHEMA = ku.TABLE_SCHEMA
                    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
                        AND ku.TABLE_SCHEMA = c.TABLE_SCHEMA
                        AND ku.TABLE_NAME = c.TABLE_NAME
                        AND ku.COLUMN_NAME = c.COLUMN_NAME
                ) THEN 1 ELSE 0 END AS BIT)
            FROM INFORMATION_SCHEMA.COLUMNS c
            WHERE c.TABLE_CATALOG = @P1
            ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
            "#,
            name = qualified("c.TABLE_SCHEMA", "c.TABLE_NAME"),
        );
        let rows = self.catalog_query(&sql, &[&database]).await?;

        rows.iter()
            .map(|row| {
                Ok(ColumnInfo {
                    table: text(row, 0)?,
                    column: text(row, 1)?,
                    data_type: text(row, 2)?,
                    nullable: text(row, 3)? == "YES",
                    is_key: flag(row, 4)?,
                })
            })
            .collect()
    }

    async fn fetch_foreign_keys(&self, database: &str) -> Result<Vec<ForeignKey>, AppError> {
        let sql = format!(
            r#"
            SELECT
                {from_table},
                pc.name,
                {to_table},
                rc.name
            FROM sys.foreign_key_columns fkc
            JOIN sys.tables pt ON pt.object_id = fkc.parent_object_id
            JOIN sys.schemas ps ON ps.schema_id = pt.schema_id
            JOIN sys.columns pc
                ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
            JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
            JOIN sys.schemas rs ON rs.schema_id = rt.schema_id
            JOIN sys.columns rc
                ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
            WHERE DB_NAME() = @P1
            ORDER BY 1, 2
            "#,
            from_table = qualified("ps.name", "pt.name"),
            to_table = qualified("rs.name", "rt.name"),
        );
        let rows = self.catalog_query(&sql, &[&database]).await?;

        rows.iter()
            .map(|row| {
                Ok(ForeignKey {
                    table: text(row, 0)?,
                    column: text(row, 1)?,
                    ref_table: text(row, 2)?,
                    ref_column: text(row, 3)?,
                })
            })
            .collect()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            if let Err(e) = client.close().await {
                tracing::warn!("SQL Server connection did not close cleanly: {}", e);
            }
        }
    }
}

fn temporal<'a, T>(data: &'a ColumnData<'static>, render: impl FnOnce(T) -> String) -> Option<Value>
where
    T: FromSql<'a>,
{
    T::from_sql(data).ok().flatten().map(|v| Value::String(render(v)))
}

/// Convert one SQL Server cell to JSON
fn mssql_value_to_json(data: &ColumnData<'static>) -> Value {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| json!(v)),
        ColumnData::I16(v) => v.map(|v| json!(v)),
        ColumnData::I32(v) => v.map(|v| json!(v)),
        ColumnData::I64(v) => v.map(|v| json!(v)),
        ColumnData::F32(v) => v.map(|v| json!(v)),
        ColumnData::F64(v) => v.map(|v| json!(v)),
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| Value::String(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())),
        ColumnData::Numeric(v) => v.map(|n| Value::String(n.to_string())),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| Value::String(format!("<binary {} bytes>", b.len()))),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| Value::String(x.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(data, |v| v.to_string())
        }
        ColumnData::Date(_) => temporal::<NaiveDate>(data, |v| v.to_string()),
        ColumnData::Time(_) => temporal::<NaiveTime>(data, |v| v.to_string()),
        ColumnData::DateTimeOffset(_) => {
            temporal::<DateTime<FixedOffset>>(data, |v| v.to_rfc3339())
        }
    };
    value.unwrap_or(Value::Null)
}
