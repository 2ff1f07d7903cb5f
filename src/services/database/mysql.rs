// MySQL adapter using connection pooling
use crate::api::middleware::AppError;
use crate::models::{ColumnInfo, DatabaseTarget, EngineKind, ForeignKey, RawRows, Record};
use crate::services::database::adapter::DatabaseAdapter;
use crate::services::database::connect_error;
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Conn, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, Value as MySqlValue};
use serde_json::{json, Value};

pub struct MySQLAdapter {
    pool: Pool,
}

impl MySQLAdapter {
    pub fn new(target: &DatabaseTarget, max_pool_size: usize) -> Self {
        let constraints = PoolConstraints::new(0, max_pool_size.max(1)).unwrap_or_default();
        let opts = OptsBuilder::default()
            .ip_or_hostname(target.host.clone())
            .tcp_port(target.port)
            .user(Some(target.credentials.username.clone()))
            .pass(Some(target.credentials.password.clone()))
            .db_name(Some(target.database.clone()))
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        Self {
            pool: Pool::new(opts),
        }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<Conn, AppError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MySQLAdapter {
    fn engine(&self) -> EngineKind {
        EngineKind::MySql
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| connect_error(EngineKind::MySql, e))?;
        conn.ping()
            .await
            .map_err(|e| connect_error(EngineKind::MySql, e))
    }

    async fn execute_raw(&self, sql: &str) -> Result<RawRows, AppError> {
        let mut conn = self.get_conn().await?;

        let mut result = conn
            .query_iter(sql)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let columns: Vec<(String, ColumnType)> = result
            .columns_ref()
            .iter()
            .map(|c| (c.name_str().into_owned(), c.column_type()))
            .collect();

        let rows: Vec<Row> = result
            .collect()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let records = rows
            .into_iter()
            .map(|row| {
                let mut record = Record::new();
                for (idx, (name, column_type)) in columns.iter().enumerate() {
                    let value = match row.get_opt::<MySqlValue, usize>(idx) {
                        Some(Ok(mysql_val)) => mysql_value_to_json(mysql_val, *column_type),
                        Some(Err(_)) | None => Value::Null,
                    };
                    record.insert(name.clone(), value);
                }
                record
            })
            .collect();

        Ok(RawRows {
            columns: columns.into_iter().map(|(name, _)| name).collect(),
            rows: records,
        })
    }

    async fn fetch_tables(&self, database: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.get_conn().await?;
        conn.exec(
            r#"
            SELECT TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME
            "#,
            (database,),
        )
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn fetch_columns(&self, database: &str) -> Result<Vec<ColumnInfo>, AppError> {
        let mut conn = self.get_conn().await?;
        let rows: Vec<(String, String, String, String, String)> = conn
            .exec(
                r#"
                SELECT
                    TABLE_NAME,
                    COLUMN_NAME,
                    DATA_TYPE,
                    IS_NULLABLE,
                    COLUMN_KEY
                FROM information_schema.COLUMNS
                WHERE TABLE_SCHEMA = ?
                ORDER BY TABLE_NAME, ORDINAL_POSITION
                "#,
                (database,),
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(table, column, data_type, is_nullable, column_key)| ColumnInfo {
                table,
                column,
                data_type,
                nullable: is_nullable == "YES",
                is_key: column_key == "PRI",
            })
            .collect())
    }

    async fn fetch_foreign_keys(&self, database: &str) -> Result<Vec<ForeignKey>, AppError> {
        let mut conn = self.get_conn().await?;
        let rows: Vec<(String, String, String, String)> = conn
            .exec(
                r#"
                SELECT
                    TABLE_NAME,
                    COLUMN_NAME,
                    REFERENCED_TABLE_NAME,
                    REFERENCED_COLUMN_NAME
                FROM information_schema.KEY_COLUMN_USAGE
                WHERE TABLE_SCHEMA = ?
                  AND REFERENCED_TABLE_NAME IS NOT NULL
                ORDER BY TABLE_NAME, COLUMN_NAME
                "#,
                (database,),
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(table, column, ref_table, ref_column)| ForeignKey {
                table,
                column,
                ref_table,
                ref_column,
            })
            .collect())
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            tracing::warn!("MySQL pool did not shut down cleanly: {}", e);
        }
    }
}

/// Convert a MySQL value to JSON.
/// The text protocol delivers every non-NULL cell as bytes, so numeric
/// columns are parsed back using the column type.
fn mysql_value_to_json(mysql_val: MySqlValue, column_type: ColumnType) -> Value {
    match mysql_val {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text_cell_to_json(text, column_type),
            Err(e) => json!(format!("<binary {} bytes>", e.as_bytes().len())),
        },
        MySqlValue::Int(i) => json!(i),
        MySqlValue::UInt(u) => json!(u),
        MySqlValue::Float(f) => json!(f),
        MySqlValue::Double(d) => json!(d),
        MySqlValue::Date(y, m, d, h, min, s, _) => {
            json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
        }
        MySqlValue::Time(is_neg, d, h, m, s, _) => {
            let sign = if is_neg { "-" } else { "" };
            let total_hours = d * 24 + h as u32;
            json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
        }
    }
}

fn text_cell_to_json(text: String, column_type: ColumnType) -> Value {
    use ColumnType::*;

    match column_type {
        MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
        | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR => {
            if let Ok(i) = text.parse::<i64>() {
                json!(i)
            } else if let Ok(u) = text.parse::<u64>() {
                json!(u)
            } else {
                Value::String(text)
            }
        }
        MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE => match text.parse::<f64>() {
            Ok(f) => json!(f),
            Err(_) => Value::String(text),
        },
        MYSQL_TYPE_JSON => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        // DECIMAL keeps its exact text form
        _ => Value::String(text),
    }
}
