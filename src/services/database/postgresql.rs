// PostgreSQL adapter using connection pooling
use crate::api::middleware::AppError;
use crate::models::{ColumnInfo, DatabaseTarget, EngineKind, ForeignKey, RawRows, Record};
use crate::services::database::adapter::DatabaseAdapter;
use crate::services::database::connect_error;
use crate::services::database::pg_types::PgNumeric;
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use serde_json::{json, Value};
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{NoTls, Row};

pub struct PostgreSQLAdapter {
    pool: Pool,
}

impl PostgreSQLAdapter {
    pub fn new(target: &DatabaseTarget, max_pool_size: usize) -> Result<Self, AppError> {
        let mut cfg = PoolConfig::new();
        cfg.host = Some(target.host.clone());
        cfg.port = Some(target.port);
        cfg.user = Some(target.credentials.username.clone());
        cfg.password = Some(target.credentials.password.clone());
        cfg.dbname = Some(target.database.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| connect_error(EngineKind::Postgres, e))?;
        pool.resize(max_pool_size.max(1));

        Ok(Self { pool })
    }

    async fn client(&self) -> Result<Object, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn catalog_query(&self, sql: &str, database: &str) -> Result<Vec<Row>, AppError> {
        let client = self.client().await?;
        client
            .query(sql, &[&database])
            .await
            .map_err(|e| AppError::Database(engine_message(&e)))
    }
}

/// Schema-qualified table name, bare for `public`
fn qualified(schema_col: &str, table_col: &str) -> String {
    format!(
        "(CASE WHEN {s} = 'public' THEN {t} ELSE {s} || '.' || {t} END)::text",
        s = schema_col,
        t = table_col
    )
}

/// Catalog filter excluding PostgreSQL's own schemas
fn user_schemas(col: &str) -> String {
    format!("{col} NOT IN ('pg_catalog', 'information_schema') AND {col} NOT LIKE 'pg_toast%'")
}

/// Server-side message for database errors, transport text otherwise
fn engine_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db_error) => db_error.to_string(),
        None => e.to_string(),
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for PostgreSQLAdapter {
    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| connect_error(EngineKind::Postgres, e))?;
        client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| connect_error(EngineKind::Postgres, engine_message(&e)))
    }

    async fn execute_raw(&self, sql: &str) -> Result<RawRows, AppError> {
        let client = self.client().await?;

        // Preparing first gives column metadata even when no rows come back
        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| AppError::Database(engine_message(&e)))?;
        let rows = client
            .query(&statement, &[])
            .await
            .map_err(|e| AppError::Database(engine_message(&e)))?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let records = rows
            .iter()
            .map(|row| {
                let mut record = Record::new();
                for (idx, column) in row.columns().iter().enumerate() {
                    record.insert(column.name().to_string(), pg_value_to_json(row, idx, column.type_()));
                }
                record
            })
            .collect();

        Ok(RawRows {
            columns,
            rows: records,
        })
    }

    async fn fetch_tables(&self, database: &str) -> Result<Vec<String>, AppError> {
        let sql = format!(
            r#"
            SELECT {name}
            FROM information_schema.tables
            WHERE table_catalog::text = $1
              AND {schemas}
            ORDER BY table_schema, table_name
            "#,
            name = qualified("table_schema", "table_name"),
            schemas = user_schemas("table_schema"),
        );
        let rows = self.catalog_query(&sql, database).await?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn fetch_columns(&self, database: &str) -> Result<Vec<ColumnInfo>, AppError> {
        let sql = format!(
            r#"
            SELECT
                {name},
                c.column_name::text,
                c.data_type::text,
                c.is_nullable::text = 'YES',
                EXISTS (
                    SELECT 1
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage ku
                        ON tc.constraint_name = ku.constraint_name
                        AND tc.table_schema = ku.table_schema
                        AND tc.table_name = ku.table_name
                    WHERE tc.constraint_type = 'PRIMARY KEY'
                        AND tc.table_schema = c.table_schema
                        AND tc.table_name = c.table_name
                        AND ku.column_name = c.column_name
                )
            FROM information_schema.columns c
            WHERE c.table_catalog::text = $1
              AND {schemas}
            ORDER BY c.table_schema, c.table_name, c.ordinal_position
            "#,
            name = qualified("c.table_schema", "c.table_name"),
            schemas = user_schemas("c.table_schema"),
        );
        let rows = self.catalog_query(&sql, database).await?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                table: row.get(0),
                column: row.get(1),
                data_type: row.get(2),
                nullable: row.get(3),
                is_key: row.get(4),
            })
            .collect())
    }

    async fn fetch_foreign_keys(&self, database: &str) -> Result<Vec<ForeignKey>, AppError> {
        let sql = format!(
            r#"
            SELECT
                {from_table},
                kcu.column_name::text,
                {to_table},
                ccu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.constraint_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
              AND tc.table_catalog::text = $1
            ORDER BY 1, 2
            "#,
            from_table = qualified("kcu.table_schema", "kcu.table_name"),
            to_table = qualified("ccu.table_schema", "ccu.table_name"),
        );
        let rows = self.catalog_query(&sql, database).await?;

        Ok(rows
            .iter()
            .map(|row| ForeignKey {
                table: row.get(0),
                column: row.get(1),
                ref_table: row.get(2),
                ref_column: row.get(3),
            })
            .collect())
    }

    async fn close(&self) {
        self.pool.close();
    }
}

fn cell<'a, T, F>(row: &'a Row, idx: usize, to_json: F) -> Value
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => to_json(v),
        Ok(None) => Value::Null,
        Err(e) => {
            tracing::warn!("Failed to decode column {}: {}", idx, e);
            Value::Null
        }
    }
}

/// Convert one PostgreSQL cell to JSON based on its column type
fn pg_value_to_json(row: &Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::BOOL => cell::<bool, _>(row, idx, Value::Bool),
        Type::INT2 => cell::<i16, _>(row, idx, |v| json!(v)),
        Type::INT4 => cell::<i32, _>(row, idx, |v| json!(v)),
        Type::INT8 => cell::<i64, _>(row, idx, |v| json!(v)),
        Type::OID => cell::<u32, _>(row, idx, |v| json!(v)),
        Type::FLOAT4 => cell::<f32, _>(row, idx, |v| json!(v)),
        Type::FLOAT8 => cell::<f64, _>(row, idx, |v| json!(v)),
        Type::NUMERIC => cell::<PgNumeric, _>(row, idx, |v| Value::String(v.0)),
        Type::JSON | Type::JSONB => cell::<Value, _>(row, idx, |v| v),
        Type::UUID => cell::<uuid::Uuid, _>(row, idx, |v| Value::String(v.to_string())),
        Type::TIMESTAMP => cell::<chrono::NaiveDateTime, _>(row, idx, |v| json!(v.to_string())),
        Type::TIMESTAMPTZ => {
            cell::<chrono::DateTime<chrono::Utc>, _>(row, idx, |v| json!(v.to_rfc3339()))
        }
        Type::DATE => cell::<chrono::NaiveDate, _>(row, idx, |v| json!(v.to_string())),
        Type::TIME => cell::<chrono::NaiveTime, _>(row, idx, |v| json!(v.to_string())),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(v)) => Value::String(v),
            Ok(None) => Value::Null,
            // Types without a text mapping (arrays, enums, ranges) get a placeholder
            Err(_) => json!(format!("<{}>", ty.name())),
        },
    }
}
