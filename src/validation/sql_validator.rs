use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::api::middleware::AppError;
use crate::models::EngineKind;

/// Read-only guard for generated SQL
pub struct SqlValidator;

impl SqlValidator {
    fn dialect(engine: EngineKind) -> Box<dyn Dialect> {
        match engine {
            EngineKind::MySql => Box::new(MySqlDialect {}),
            EngineKind::Postgres => Box::new(PostgreSqlDialect {}),
            EngineKind::MsSql => Box::new(MsSqlDialect {}),
        }
    }

    /// Accept exactly one statement that only reads data
    pub fn validate_read_only(sql: &str, engine: EngineKind) -> Result<(), AppError> {
        let dialect = Self::dialect(engine);
        let ast = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;

        let stmt = match ast.as_slice() {
            [] => return Err(AppError::InvalidSql("Empty SQL query".to_string())),
            [stmt] => stmt,
            _ => {
                return Err(AppError::InvalidSql(format!(
                    "Expected a single statement, found {}",
                    ast.len()
                )))
            }
        };

        match stmt {
            Statement::Query(query) if Self::query_is_read_only(query) => Ok(()),
            Statement::Query(_) => Err(AppError::InvalidSql(
                "Queries that write data or lock rows are not allowed. Only read queries are permitted."
                    .to_string(),
            )),
            other => Err(AppError::InvalidSql(format!(
                "{} statements are not allowed. Only read queries are permitted.",
                Self::keyword(other)
            ))),
        }
    }

    fn query_is_read_only(query: &Query) -> bool {
        let ctes_read_only = query
            .with
            .as_ref()
            .map(|with| with.cte_tables.iter().all(|cte| Self::query_is_read_only(&cte.query)))
            .unwrap_or(true);

        ctes_read_only && query.locks.is_empty() && Self::set_expr_is_read_only(&query.body)
    }

    fn set_expr_is_read_only(expr: &SetExpr) -> bool {
        match expr {
            // SELECT ... INTO creates a table
            SetExpr::Select(select) => select.into.is_none(),
            SetExpr::Query(query) => Self::query_is_read_only(query),
            SetExpr::SetOperation { left, right, .. } => {
                Self::set_expr_is_read_only(left) && Self::set_expr_is_read_only(right)
            }
            SetExpr::Values(_) | SetExpr::Table(_) => true,
            _ => false,
        }
    }

    /// Leading keyword of a statement, for error messages
    fn keyword(stmt: &Statement) -> String {
        stmt.to_string()
            .split_whitespace()
            .next()
            .unwrap_or("Unknown")
            .to_uppercase()
    }
}
