use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::EngineKind;

/// Table, column and foreign-key metadata captured in one introspection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub database_name: String,
    pub engine: EngineKind,
    pub tables: Vec<String>,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
    pub captured_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    pub fn new(
        database_name: String,
        engine: EngineKind,
        tables: Vec<String>,
        columns: Vec<ColumnInfo>,
        foreign_keys: Vec<ForeignKey>,
    ) -> Self {
        Self {
            database_name,
            engine,
            tables,
            columns,
            foreign_keys,
            captured_at: Utc::now(),
        }
    }

    /// Columns of one table, in introspection order
    pub fn columns_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ColumnInfo> + 'a {
        self.columns.iter().filter(move |c| c.table == table)
    }

    /// Foreign key starting at `table.column`, if any
    pub fn foreign_key_of(&self, table: &str, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.table == table && fk.column == column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_of_filters_by_exact_table() {
        let snapshot = SchemaSnapshot::new(
            "shop".to_string(),
            EngineKind::MySql,
            vec!["Orders".to_string(), "orders_archive".to_string()],
            vec![
                ColumnInfo {
                    table: "Orders".to_string(),
                    column: "OrderId".to_string(),
                    data_type: "int".to_string(),
                    nullable: false,
                    is_key: true,
                },
                ColumnInfo {
                    table: "orders_archive".to_string(),
                    column: "id".to_string(),
                    data_type: "int".to_string(),
                    nullable: false,
                    is_key: true,
                },
            ],
            vec![],
        );

        let names: Vec<_> = snapshot.columns_of("Orders").map(|c| c.column.as_str()).collect();
        assert_eq!(names, vec!["OrderId"]);
        assert_eq!(snapshot.columns_of("orders").count(), 0);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = SchemaSnapshot::new(
            "shop".to_string(),
            EngineKind::Postgres,
            vec![],
            vec![],
            vec![ForeignKey {
                table: "Orders".to_string(),
                column: "CustomerId".to_string(),
                ref_table: "Customer".to_string(),
                ref_column: "ID".to_string(),
            }],
        );
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["databaseName"], "shop");
        assert_eq!(value["engine"], "postgres");
        assert_eq!(value["foreignKeys"][0]["refColumn"], "ID");
    }
}
