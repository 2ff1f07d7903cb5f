// Schema rendering and prompt construction for the generation model.
// Identifiers are copied exactly as introspected; nothing here changes case.
use crate::models::{EngineKind, SchemaSnapshot};

/// Inputs for the first model call
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    pub schema: &'a SchemaSnapshot,
    /// Engine of the caller's connection, which picks the dialect
    pub engine: EngineKind,
}

/// Inputs for the second model call
#[derive(Debug, Clone, Copy)]
pub struct VerificationRequest<'a> {
    pub candidate_sql: &'a str,
    pub schema: &'a SchemaSnapshot,
    pub engine: EngineKind,
}

/// Render the snapshot as compact text, one block per table.
/// The header names `engine`, the engine of the connection the text is for.
pub fn format_schema(schema: &SchemaSnapshot, engine: EngineKind) -> String {
    let mut out = format!(
        "Database: {} ({})\n",
        schema.database_name,
        engine.display_name()
    );

    if schema.tables.is_empty() {
        out.push_str("(no tables)\n");
        return out;
    }

    for table in &schema.tables {
        out.push_str(&format!("Table {}:\n", table));
        for column in schema.columns_of(table) {
            out.push_str(&format!("  - {} ({})", column.column, column.data_type));
            if column.is_key {
                out.push_str(" [PRIMARY KEY]");
            }
            if !column.nullable {
                out.push_str(" [NOT NULL]");
            }
            if let Some(fk) = schema.foreign_key_of(table, &column.column) {
                out.push_str(&format!(" [FOREIGN KEY -> {}.{}]", fk.ref_table, fk.ref_column));
            }
            out.push('\n');
        }
    }

    out
}

/// Dialect notes appended to prompts
pub fn dialect_hints(engine: EngineKind) -> &'static str {
    match engine {
        EngineKind::MySql => {
            r#"- Use MySQL syntax and functions
- Use LIMIT syntax (not TOP or FETCH FIRST)
- For dates, use functions like NOW(), CURDATE(), DATE_SUB(), etc.
- String concatenation uses CONCAT() function
- Use backticks for identifier quoting if needed: `table_name`"#
        }
        EngineKind::Postgres => {
            r#"- Use PostgreSQL syntax and functions
- Use LIMIT syntax (or FETCH FIRST)
- For dates, use functions like NOW(), CURRENT_DATE, interval arithmetic
- String concatenation uses || operator or CONCAT()
- Mixed-case identifiers must be double quoted: "TableName""#
        }
        EngineKind::MsSql => {
            r#"- Use T-SQL (SQL Server) syntax and functions
- Use TOP (n) or OFFSET ... FETCH NEXT, never LIMIT
- For dates, use functions like GETDATE(), DATEADD(), DATEDIFF()
- String concatenation uses + or CONCAT()
- Use square brackets for identifier quoting if needed: [table_name]"#
        }
    }
}

pub fn generation_prompt(request: &GenerationRequest<'_>) -> String {
    let engine = request.engine.display_name();
    format!(
        r#"You are an expert {engine} SQL assistant.
IMPORTANT: Table and column names are CASE SENSITIVE.
Use them EXACTLY as shown in the schema. Do not guess or modify them.

Schema (copy exactly as provided):
{schema}
User request:
"{question}"

Instructions:
1. Reference only tables and columns that exist in the schema above
2. When returning rows about an entity, include descriptive columns (such as names), not only ids
3. Output only the SQL query, no explanations, no extra formatting
{hints}
"#,
        engine = engine,
        schema = format_schema(request.schema, request.engine),
        question = request.question.trim(),
        hints = dialect_hints(request.engine),
    )
}

pub fn verification_prompt(request: &VerificationRequest<'_>) -> String {
    let engine = request.engine.display_name();
    format!(
        r#"Schema (copy exactly as provided):
{schema}
Check whether the following {engine} SQL query is valid for this schema.
Consider case sensitivity of table and column names.
If it is incorrect, fix it. Return only the corrected SQL query, nothing else.
{hints}

SQL:
{sql}
"#,
        schema = format_schema(request.schema, request.engine),
        engine = engine,
        hints = dialect_hints(request.engine),
        sql = request.candidate_sql.trim(),
    )
}

/// Prompt asking for a short plain-language description of the database
pub fn summary_prompt(schema: &SchemaSnapshot) -> String {
    let tables = if schema.tables.is_empty() {
        "(none)".to_string()
    } else {
        schema
            .tables
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Tables present in the database "{database}":
{tables}

Task:
- Summarize the database in plain language
- Keep it short and easy for a non-technical user to understand
- Do not explain relationships or technical details

The output should give the user a clear idea of what kind of data is available
so they can decide what to ask about.
"#,
        database = schema.database_name,
        tables = tables,
    )
}
