use std::sync::Arc;
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::models::{EngineKind, SchemaSnapshot};
use crate::services::deadline::{bounded, Stage, StageTimeouts};
use crate::services::llm_service::TextGenerator;
use crate::services::prompt_formatter::{
    generation_prompt, summary_prompt, verification_prompt, GenerationRequest, VerificationRequest,
};

const FENCE: &str = "```";

/// Info strings models put after an opening fence
const INFO_STRINGS: &[&str] = &[
    "sql", "mysql", "mariadb", "postgres", "postgresql", "psql", "pgsql", "tsql", "t-sql",
    "mssql", "sqlserver", "plsql",
];

/// Output of the generate and verify round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// Raw text of the generation call
    pub candidate_sql: String,
    /// SQL extracted from the verifier response, ready to execute
    pub sql: String,
}

/// Natural language to SQL: generate, verify, extract
pub struct TranslationPipeline {
    generator: Arc<dyn TextGenerator>,
}

impl TranslationPipeline {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generate and verify SQL for `question` in the dialect of `engine`
    pub async fn translate(
        &self,
        question: &str,
        schema: &SchemaSnapshot,
        engine: EngineKind,
        timeouts: &StageTimeouts,
    ) -> Result<Translation, AppError> {
        let prompt = generation_prompt(&GenerationRequest {
            question,
            schema,
            engine,
        });
        let candidate_sql = bounded(
            Stage::Generation,
            timeouts.for_stage(Stage::Generation),
            self.generator.complete(&prompt),
        )
        .await?;

        if candidate_sql.trim().is_empty() {
            return Err(AppError::EmptyGeneration);
        }
        tracing::debug!("Candidate SQL: {}", candidate_sql.trim());

        let prompt = verification_prompt(&VerificationRequest {
            candidate_sql: &candidate_sql,
            schema,
            engine,
        });
        let verified = bounded(
            Stage::Verification,
            timeouts.for_stage(Stage::Verification),
            self.generator.complete(&prompt),
        )
        .await?;

        let sql = extract_sql(&verified)?;
        tracing::info!("Translated question into SQL: {}", sql);

        Ok(Translation { candidate_sql, sql })
    }

    /// Short plain-language description of the database
    pub async fn summarize(&self, schema: &SchemaSnapshot, limit: Duration) -> Result<String, AppError> {
        let prompt = summary_prompt(schema);
        let summary = bounded(Stage::Summary, limit, self.generator.complete(&prompt)).await?;
        Ok(summary.trim().to_string())
    }
}

/// Pull the SQL out of a verifier response.
///
/// If the response contains a complete fenced block, its content is used
/// (a language tag such as `sql` on the opening line is dropped). Otherwise the
/// whole response is used. Either way the result is trimmed and must not be empty.
pub fn extract_sql(response: &str) -> Result<String, AppError> {
    let sql = match fenced_block(response) {
        Some(inner) => inner.trim(),
        None => response.trim(),
    };

    if sql.is_empty() {
        return Err(AppError::EmptyGeneration);
    }
    Ok(sql.to_string())
}

/// Content of the first closed fenced block
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let after_open = &text[open + FENCE.len()..];
    let close = after_open.find(FENCE)?;
    let block = &after_open[..close];

    // Skip a language tag like `sql` or `postgresql` on the opening line
    let body = match block.find('\n') {
        Some(newline) => {
            let first_line = block[..newline].trim();
            if is_info_string(first_line) {
                &block[newline + 1..]
            } else {
                block
            }
        }
        None => block,
    };
    Some(body)
}

fn is_info_string(line: &str) -> bool {
    INFO_STRINGS.iter().any(|tag| line.eq_ignore_ascii_case(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnInfo, EngineKind};
    use crate::services::testing::ScriptedGenerator;

    fn orders_schema() -> SchemaSnapshot {
        SchemaSnapshot::new(
            "shop".to_string(),
            EngineKind::MySql,
            vec!["Orders".to_string()],
            vec![ColumnInfo {
                table: "Orders".to_string(),
                column: "OrderId".to_string(),
                data_type: "int".to_string(),
                nullable: false,
                is_key: true,
            }],
            vec![],
        )
    }

    fn timeouts() -> StageTimeouts {
        StageTimeouts::uniform(Duration::from_secs(5))
    }

    #[test]
    fn test_extract_fenced_block() {
        assert_eq!(
            extract_sql("```sql\nSELECT * FROM Orders\n```").unwrap(),
            "SELECT * FROM Orders"
        );
        assert_eq!(
            extract_sql("Here is the fix:\n```\n  SELECT 1\n```\nDone.").unwrap(),
            "SELECT 1"
        );
    }

    #[test]
    fn test_extract_only_first_block() {
        let response = "```sql\nSELECT a FROM t\n```\nor\n```sql\nSELECT b FROM t\n```";
        assert_eq!(extract_sql(response).unwrap(), "SELECT a FROM t");
    }

    #[test]
    fn test_extract_keeps_sql_on_opening_line() {
        assert_eq!(
            extract_sql("```SELECT\n* FROM Orders\n```").unwrap(),
            "SELECT\n* FROM Orders"
        );
        assert_eq!(
            extract_sql("```WITH\nx AS (SELECT 1) SELECT * FROM x\n```").unwrap(),
            "WITH\nx AS (SELECT 1) SELECT * FROM x"
        );
        assert_eq!(extract_sql("```TSQL\nSELECT TOP 1 * FROM t\n```").unwrap(), "SELECT TOP 1 * FROM t");
        assert_eq!(extract_sql("```postgresql\nSELECT 1\n```").unwrap(), "SELECT 1");
    }

    #[test]
    fn test_extract_single_line_fence() {
        assert_eq!(extract_sql("```SELECT 1```").unwrap(), "SELECT 1");
    }

    #[test]
    fn test_extract_without_fence_uses_trimmed_response() {
        assert_eq!(
            extract_sql("  \n SELECT * FROM \"Customer\" \n").unwrap(),
            "SELECT * FROM \"Customer\""
        );
        // An unclosed fence is not a block
        assert_eq!(extract_sql("```sql\nSELECT 1").unwrap(), "```sql\nSELECT 1");
    }

    #[test]
    fn test_extract_empty_is_empty_generation() {
        assert!(matches!(extract_sql(" \n\t "), Err(AppError::EmptyGeneration)));
        assert!(matches!(extract_sql("```sql\n   \n```"), Err(AppError::EmptyGeneration)));
    }

    #[tokio::test]
    async fn test_translate_orders_scenario() {
        let generator = Arc::new(ScriptedGenerator::new([
            "SELECT * FROM Orders",
            "```sql\nSELECT * FROM Orders\n```",
        ]));
        let pipeline = TranslationPipeline::new(generator.clone());

        let translation = pipeline
            .translate("show all orders", &orders_schema(), EngineKind::MySql, &timeouts())
            .await
            .unwrap();

        assert_eq!(translation.sql, "SELECT * FROM Orders");
        assert_eq!(translation.candidate_sql, "SELECT * FROM Orders");

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Orders") && prompts[0].contains("OrderId"));
        assert!(prompts[0].contains("show all orders"));
        assert!(prompts[1].contains("SQL:\nSELECT * FROM Orders"));
    }

    #[tokio::test]
    async fn test_generation_failure_aborts_before_verification() {
        let generator = Arc::new(ScriptedGenerator::failing(AppError::GenerationService(
            "LLM service returned error 500".to_string(),
        )));
        let pipeline = TranslationPipeline::new(generator.clone());

        let err = pipeline
            .translate("show all orders", &orders_schema(), EngineKind::MySql, &timeouts())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GenerationService(_)));
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_candidate_is_empty_generation() {
        let generator = Arc::new(ScriptedGenerator::new(["   "]));
        let pipeline = TranslationPipeline::new(generator.clone());

        let err = pipeline
            .translate("show all orders", &orders_schema(), EngineKind::MySql, &timeouts())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyGeneration));
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generation_timeout_names_stage() {
        let generator = Arc::new(
            ScriptedGenerator::new(["SELECT 1", "SELECT 1"]).with_delay(Duration::from_millis(200)),
        );
        let pipeline = TranslationPipeline::new(generator);
        let mut limits = timeouts();
        limits.generation = Duration::from_millis(20);

        let err = pipeline
            .translate("anything", &orders_schema(), EngineKind::MySql, &limits)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Timeout {
                stage: Stage::Generation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_verification_timeout_names_stage() {
        let generator = Arc::new(
            ScriptedGenerator::new(["SELECT 1", "SELECT 1"])
                .with_call_delays([Duration::ZERO, Duration::from_millis(200)]),
        );
        let pipeline = TranslationPipeline::new(generator.clone());
        let mut limits = timeouts();
        limits.generation = Duration::from_millis(100);
        limits.verification = Duration::from_millis(20);

        let err = pipeline
            .translate("anything", &orders_schema(), EngineKind::MySql, &limits)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Timeout {
                stage: Stage::Verification,
                ..
            }
        ));
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_prompts_use_given_engine() {
        let generator = Arc::new(ScriptedGenerator::new(["SELECT TOP 1 * FROM Orders", "SELECT TOP 1 * FROM Orders"]));
        let pipeline = TranslationPipeline::new(generator.clone());

        // Snapshot says MySQL, the caller's connection is SQL Server
        pipeline
            .translate("latest order", &orders_schema(), EngineKind::MsSql, &timeouts())
            .await
            .unwrap();

        for prompt in generator.prompts() {
            assert!(prompt.contains("T-SQL (SQL Server)"));
            assert!(!prompt.contains("MySQL"));
        }
    }

    #[tokio::test]
    async fn test_summarize_trims() {
        let generator = Arc::new(ScriptedGenerator::new(["\n  A small shop database.  \n"]));
        let pipeline = TranslationPipeline::new(generator);
        let summary = pipeline
            .summarize(&orders_schema(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(summary, "A small shop database.");
    }
}
