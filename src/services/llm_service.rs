use crate::api::middleware::AppError;
use crate::config::{ApiFormat, LlmConfig};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};

/// Single prompt in, single completion out
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AppError>;
}

/// HTTP client for the model gateway
pub struct LlmService {
    gateway_url: String,
    api_key: Option<String>,
    api_format: ApiFormat,
    http_client: HttpClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

impl LlmService {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            gateway_url: config.gateway_url.clone(),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            api_format: config.api_format,
            http_client: HttpClient::new(),
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        match self.api_format {
            ApiFormat::Gemini => json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
            }),
            ApiFormat::Simple => json!({
                "prompt": prompt,
                "max_tokens": 500,
                "temperature": 0.1,
            }),
        }
    }

    /// Call the gateway and return the completion text
    async fn call_llm_api(&self, prompt: &str) -> Result<String, AppError> {
        if self.gateway_url.trim().is_empty() {
            return Err(AppError::GenerationService(
                "LLM gateway URL is not configured".to_string(),
            ));
        }

        let mut request = self
            .http_client
            .post(&self.gateway_url)
            .json(&self.request_body(prompt));

        if let Some(api_key) = &self.api_key {
            request = match self.api_format {
                ApiFormat::Gemini => request.header("x-goog-api-key", api_key),
                ApiFormat::Simple => request.bearer_auth(api_key),
            };
        }

        let response = request.send().await.map_err(|e| {
            AppError::GenerationService(format!("Failed to call LLM service: {}", e.without_url()))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("LLM gateway returned {}", status);
            return Err(AppError::GenerationService(format!(
                "LLM service returned error {}: {}",
                status,
                error_text.trim()
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AppError::GenerationService(format!("Failed to parse LLM response: {}", e))
        })?;

        match self.api_format {
            ApiFormat::Gemini => parse_gemini(body),
            ApiFormat::Simple => parse_simple(&body),
        }
    }
}

#[async_trait::async_trait]
impl TextGenerator for LlmService {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        let started = std::time::Instant::now();
        let text = self.call_llm_api(prompt).await?;
        tracing::debug!(
            "LLM completion: {} prompt chars, {} response chars in {:?}",
            prompt.len(),
            text.len(),
            started.elapsed()
        );
        Ok(text)
    }
}

/// Concatenated text parts of the first candidate
fn parse_gemini(body: Value) -> Result<String, AppError> {
    let response: GeminiResponse = serde_json::from_value(body).map_err(|e| {
        AppError::GenerationService(format!("Unexpected LLM response shape: {}", e))
    })?;

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.get("blockReason"))
            .and_then(Value::as_str)
            .unwrap_or("no candidates");
        AppError::GenerationService(format!("LLM response contains no completion ({})", reason))
    })?;

    Ok(candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}

fn parse_simple(body: &Value) -> Result<String, AppError> {
    body["text"]
        .as_str()
        .or_else(|| body["content"].as_str())
        .or_else(|| body["response"].as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::GenerationService("LLM response does not contain a completion".to_string())
        })
}
