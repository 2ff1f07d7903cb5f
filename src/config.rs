use serde::Deserialize;
use std::env;

/// Gemini `generateContent` endpoint used when no gateway is configured
pub const DEFAULT_GATEWAY_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub timeouts: TimeoutConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    /// `{"contents":[{"parts":[{"text":..}]}]}` in, `candidates[0].content.parts` out
    Gemini,
    /// `{"prompt":..}` in, `text`/`content`/`response` out
    Simple,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub api_format: ApiFormat,
    pub summarize_on_connect: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub introspection_secs: u64,
    pub generation_secs: u64,
    pub verification_secs: u64,
    pub execution_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Reject anything but a single read query before it reaches the database
    pub read_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

/// (config key, environment variable) pairs applied as overrides
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("server.host", "HOST"),
    ("server.port", "PORT"),
    ("llm.gateway_url", "LLM_GATEWAY_URL"),
    ("llm.api_key", "GEMINI_API_KEY"),
    ("llm.api_key", "LLM_API_KEY"),
    ("llm.api_format", "LLM_API_FORMAT"),
    ("llm.summarize_on_connect", "LLM_SUMMARIZE_ON_CONNECT"),
    ("timeouts.connect_secs", "CONNECT_TIMEOUT_SECS"),
    ("timeouts.introspection_secs", "INTROSPECTION_TIMEOUT_SECS"),
    ("timeouts.generation_secs", "GENERATION_TIMEOUT_SECS"),
    ("timeouts.verification_secs", "VERIFICATION_TIMEOUT_SECS"),
    ("timeouts.execution_secs", "QUERY_TIMEOUT_SECS"),
    ("query.read_only", "QUERY_READ_ONLY"),
    ("logging.level", "RUST_LOG"),
    ("logging.style", "RUST_LOG_STYLE"),
];

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env first so its values take part in the overrides below
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("llm.gateway_url", DEFAULT_GATEWAY_URL)?
            .set_default("llm.api_format", "gemini")?
            .set_default("llm.summarize_on_connect", true)?
            .set_default("timeouts.connect_secs", 15)?
            .set_default("timeouts.introspection_secs", 30)?
            .set_default("timeouts.generation_secs", 60)?
            .set_default("timeouts.verification_secs", 60)?
            .set_default("timeouts.execution_secs", 30)?
            .set_default("query.read_only", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        // Later entries win, so LLM_API_KEY beats GEMINI_API_KEY
        for (key, var) in ENV_OVERRIDES {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if !self.llm.gateway_url.is_empty() {
            url::Url::parse(&self.llm.gateway_url).map_err(|e| {
                config::ConfigError::Message(format!("Invalid LLM gateway URL: {}", e))
            })?;
        }
        let t = &self.timeouts;
        if [
            t.connect_secs,
            t.introspection_secs,
            t.generation_secs,
            t.verification_secs,
            t.execution_secs,
        ]
        .contains(&0)
        {
            return Err(config::ConfigError::Message(
                "Timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
