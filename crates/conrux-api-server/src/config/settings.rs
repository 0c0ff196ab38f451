use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use chrono::Duration;

use crate::services::model_client::DEFAULT_DOCUMENT_CHAR_BUDGET;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub session: SessionConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    pub max_upload_mb: usize,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeminiConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub ttl_seconds: u64,
    /// 0 keeps eviction purely sweep-on-write
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    pub max_input_length: usize,
    pub max_context_messages: usize,
    pub strict_extraction: bool,
    pub document_char_budget: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f32,
    pub jitter_factor: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilesConfig {
    pub text_formats: Vec<String>,
    pub image_formats: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                api_prefix: "/api/v1".to_string(),
                max_upload_mb: 20,
                allowed_origins: vec!["*".to_string()],
            },
            gemini: GeminiConfig {
                api_key: String::new(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                text_model: "gemini-2.0-flash-exp".to_string(),
                vision_model: "gemini-2.0-flash-exp".to_string(),
                temperature: 0.7,
                max_tokens: 8192,
                top_p: 0.95,
                top_k: 64,
                timeout_seconds: 60,
            },
            session: SessionConfig {
                ttl_seconds: 3600,
                sweep_interval_seconds: 0,
            },
            pipeline: PipelineConfig {
                max_input_length: 10_000,
                max_context_messages: 20,
                strict_extraction: false,
                document_char_budget: DEFAULT_DOCUMENT_CHAR_BUDGET,
            },
            retry: RetryConfig::default(),
            files: FilesConfig {
                text_formats: ["txt", "csv", "json", "md", "pdf", "docx", "xlsx"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                image_formats: ["jpg", "jpeg", "png", "gif", "bmp", "webp"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        }
    }
}

impl Default for RetryConfig {
    /// Three attempts, 4s..10s exponential backoff.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 4_000,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::try_from(&Settings::default())?;

        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins")
                    .with_list_parse_key("files.text_formats")
                    .with_list_parse_key("files.image_formats")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;

        if settings.gemini.api_key.is_empty() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                settings.gemini.api_key = key;
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gemini.api_key.trim().is_empty() {
            bail!(
                "GEMINI_API_KEY environment variable is required. \
                 Set it in your .env file or as APP__GEMINI__API_KEY."
            );
        }
        if self.pipeline.max_input_length == 0 {
            bail!("pipeline.max_input_length must be greater than zero");
        }
        if self.pipeline.max_context_messages == 0 {
            bail!("pipeline.max_context_messages must be greater than zero");
        }
        if self.session.ttl_seconds == 0 {
            bail!("session.ttl_seconds must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            bail!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms,
                self.retry.max_backoff_ms
            );
        }
        Ok(())
    }

    /// Messages retained per session: one user and one assistant entry per turn.
    pub fn max_session_messages(&self) -> usize {
        self.pipeline.max_context_messages * 2
    }

    /// Inactivity window shared by the memory and session stores
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session.ttl_seconds as i64)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb * 1024 * 1024
    }
}
