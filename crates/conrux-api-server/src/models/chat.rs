use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::services::conversation::ConversationMessage;

// ===== ENVELOPE =====

/// Standard response envelope for every successful endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationHistory {
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
    pub message_count: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryCleared {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ImageAnalysis {
    pub analysis: String,
    pub session_id: String,
    pub filename: String,
    pub file_size_kb: f64,
    pub model: String,
    pub latency_ms: f64,
    pub fallback: bool,
}

#[derive(Debug, Serialize)]
pub struct DocumentAnalysis {
    pub analysis: String,
    pub session_id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size_kb: f64,
    pub model: String,
    pub latency_ms: f64,
    pub fallback: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub gemini_status: String,
    pub active_sessions: usize,
    pub uptime_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SupportedFileTypes {
    pub text: Vec<String>,
    pub image: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub text_model: String,
    pub vision_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_context_messages: usize,
    pub max_input_length: usize,
    pub session_ttl_seconds: u64,
    pub max_upload_mb: usize,
    pub supported_file_types: SupportedFileTypes,
    pub pipeline_stages: Vec<crate::pipeline::StageName>,
}
