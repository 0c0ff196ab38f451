use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::services::conversation::HistoryTurn;

use super::error::StageError;

/// The four pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Input,
    Context,
    Ai,
    Output,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Input => "input",
            StageName::Context => "context",
            StageName::Ai => "ai",
            StageName::Output => "output",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputMetadata {
    pub char_count: usize,
    pub word_count: usize,
    pub original_length: usize,
}

/// Written by the input stage
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub message: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub metadata: InputMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub history_message_count: usize,
    pub context_window_limit: usize,
}

/// Written by the context stage
#[derive(Debug, Clone)]
pub struct PreparedContext {
    pub history: Vec<HistoryTurn>,
    pub system_instruction: String,
    pub summary: ContextSummary,
}

/// Written by the AI stage
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub model_used: String,
    pub latency_ms: f64,
    /// The text is the fixed apology, not model output
    pub fallback: bool,
}

/// Final payload of a chat turn
#[derive(Debug, Clone, Serialize)]
pub struct ChatResult {
    pub response: String,
    pub session_id: String,
    pub message_id: String,
    pub model: String,
    pub ai_latency_ms: f64,
    pub pipeline_stages: Vec<StageName>,
    pub context_info: ContextSummary,
    pub input_metadata: InputMetadata,
    pub response_fallback: bool,
    pub total_pipeline_latency_ms: f64,
}

/// Request-scoped state threaded through the stages.
///
/// Raw inputs are set at construction. Each stage fills exactly one of the
/// optional slots and appends its name to `stages`; a later stage reads the
/// slots of earlier ones through the accessors, which fail if a slot is still
/// empty.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub raw_message: String,
    pub session_id: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,

    pub input: Option<PreparedInput>,
    pub context: Option<PreparedContext>,
    pub reply: Option<ModelReply>,
    pub result: Option<ChatResult>,

    pub stages: Vec<StageName>,
}

impl PipelineContext {
    pub fn new(
        raw_message: impl Into<String>,
        session_id: Option<String>,
        system_prompt: Option<String>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            raw_message: raw_message.into(),
            session_id,
            system_prompt,
            temperature,
            input: None,
            context: None,
            reply: None,
            result: None,
            stages: Vec::with_capacity(4),
        }
    }

    pub fn prepared_input(&self) -> Result<&PreparedInput, StageError> {
        self.input
            .as_ref()
            .ok_or_else(|| anyhow!("input stage output missing from context").into())
    }

    pub fn prepared_context(&self) -> Result<&PreparedContext, StageError> {
        self.context
            .as_ref()
            .ok_or_else(|| anyhow!("context stage output missing from context").into())
    }

    pub fn model_reply(&self) -> Result<&ModelReply, StageError> {
        self.reply
            .as_ref()
            .ok_or_else(|| anyhow!("ai stage output missing from context").into())
    }

    pub fn mark(&mut self, stage: StageName) {
        self.stages.push(stage);
    }
}

/// Milliseconds rounded to two decimals
pub fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
