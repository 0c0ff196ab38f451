use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Stage;
use crate::pipeline::context::{InputMetadata, PipelineContext, PreparedInput, StageName};
use crate::pipeline::error::{StageError, ValidationError};

// Known manipulation phrasings. Heuristic only.
static INJECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)",
        r"ignore\s+(?:all\s+)?(?:previous|above)\s+instructions?",
        r"|you\s+are\s+now\s+(?:a\s+)?(?:dan|jailbreak)",
        r"|disregard\s+(?:all\s+)?(?:your\s+)?(?:instructions?|training)",
    ))
    .expect("Valid regex pattern")
});

static WHITESPACE_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{3,}").expect("Valid regex pattern"));

/// Validates and sanitizes the raw message, assigns session and request ids
pub struct InputStage {
    max_input_length: usize,
}

impl InputStage {
    pub fn new(max_input_length: usize) -> Self {
        Self { max_input_length }
    }

    fn validate<'a>(&self, raw: &'a str) -> Result<&'a str, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        let actual = trimmed.chars().count();
        if actual > self.max_input_length {
            return Err(ValidationError::TooLong {
                actual,
                max: self.max_input_length,
            });
        }

        if INJECTION_RE.is_match(trimmed) {
            return Err(ValidationError::Rejected);
        }

        Ok(trimmed)
    }

    fn sanitize(&self, message: &str) -> String {
        let bounded: String = message.chars().take(self.max_input_length).collect();
        WHITESPACE_RUN_RE.replace_all(&bounded, "  ").into_owned()
    }
}

#[async_trait]
impl Stage for InputStage {
    fn name(&self) -> StageName {
        StageName::Input
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let session_id = ctx
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let raw = ctx.raw_message.as_str();
        let trimmed = match self.validate(raw) {
            Ok(trimmed) => trimmed,
            Err(ValidationError::Rejected) => {
                warn!("[{}] Potential prompt injection detected", session_id);
                return Err(ValidationError::Rejected.into());
            }
            Err(e) => return Err(e.into()),
        };

        let original_length = trimmed.chars().count();
        let message = self.sanitize(trimmed);
        let metadata = InputMetadata {
            char_count: message.chars().count(),
            word_count: message.split_whitespace().count(),
            original_length,
        };

        debug!(
            "[input] session={} words={}",
            session_id, metadata.word_count
        );

        ctx.input = Some(PreparedInput {
            message,
            session_id,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
            metadata,
        });
        ctx.mark(StageName::Input);
        Ok(())
    }
}
