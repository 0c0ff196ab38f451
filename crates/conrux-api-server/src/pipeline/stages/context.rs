use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::Stage;
use crate::pipeline::context::{ContextSummary, PipelineContext, PreparedContext, StageName};
use crate::pipeline::error::StageError;
use crate::services::conversation::MemoryManager;

/// Default persona, v1. Changing this text changes golden outputs.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Conrux, an elite AI assistant created by Blacifer, powered by Google Gemini 2.0 Flash.
You are sophisticated, knowledgeable, and articulate. You provide thoughtful, accurate, and deeply helpful responses.
Maintain a professional yet warm tone. Format longer responses with markdown for clarity.
You remember the conversation history and build context across messages.";

/// Loads the windowed history for the session and picks the system instruction
pub struct ContextStage {
    memory: Arc<MemoryManager>,
    max_context_messages: usize,
}

impl ContextStage {
    pub fn new(memory: Arc<MemoryManager>, max_context_messages: usize) -> Self {
        Self {
            memory,
            max_context_messages,
        }
    }
}

#[async_trait]
impl Stage for ContextStage {
    fn name(&self) -> StageName {
        StageName::Context
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let session_id = ctx.prepared_input()?.session_id.clone();

        let system_instruction = ctx
            .system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .to_string();

        let history = self
            .memory
            .get_model_history(&session_id, Some(self.max_context_messages));

        debug!(
            "[context] session={} history_msgs={}",
            session_id,
            history.len()
        );

        ctx.context = Some(PreparedContext {
            summary: ContextSummary {
                history_message_count: history.len(),
                context_window_limit: self.max_context_messages,
            },
            history,
            system_instruction,
        });
        ctx.mark(StageName::Context);
        Ok(())
    }
}
