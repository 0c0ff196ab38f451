use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::Stage;
use crate::pipeline::context::{ChatResult, PipelineContext, StageName};
use crate::pipeline::error::StageError;
use crate::services::conversation::{MemoryManager, Role};
use crate::services::session::SessionManager;

/// Persists the turn and assembles the result payload
pub struct OutputStage {
    memory: Arc<MemoryManager>,
    sessions: Arc<SessionManager>,
}

impl OutputStage {
    pub fn new(memory: Arc<MemoryManager>, sessions: Arc<SessionManager>) -> Self {
        Self { memory, sessions }
    }
}

#[async_trait]
impl Stage for OutputStage {
    fn name(&self) -> StageName {
        StageName::Output
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let input = ctx.prepared_input()?;
        let prepared = ctx.prepared_context()?;
        let reply = ctx.model_reply()?;
        let session_id = input.session_id.as_str();

        // User first, then assistant: history is rebuilt in insertion order
        self.memory
            .add_message(session_id, Role::User, input.message.clone());
        self.memory
            .add_message(session_id, Role::Assistant, reply.text.clone());
        self.sessions.touch(session_id);

        let message_id = Uuid::new_v4().to_string();
        let mut pipeline_stages = ctx.stages.clone();
        pipeline_stages.push(StageName::Output);

        debug!(
            "[output] session={} msg_id={} response_len={}",
            session_id,
            &message_id[..8],
            reply.text.len()
        );

        let result = ChatResult {
            response: reply.text.clone(),
            session_id: session_id.to_string(),
            message_id,
            model: reply.model_used.clone(),
            ai_latency_ms: reply.latency_ms,
            pipeline_stages,
            context_info: prepared.summary.clone(),
            input_metadata: input.metadata.clone(),
            response_fallback: reply.fallback,
            total_pipeline_latency_ms: 0.0,
        };

        ctx.result = Some(result);
        ctx.mark(StageName::Output);
        Ok(())
    }
}
