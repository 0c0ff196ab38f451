use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::context::{round_ms, ChatResult, PipelineContext, StageName};
use super::error::{ChatError, PipelineError, StageError};
use super::stages::{AiStage, ContextStage, InputStage, OutputStage, Stage};
use crate::config::PipelineConfig;
use crate::services::conversation::MemoryManager;
use crate::services::model_client::ModelClient;
use crate::services::session::SessionManager;

/// Raw inputs of one chat turn
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub message: String,
    pub session_id: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
}

/// Runs the fixed input → context → ai → output sequence
pub struct PipelineManager {
    stages: [Box<dyn Stage>; 4],
}

impl PipelineManager {
    pub fn new(
        memory: Arc<MemoryManager>,
        sessions: Arc<SessionManager>,
        model_client: Arc<ModelClient>,
        config: &PipelineConfig,
    ) -> Self {
        info!(
            "Initializing chat pipeline: max_input_length={}, max_context_messages={}, strict_extraction={}",
            config.max_input_length, config.max_context_messages, config.strict_extraction
        );

        Self {
            stages: [
                Box::new(InputStage::new(config.max_input_length)),
                Box::new(ContextStage::new(memory.clone(), config.max_context_messages)),
                Box::new(AiStage::new(model_client, config.strict_extraction)),
                Box::new(OutputStage::new(memory, sessions)),
            ],
        }
    }

    pub fn stage_names(&self) -> Vec<StageName> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Validation failures come back as-is; any other stage failure is
    /// logged and wrapped with the name of the stage that raised it.
    pub async fn run_chat(&self, input: ChatInput) -> Result<ChatResult, ChatError> {
        let start = Instant::now();
        let mut ctx = PipelineContext::new(
            input.message,
            input.session_id,
            input.system_prompt,
            input.temperature,
        );

        for stage in &self.stages {
            let name = stage.name();
            match stage.run(&mut ctx).await {
                Ok(()) => {}
                Err(StageError::Validation(e)) => {
                    debug!("[{}] validation failed: {}", name, e);
                    return Err(e.into());
                }
                Err(StageError::Failed(source)) => {
                    error!("Pipeline stage '{}' failed: {:#}", name, source);
                    return Err(PipelineError { stage: name, source }.into());
                }
            }
        }

        let mut result = ctx.result.take().ok_or_else(|| PipelineError {
            stage: StageName::Output,
            source: anyhow::anyhow!("output stage produced no result"),
        })?;
        result.total_pipeline_latency_ms = round_ms(start.elapsed().as_secs_f64() * 1000.0);

        info!(
            "Chat turn complete: session={} total={:.1}ms ai={:.1}ms",
            result.session_id, result.total_pipeline_latency_ms, result.ai_latency_ms
        );
        Ok(result)
    }
}
