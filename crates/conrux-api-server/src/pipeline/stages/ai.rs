use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::Stage;
use crate::pipeline::context::{round_ms, ModelReply, PipelineContext, StageName};
use crate::pipeline::error::StageError;
use crate::services::model_client::ModelClient;

/// Calls the model. Retry is the client's job, not this stage's.
pub struct AiStage {
    client: Arc<ModelClient>,
    strict_extraction: bool,
}

impl AiStage {
    pub fn new(client: Arc<ModelClient>, strict_extraction: bool) -> Self {
        Self {
            client,
            strict_extraction,
        }
    }
}

#[async_trait]
impl Stage for AiStage {
    fn name(&self) -> StageName {
        StageName::Ai
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let input = ctx.prepared_input()?;
        let prepared = ctx.prepared_context()?;
        let system_instruction = Some(prepared.system_instruction.as_str());

        let start = Instant::now();
        // An empty history never goes to the multi-turn entry point
        let result = if prepared.history.is_empty() {
            self.client
                .generate(&input.message, system_instruction, ctx.temperature)
                .await
        } else {
            self.client
                .generate_with_history(
                    &input.message,
                    &prepared.history,
                    system_instruction,
                    ctx.temperature,
                )
                .await
        };
        let text = result.map_err(anyhow::Error::new)?;
        let latency_ms = round_ms(start.elapsed().as_secs_f64() * 1000.0);

        let fallback = text.is_fallback();
        let text = if self.strict_extraction {
            text.into_strict().map_err(anyhow::Error::new)?
        } else {
            text.into_text()
        };

        debug!(
            "[ai] session={} latency={:.1}ms response_len={} fallback={}",
            input.session_id,
            latency_ms,
            text.len(),
            fallback
        );

        ctx.reply = Some(ModelReply {
            text,
            model_used: self.client.text_model().to_string(),
            latency_ms,
            fallback,
        });
        ctx.mark(StageName::Ai);
        Ok(())
    }
}
