mod ai;
mod context;
mod input;
mod output;

pub use ai::AiStage;
pub use context::{ContextStage, DEFAULT_SYSTEM_PROMPT};
pub use input::InputStage;
pub use output::OutputStage;

use async_trait::async_trait;

use super::context::{PipelineContext, StageName};
use super::error::StageError;

/// One step of the chat pipeline. A stage reads the slots filled by the
/// stages before it, fills its own slot and records its name.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError>;
}
