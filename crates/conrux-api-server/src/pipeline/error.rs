use thiserror::Error;

use super::context::StageName;

/// Caller-supplied input that the pipeline refuses. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message cannot be empty.")]
    Empty,

    #[error("Message too long: {actual} chars (max {max}).")]
    TooLong { actual: usize, max: usize },

    #[error("Your message contains content that cannot be processed.")]
    Rejected,
}

/// What a single stage returns on failure
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Unexpected failure inside a stage, tagged with the stage that raised it
#[derive(Error, Debug)]
#[error("Pipeline failed at stage '{stage}': {source:#}")]
pub struct PipelineError {
    pub stage: StageName,
    #[source]
    pub source: anyhow::Error,
}

/// Error returned by `PipelineManager::run_chat`
#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ChatError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::Validation(_))
    }

    /// Stage that failed, for pipeline errors
    pub fn stage(&self) -> Option<StageName> {
        match self {
            ChatError::Validation(_) => None,
            ChatError::Pipeline(e) => Some(e.stage),
        }
    }
}
