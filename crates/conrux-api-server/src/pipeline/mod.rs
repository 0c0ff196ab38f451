pub mod context;
pub mod error;
pub mod manager;
pub mod stages;

pub use context::{ChatResult, ContextSummary, InputMetadata, StageName};
pub use error::{ChatError, PipelineError, ValidationError};
pub use manager::{ChatInput, PipelineManager};
