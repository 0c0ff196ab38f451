pub mod settings;

pub use settings::{
    FilesConfig, GeminiConfig, PipelineConfig, RetryConfig, ServerConfig, SessionConfig, Settings,
};
