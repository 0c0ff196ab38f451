use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::document::{PlainTextExtractor, TextExtractor};
use crate::pipeline::PipelineManager;
use crate::services::conversation::{MemoryConfig, MemoryManager};
use crate::services::gemini::GenerativeBackend;
use crate::services::model_client::{ModelClient, ModelSettings};
use crate::services::session::SessionManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub memory: Arc<MemoryManager>,
    pub sessions: Arc<SessionManager>,
    pub model_client: Arc<ModelClient>,
    pub pipeline: Arc<PipelineManager>,
    pub extractor: Arc<dyn TextExtractor>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the stores, model client and pipeline from settings.
    /// The backend is injected so tests can swap in a mock.
    pub fn new(settings: Settings, backend: Arc<dyn GenerativeBackend>) -> Self {
        let ttl = settings.session_ttl();

        let memory = Arc::new(MemoryManager::new(MemoryConfig {
            ttl,
            max_messages: settings.max_session_messages(),
        }));
        let sessions = Arc::new(SessionManager::new(ttl));

        let model_client = Arc::new(ModelClient::new(
            backend,
            ModelSettings::from_config(&settings.gemini, settings.pipeline.document_char_budget),
            settings.retry.clone(),
        ));

        let pipeline = Arc::new(PipelineManager::new(
            memory.clone(),
            sessions.clone(),
            model_client.clone(),
            &settings.pipeline,
        ));

        Self {
            settings: Arc::new(settings),
            memory,
            sessions,
            model_client,
            pipeline,
            extractor: Arc::new(PlainTextExtractor::new()),
            started_at: Instant::now(),
        }
    }
}
