pub mod analyze;
pub mod chat;
pub mod health;

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::warn;

/// Multipart framing on top of the raw file size
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    let settings = state.settings.clone();

    let api = Router::new()
        .route("/health", get(health::health_check))
        .route("/info", get(health::model_info))
        .route("/chat", post(chat::chat_handler))
        .route("/chat/session", post(chat::create_session_handler))
        .route("/chat/sessions", get(chat::list_sessions_handler))
        .route(
            "/chat/history/{session_id}",
            get(chat::get_history_handler).delete(chat::clear_history_handler),
        )
        .route("/analyze/image", post(analyze::analyze_image_handler))
        .route("/analyze/document", post(analyze::analyze_document_handler));

    Router::new()
        .nest(&settings.server.api_prefix, api)
        .with_state(state)
        .layer(CatchPanicLayer::new())
        .layer(cors_layer(&settings.server.allowed_origins))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default()),
        )
        .layer(DefaultBodyLimit::max(
            settings.max_upload_bytes() + UPLOAD_OVERHEAD_BYTES,
        ))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
