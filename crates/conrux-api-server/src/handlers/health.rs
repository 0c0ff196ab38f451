use crate::models::chat::{ApiResponse, HealthStatus, ModelInfo, SupportedFileTypes};
use crate::state::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthStatus>> {
    let gemini_status = match state.model_client.test_connection().await {
        Ok(_) => "connected".to_string(),
        Err(e) => {
            warn!("Gemini connectivity check failed: {}", e);
            let detail: String = e.to_string().chars().take(60).collect();
            format!("error: {}", detail)
        }
    };

    let uptime = state.started_at.elapsed().as_secs_f64();
    Json(ApiResponse::success(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        gemini_status,
        active_sessions: state.sessions.count(),
        uptime_seconds: (uptime * 10.0).round() / 10.0,
        timestamp: Utc::now(),
    }))
}

pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<ApiResponse<ModelInfo>> {
    let settings = &state.settings;
    Json(ApiResponse::success(ModelInfo {
        text_model: settings.gemini.text_model.clone(),
        vision_model: settings.gemini.vision_model.clone(),
        max_tokens: settings.gemini.max_tokens,
        temperature: settings.gemini.temperature,
        max_context_messages: settings.pipeline.max_context_messages,
        max_input_length: settings.pipeline.max_input_length,
        session_ttl_seconds: settings.session.ttl_seconds,
        max_upload_mb: settings.server.max_upload_mb,
        supported_file_types: SupportedFileTypes {
            text: settings.files.text_formats.clone(),
            image: settings.files.image_formats.clone(),
        },
        pipeline_stages: state.pipeline.stage_names(),
    }))
}
