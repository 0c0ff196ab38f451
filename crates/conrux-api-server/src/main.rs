use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use conrux_api_server::config::Settings;
use conrux_api_server::handlers::build_router;
use conrux_api_server::services::GeminiService;
use conrux_api_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,conrux_api_server=debug".into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("🚀 Starting Conrux API Server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let gemini = GeminiService::new(settings.gemini.clone())?;
    info!(
        "✅ Gemini client ready (text={}, vision={})",
        settings.gemini.text_model, settings.gemini.vision_model
    );

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let sweep_interval = settings.session.sweep_interval_seconds;

    let state = Arc::new(AppState::new(settings, Arc::new(gemini)));
    info!("✅ Memory, session and pipeline managers initialized");

    if sweep_interval > 0 {
        spawn_sweeper(state.clone(), Duration::from_secs(sweep_interval));
        info!("✅ Background session sweep every {}s", sweep_interval);
    }

    let app = build_router(state.clone());

    info!("🎯 Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let evicted = state.sessions.evict_expired();
    info!("✦ Shutdown complete. Evicted {} expired sessions.", evicted);

    Ok(())
}

/// Periodic eviction for both stores, on top of sweep-on-write
fn spawn_sweeper(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let buffers = state.memory.evict_expired();
            let sessions = state.sessions.evict_expired();
            if buffers + sessions > 0 {
                info!(
                    "Background sweep evicted {} conversation buffers, {} session records",
                    buffers, sessions
                );
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
