use std::sync::Arc;

use crew_router::config::Config;
use crew_router::error::AppError;
use crew_router::llm::{LlmBackend, OllamaBackend};
use crew_router::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let backend = OllamaBackend::new(
        config.llm_base_url.clone(),
        config.llm_model.clone(),
        config.llm_timeout(),
        config.llm_health_timeout(),
    )?;
    if !backend.is_available().await {
        tracing::warn!(base_url = %config.llm_base_url, "llm backend not reachable at startup");
    }

    let shared_state = Arc::new(AppState::new(
        Arc::new(backend),
        config.orchestrator_settings(),
    ));
    let app = crew_router::api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        model = %config.llm_model,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
