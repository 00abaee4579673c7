use anyhow::Context;
use cloud_architect::{
    config::Config,
    diagram::{DiagramConfig, DiagramRenderer},
    gemini::GeminiClient,
    generation::GenerationClient,
    routes::{router, AppState},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    tracing::info!("Using API key: {}", config.masked_key());
    tracing::info!(model = %config.model, thinking_budget = config.thinking_budget, "Generation backend configured");

    let diagram_config = DiagramConfig::default();
    tracing::info!(theme = ?diagram_config.theme, font = %diagram_config.font_family, "Diagram renderer configured");
    let _ = DiagramConfig::init(diagram_config);

    let backend = GeminiClient::new(config.api_key.clone(), config.api_base.clone(), config.model.clone());
    let state = AppState {
        generator: Arc::new(GenerationClient::new(Arc::new(backend)).with_thinking_budget(config.thinking_budget)),
        diagram: Arc::new(DiagramRenderer::new()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
