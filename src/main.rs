use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{fmt, EnvFilter};

use caption_studio::{
    config::Config,
    gemini::GeminiClient,
    routes::{router, AppState},
    store::{CaptionStore, FilePersistence},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // No credential, no service.
    let config = Config::from_env().context("refusing to start")?;
    tracing::info!("Using API key: {} with model {}", config.redacted_key(), config.model);

    let (store, load_error) = CaptionStore::load(Box::new(FilePersistence::new(&config.captions_dir)));
    if let Some(e) = load_error {
        tracing::warn!("Starting with an empty caption list: {}", e);
    }

    let state = AppState::new(Arc::new(GeminiClient::from_config(&config)), store);

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, dir = %config.captions_dir.display(), "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
