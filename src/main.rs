use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use product_studio::{
    config::Config,
    gemini::GeminiClient,
    routes::{router, AppState},
    session::{FileStore, InMemoryStore, SessionStore},
};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    tracing::info!("Using API key: {}", config.masked_key());
    let gemini = GeminiClient::new(&config);
    if gemini.is_demo() {
        tracing::warn!("🧪 No GEMINI_API_KEY set, running in demo mode with placeholder images");
    }

    let store: Arc<dyn SessionStore> = match &config.data_dir {
        Some(dir) => {
            tracing::info!("💾 Persisting sessions under {}", dir.display());
            Arc::new(FileStore::open(dir.clone()).await.with_context(|| format!("cannot open {}", dir.display()))?)
        }
        None => Arc::new(InMemoryStore::new()),
    };
    let state = AppState::new(Arc::new(gemini), store);

    let app = router(state).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("cannot bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
