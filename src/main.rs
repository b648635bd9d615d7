use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sayit::{
    abuse, api, auth, config::GameConfig, jobs, state::AppState, store::MemoryStore,
};

const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sayit=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Say It store host...");

    let config = GameConfig::from_env();
    let state = Arc::new(AppState::new(
        Arc::new(MemoryStore::new()),
        config,
        auth::AuthConfig::from_env(),
        abuse::AbuseConfig::from_env(),
    ));

    jobs::spawn_cleanup_job(state.store.clone(), state.config.clone());
    jobs::spawn_auto_hide_job(state.store.clone(), state.config.auto_hide_report_threshold);
    abuse::spawn_rate_limiter_cleanup(state.abuse.clone());

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
