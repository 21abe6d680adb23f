use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use game_release_tracker::{api, ReleaseTracker, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_tracker_server=info,game_release_tracker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    tracing::info!("🚀 Starting Game Release Tracker API");
    tracing::info!("📦 Database: {}", settings.database_url);
    tracing::info!("⏱️ Cache TTL: {}s, upstream rate: {}/s", settings.cache_ttl, settings.requests_per_second);

    let tracker = Arc::new(ReleaseTracker::from_settings(&settings).await?);

    let health = tracker.health().await;
    if health.is_healthy() {
        tracing::info!("✅ IGDB API and cache database reachable");
    } else if !health.upstream_api {
        tracing::warn!("⚠️ IGDB API unreachable at start-up, serving cache only until it recovers");
    } else {
        tracing::warn!("⚠️ Cache database did not answer the start-up ping");
    }

    let app = api::create_router(tracker);

    let addr = settings.bind_addr();
    tracing::info!("🎮 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Shutting down Game Release Tracker API");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
