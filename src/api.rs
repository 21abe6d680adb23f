//! HTTP read API over [`ReleaseTracker`].

use axum::{
    extract::{rejection::QueryRejection, Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::{GamesResponse, HealthReport, PlatformsResponse};
use crate::engine::{parse_platform_ids, ReleaseTracker, UpcomingQuery};
use crate::error::TrackerError;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<ReleaseTracker>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingParams {
    days_ahead: Option<u32>,
    limit: Option<usize>,
    /// Comma-separated platform ids
    platform_ids: Option<String>,
    force_refresh: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PlatformsParams {
    force_refresh: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct SyncStarted {
    status: &'static str,
}

const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Build the router with all read endpoints and the sync trigger
pub fn create_router(tracker: Arc<ReleaseTracker>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/games/upcoming", get(upcoming_handler))
        .route("/games/search", get(search_handler))
        .route("/platforms", get(platforms_handler))
        .route("/sync", post(sync_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { tracker })
}

async fn index_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Game Release Tracker API",
        "version": crate::VERSION,
        "endpoints": {
            "upcoming_games": "/games/upcoming",
            "search_games": "/games/search",
            "platforms": "/platforms",
            "sync_data": "/sync",
            "health": "/health"
        }
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.tracker.health().await)
}

async fn upcoming_handler(
    State(state): State<AppState>,
    params: Result<Query<UpcomingParams>, QueryRejection>,
) -> Result<Json<GamesResponse>, AppError> {
    let Query(params) = params.map_err(invalid_query)?;
    let defaults = UpcomingQuery::default();

    let query = UpcomingQuery {
        days_ahead: params.days_ahead.unwrap_or(defaults.days_ahead),
        limit: params.limit.unwrap_or(defaults.limit),
        platform_ids: match params.platform_ids.as_deref() {
            Some(raw) => parse_platform_ids(raw)?,
            None => None,
        },
        force_refresh: params.force_refresh.unwrap_or(false),
    };

    let games = state.tracker.get_upcoming(&query).await?;
    Ok(Json(GamesResponse::new(games)))
}

async fn search_handler(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<GamesResponse>, AppError> {
    let Query(params) = params.map_err(invalid_query)?;
    let q = params.q.unwrap_or_default();

    let games = state
        .tracker
        .search(&q, params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .await?;
    Ok(Json(GamesResponse::new(games)))
}

async fn platforms_handler(
    State(state): State<AppState>,
    params: Result<Query<PlatformsParams>, QueryRejection>,
) -> Result<Json<PlatformsResponse>, AppError> {
    let Query(params) = params.map_err(invalid_query)?;

    let platforms = state
        .tracker
        .list_platforms(params.force_refresh.unwrap_or(false))
        .await?;
    Ok(Json(PlatformsResponse::new(platforms)))
}

async fn sync_handler(State(state): State<AppState>) -> impl IntoResponse {
    // detached: the task logs its own outcome
    let _handle = state.tracker.trigger_sync();
    tracing::info!("Background sync started");

    (StatusCode::ACCEPTED, Json(SyncStarted { status: "started" }))
}

fn invalid_query(rejection: QueryRejection) -> AppError {
    AppError(TrackerError::Validation(rejection.body_text()))
}

// Error handling
pub struct AppError(TrackerError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            TrackerError::Validation(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            TrackerError::UpstreamAuth(_) => (
                StatusCode::BAD_GATEWAY,
                "Authentication with the game catalog failed".to_string(),
            ),
            TrackerError::UpstreamRequest(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Game catalog is unavailable, try again later".to_string(),
            ),
            e if e.is_cache_unavailable() => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Cache database is unavailable".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        // full detail stays in the logs
        tracing::error!("❌ {} - {}", status, self.0);

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<TrackerError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
