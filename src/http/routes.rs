//! HTTP route definitions

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::history::{SessionRecord, Steam64};
use crate::store::StoreError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    let cors = match &state.config.client_origin {
        Some(origins) => {
            let allowed_origins: Vec<header::HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
                .collect();
            cors.allow_origin(allowed_origins)
        }
        None => cors.allow_origin(Any),
    };

    let api_routes = Router::new()
        .route("/session", post(save_session_handler).fallback(api_not_found))
        .route("/history/:steam64", get(history_handler).fallback(api_not_found))
        .fallback(api_not_found);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes);

    if let Some(dir) = &state.config.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
    stored_sessions: Option<u64>,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stored_sessions = match state.session_store.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to count stored sessions");
            None
        }
    };

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_sessions: state.session_registry.active_sessions(),
        stored_sessions,
    })
}

// ============================================================================
// History API
// ============================================================================

#[derive(Serialize)]
struct SaveResponse {
    ok: bool,
}

#[derive(Serialize)]
struct HistoryResponse {
    sessions: Vec<SessionRecord>,
}

async fn save_session_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SaveResponse>, ApiError> {
    let mut record: SessionRecord =
        serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJson)?;

    let steam64 = record
        .steam64
        .as_deref()
        .ok_or(ApiError::InvalidSteam64)
        .and_then(|raw| Steam64::parse(raw).map_err(|_| ApiError::InvalidSteam64))?;

    if record.grade.is_empty() {
        record.grade = "N/A".to_string();
    }
    if record.timestamp == 0 {
        record.timestamp = chrono::Utc::now().timestamp_millis();
    }

    let id = state
        .session_store
        .insert(steam64.clone(), record)
        .await
        .map_err(ApiError::SaveFailed)?;

    tracing::info!(steam64 = %steam64, id, "Session stored");
    Ok(Json(SaveResponse { ok: true }))
}

async fn history_handler(
    State(state): State<AppState>,
    Path(steam64): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let steam64 = Steam64::parse(&steam64).map_err(|_| ApiError::InvalidSteam64)?;

    let sessions = state
        .session_store
        .recent(steam64)
        .await
        .map_err(ApiError::LoadFailed)?;

    Ok(Json(HistoryResponse { sessions }))
}

async fn api_not_found() -> ApiError {
    ApiError::NotFound
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Invalid steam64")]
    InvalidSteam64,

    #[error("Not found")]
    NotFound,

    #[error("Failed to save session")]
    SaveFailed(#[source] StoreError),

    #[error("Failed to load history")]
    LoadFailed(#[source] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::InvalidJson | ApiError::InvalidSteam64 => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::SaveFailed(e) | ApiError::LoadFailed(e) => {
                tracing::error!(error = %e, "{}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
