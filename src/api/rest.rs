// =============================================================================
// REST API Endpoints — Axum 0.7, strictly read-only
// =============================================================================
//
// The dashboard is an external collaborator: it reads state, it never
// drives the engine. Three endpoints: a health probe, the full status
// snapshot, and the risk view. CORS is permissive for development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;

/// Build the read-only router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/state", get(full_state))
        .route("/api/risk", get(risk_status))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    cycle_count: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cycle_count: state.cycle_count.load(std::sync::atomic::Ordering::SeqCst),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

/// Full engine snapshot: last account state, risk counters, cycle stats,
/// active trades, and the recent-error ring buffer.
async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_status())
}

async fn risk_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.risk.status())
}
