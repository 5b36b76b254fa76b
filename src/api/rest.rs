// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Public endpoints (health) require no
// authentication. All other endpoints require a valid Bearer token checked via
// the `AuthBearer` extractor.
//
// The surface is read-only: the feed's parameters are fixed at construction
// time, so there are no control endpoints.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/markets", get(markets))
        .route("/api/v1/chart/:symbol", get(chart))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot (authenticated)
// =============================================================================

async fn full_state(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let snapshot = state.build_snapshot();
    Json(snapshot)
}

// =============================================================================
// Markets (authenticated)
// =============================================================================

async fn markets(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let config = state.runtime_config.read();
    let body = serde_json::json!({
        "markets": config.markets,
        "quote_symbol": config.quote_symbol,
        "chart": config.chart,
    });
    Json(body)
}

// =============================================================================
// Single chart (authenticated)
// =============================================================================

async fn chart(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    match state.chart_engine(&symbol) {
        Some(engine) => Json(engine.snapshot()).into_response(),
        None => {
            let body = serde_json::json!({
                "error": format!("unknown market: {symbol}"),
            });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}
