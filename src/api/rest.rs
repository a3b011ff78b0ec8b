// =============================================================================
// REST API Endpoints - Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Health is public; everything else
// requires a valid Bearer token checked via the `AuthBearer` extractor.
//
// CORS is configured permissively; the engine is meant to sit behind a
// trusted dashboard.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::error::EngineError;
use crate::runtime_config::ConfigUpdate;
use crate::types::now_ms;

// =============================================================================
// Router construction
// =============================================================================

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
        .route("/api/v1/decisions", get(decisions))
        .route("/api/v1/observations", post(add_observation))
        .route("/api/v1/feedback", post(feedback))
        .route("/api/v1/learning/reset", post(reset_learning))
        .route("/api/v1/config", get(get_config).post(set_config))
        .route("/api/v1/control/start", post(control_start))
        .route("/api/v1/control/stop", post(control_stop))
        // ── WebSocket ───────────────────────────────────────────────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::NoPendingPlan => StatusCode::CONFLICT,
            EngineError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    running: bool,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        running: state.is_running(),
        state_version: state.current_state_version(),
        server_time: now_ms(),
    })
}

// =============================================================================
// State & decisions (authenticated)
// =============================================================================

async fn full_state(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot(now_ms()))
}

async fn decisions(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let decisions = state.recent_decisions.read().clone();
    Json(decisions)
}

// =============================================================================
// Inputs (authenticated)
// =============================================================================

#[derive(Deserialize)]
struct ObservationRequest {
    #[serde(default)]
    instrument: Option<String>,
    price: f64,
}

#[derive(Serialize)]
struct ObservationResponse {
    count: usize,
}

async fn add_observation(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ObservationRequest>,
) -> Result<Json<ObservationResponse>, EngineError> {
    let count = state.add_observation(req.instrument.as_deref(), req.price, now_ms())?;
    Ok(Json(ObservationResponse { count }))
}

#[derive(Deserialize)]
struct FeedbackRequest {
    win: bool,
}

async fn feedback(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let report = state.report_outcome(req.win, now_ms())?;
    Ok(Json(report))
}

async fn reset_learning(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, EngineError> {
    state.reset_learning()?;
    warn!("learning data reset via API");
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

// =============================================================================
// Configuration (authenticated)
// =============================================================================

async fn get_config(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.runtime_config.read().clone();
    Json(config)
}

async fn set_config(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigUpdate>,
) -> Result<impl IntoResponse, EngineError> {
    let changes = state.update_config(update)?;
    let config = state.runtime_config.read().clone();
    Ok(Json(serde_json::json!({
        "config": config,
        "changes": changes,
    })))
}

// =============================================================================
// Control (authenticated)
// =============================================================================

#[derive(Serialize)]
struct ControlResponse {
    running: bool,
    message: &'static str,
}

async fn control_start(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let message = if state.start() {
        info!("evaluation started via API");
        "started"
    } else {
        "already running"
    };
    Json(ControlResponse {
        running: true,
        message,
    })
}

async fn control_stop(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let message = if state.stop() {
        info!("evaluation stopped via API");
        "stopped"
    } else {
        "already stopped"
    };
    Json(ControlResponse {
        running: false,
        message,
    })
}

// =============================================================================
// Tests
// =============================================================================
