//! Detect cycle and orchestrator status

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::ApiResult;
use crate::services::orchestrator::{CycleReport, CycleState, TerminalRecord};
use crate::AppState;

/// Orchestrator status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: CycleState,
    pub models_ready: bool,
    pub camera_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<TerminalRecord>,
}

/// POST /detect
///
/// Runs one capture → classify → decide → query cycle. A request while a
/// cycle is running is rejected with 409.
pub async fn detect(State(state): State<AppState>) -> ApiResult<Json<CycleReport>> {
    let report = state.orchestrator.detect().await?;
    Ok(Json(report))
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let orchestrator = &state.orchestrator;
    Json(StatusResponse {
        state: orchestrator.state(),
        models_ready: orchestrator.classifier().is_ready(),
        camera_active: orchestrator.camera().is_active(),
        last_outcome: orchestrator.last_outcome(),
    })
}

/// Build detect routes
pub fn detect_routes() -> Router<AppState> {
    Router::new()
        .route("/detect", post(detect))
        .route("/status", get(status))
}
