//! Camera session control

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;

use crate::error::ApiResult;
use crate::AppState;

/// Camera state after a start/stop request
#[derive(Debug, Serialize)]
pub struct CameraResponse {
    pub camera_active: bool,
}

/// POST /camera/start
///
/// Opens the exclusive capture session.
pub async fn start_camera(State(state): State<AppState>) -> ApiResult<Json<CameraResponse>> {
    let camera = state.orchestrator.camera();
    camera.start().await?;
    Ok(Json(CameraResponse {
        camera_active: camera.is_active(),
    }))
}

/// POST /camera/stop
///
/// Releases the capture device.
pub async fn stop_camera(State(state): State<AppState>) -> ApiResult<Json<CameraResponse>> {
    let camera = state.orchestrator.camera();
    camera.stop().await?;
    Ok(Json(CameraResponse {
        camera_active: camera.is_active(),
    }))
}

/// Build camera routes
pub fn camera_routes() -> Router<AppState> {
    Router::new()
        .route("/camera/start", post(start_camera))
        .route("/camera/stop", post(stop_camera))
}
