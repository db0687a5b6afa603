//! Camera session and PTZ endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;

use camrelay_core::models::{ConnectOutcome, ConnectRequest};
use camrelay_core::ptz::PtzRequest;
use camrelay_core::stream::StreamStatus;

use crate::http::{AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub outcome: ConnectOutcome,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /api/connect
pub async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> AppResult<Json<ConnectResponse>> {
    let Json(request) = payload?;
    let outcome = state.sessions.connect(request).await?;
    Ok(Json(ConnectResponse {
        message: "Camera connected",
        outcome,
    }))
}

/// POST /api/ptz/move
pub async fn move_camera(
    State(state): State<AppState>,
    payload: Result<Json<PtzRequest>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Json(request) = payload?;
    state.ptz.move_camera(request).await?;
    Ok(Json(MessageResponse {
        message: "PTZ command sent",
    }))
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> AppResult<Json<StreamStatus>> {
    Ok(Json(state.coordinator.status().await?))
}
