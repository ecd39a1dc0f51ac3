use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::error::StoreError;
use crate::request_log::LogEntry;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BanStatus {
    pub address: String,
    pub banned: bool,
    pub changed: bool,
}

// Admin failures reported as 500 with a JSON body
#[derive(Debug)]
pub struct AdminError(String);

impl From<StoreError> for AdminError {
    fn from(e: StoreError) -> Self {
        AdminError(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AdminError {
    fn from(e: tokio::task::JoinError) -> Self {
        AdminError(format!("task failed: {}", e))
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "admin request failed");
        let body = serde_json::json!({ "error": self.0 });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub async fn list_bans(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.gatekeeper.banned().into_iter().collect())
}

pub async fn ban_address(
    State(state): State<Arc<AppState>>,
    Path(addr): Path<String>,
) -> Result<(StatusCode, Json<BanStatus>), AdminError> {
    let gatekeeper = Arc::clone(&state.gatekeeper);
    let target = addr.clone();
    let changed = tokio::task::spawn_blocking(move || gatekeeper.ban(&target)).await??;

    let status = if changed { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(BanStatus {
            address: addr,
            banned: true,
            changed,
        }),
    ))
}

pub async fn unban_address(
    State(state): State<Arc<AppState>>,
    Path(addr): Path<String>,
) -> Result<(StatusCode, Json<BanStatus>), AdminError> {
    let gatekeeper = Arc::clone(&state.gatekeeper);
    let target = addr.clone();
    let changed = tokio::task::spawn_blocking(move || gatekeeper.unban(&target)).await??;

    let status = if changed { StatusCode::OK } else { StatusCode::NOT_FOUND };
    Ok((
        status,
        Json(BanStatus {
            address: addr,
            banned: false,
            changed,
        }),
    ))
}

pub async fn list_logs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<LogEntry>>, AdminError> {
    let gatekeeper = Arc::clone(&state.gatekeeper);
    let logs = tokio::task::spawn_blocking(move || gatekeeper.logs()).await?;
    Ok(Json(logs))
}
