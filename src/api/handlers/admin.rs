use crate::AppState;
use crate::services::storage_lifecycle::UploadDirStatus;
use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct SweepResponse {
    pub deleted: usize,
    pub max_age_minutes: u64,
    pub remaining: UploadDirStatus,
}

#[utoipa::path(
    post,
    path = "/admin/cleanup",
    responses(
        (status = 200, description = "Manual age sweep completed", body = SweepResponse)
    ),
    tag = "admin"
)]
pub async fn trigger_cleanup(State(state): State<AppState>) -> Json<SweepResponse> {
    let deleted = state
        .lifecycle
        .sweep_expired(state.config.cleanup_max_age())
        .await;
    tracing::info!("Manual cleanup removed {} file(s)", deleted);

    Json(SweepResponse {
        deleted,
        max_age_minutes: state.config.cleanup_max_age_minutes,
        remaining: state.lifecycle.status().await,
    })
}

#[utoipa::path(
    get,
    path = "/admin/uploads/status",
    responses(
        (status = 200, description = "Current upload directory usage", body = UploadDirStatus)
    ),
    tag = "admin"
)]
pub async fn upload_status(State(state): State<AppState>) -> Json<UploadDirStatus> {
    Json(state.lifecycle.status().await)
}
