use std::sync::Arc;

use axum::{extract::State, Json};
use gpudash_core::SystemSnapshot;

use crate::dto::GpuInfoResponse;
use crate::error::AppError;
use crate::services;
use crate::state::AppState;

pub async fn system_info(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemSnapshot>, AppError> {
    Ok(Json(services::system::snapshot(&state).await?))
}

pub async fn gpu_info(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GpuInfoResponse>, AppError> {
    Ok(Json(services::system::gpu_info(&state).await?))
}
