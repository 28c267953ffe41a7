use std::sync::Arc;

use gpudash_core::SystemSnapshot;
use tracing::error;

use crate::dto::GpuInfoResponse;
use crate::error::{AppError, GPU_UNAVAILABLE};
use crate::state::AppState;

pub async fn snapshot(state: &Arc<AppState>) -> Result<SystemSnapshot, AppError> {
    let metrics = state.metrics.clone();
    tokio::task::spawn_blocking(move || metrics.read_snapshot())
        .await
        .map_err(|e| {
            error!("Metrics task failed: {}", e);
            AppError::Internal(e.to_string())
        })?
        .map_err(|e| {
            error!("Error getting system info: {}", e);
            AppError::Internal(e.to_string())
        })
}

/// An absent GPU source is a normal answer, not an error.
pub async fn gpu_info(state: &Arc<AppState>) -> Result<GpuInfoResponse, AppError> {
    let Some(gpu) = state.gpu.clone() else {
        return Ok(GpuInfoResponse::Unavailable {
            error: GPU_UNAVAILABLE.to_string(),
        });
    };

    let gpus = tokio::task::spawn_blocking(move || gpu.gpus())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| {
            error!("Error getting GPU info: {}", e);
            AppError::Internal(e.to_string())
        })?;

    Ok(GpuInfoResponse::Devices { gpus })
}
