pub mod benchmark;
pub mod system;

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Local;

use crate::dto::HealthResponse;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let caps = state.capabilities;
    Json(HealthResponse {
        status: "healthy",
        timestamp: Local::now(),
        gpu_available: caps.gpu_metrics,
        gpu_demos_available: caps.benchmarks && caps.gpu_compute,
        gpu_compute_available: caps.gpu_compute,
    })
}
