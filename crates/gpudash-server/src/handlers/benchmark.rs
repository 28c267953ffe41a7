use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use gpudash_core::{BenchmarkResult, ExecutionTarget};

use crate::dto::BenchmarkRequest;
use crate::error::AppError;
use crate::services;
use crate::state::AppState;

pub async fn gpu_benchmark(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BenchmarkRequest>, JsonRejection>,
) -> Result<Json<BenchmarkResult>, AppError> {
    let Json(req) = payload?;
    let result = services::benchmark::run(&state, req, ExecutionTarget::Gpu).await?;
    Ok(Json(result))
}

pub async fn cpu_benchmark(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BenchmarkRequest>, JsonRejection>,
) -> Result<Json<BenchmarkResult>, AppError> {
    let Json(req) = payload?;
    let result = services::benchmark::run(&state, req, ExecutionTarget::Cpu).await?;
    Ok(Json(result))
}
