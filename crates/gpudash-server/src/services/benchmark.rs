use std::sync::Arc;

use gpudash_benchmark::BenchmarkRunner;
use gpudash_core::{BenchmarkComparison, BenchmarkResult, BenchmarkType, ExecutionTarget};
use tracing::{error, info};

use crate::dto::BenchmarkRequest;
use crate::error::{
    AppError, CPU_BENCHMARK_UNAVAILABLE, GPU_DEMOS_UNAVAILABLE, UNKNOWN_BENCHMARK,
    WS_BENCHMARK_UNSUPPORTED,
};
use crate::state::AppState;

fn runner(state: &AppState) -> Result<Arc<BenchmarkRunner>, AppError> {
    state
        .runner
        .clone()
        .ok_or_else(|| AppError::BadRequest(GPU_DEMOS_UNAVAILABLE.to_string()))
}

/// GPU work needs a runner with a compute backend behind it.
fn gpu_runner(state: &AppState) -> Result<Arc<BenchmarkRunner>, AppError> {
    let runner = runner(state)?;
    if !state.capabilities.gpu_compute || !runner.has_gpu() {
        return Err(AppError::BadRequest(GPU_DEMOS_UNAVAILABLE.to_string()));
    }
    Ok(runner)
}

fn requested_kind(req: &BenchmarkRequest) -> &str {
    req.kind
        .as_deref()
        .unwrap_or(BenchmarkType::MatrixMultiply.as_str())
}

/// Resolves the request for `target`, failing with the message each route
/// reports for an unusable kind.
fn resolve(req: &BenchmarkRequest, target: ExecutionTarget) -> Result<BenchmarkType, AppError> {
    let parsed = requested_kind(req).parse::<BenchmarkType>();
    match target {
        ExecutionTarget::Gpu => {
            parsed.map_err(|_| AppError::BadRequest(UNKNOWN_BENCHMARK.to_string()))
        }
        ExecutionTarget::Cpu => match parsed {
            Ok(kind) if kind.has_cpu_variant() => Ok(kind),
            _ => Err(AppError::BadRequest(CPU_BENCHMARK_UNAVAILABLE.to_string())),
        },
    }
}

/// A result carrying its own `error` is still a successful call; only a
/// crashed task maps to `Internal`.
pub async fn run(
    state: &Arc<AppState>,
    req: BenchmarkRequest,
    target: ExecutionTarget,
) -> Result<BenchmarkResult, AppError> {
    let runner = match target {
        ExecutionTarget::Gpu => gpu_runner(state)?,
        ExecutionTarget::Cpu => runner(state)?,
    };
    let kind = resolve(&req, target)?;
    info!(kind = %kind, target = %target, size = ?req.size, "Running benchmark");

    tokio::task::spawn_blocking(move || runner.run(kind, target, req.size))
        .await
        .map_err(|e| {
            error!("Benchmark task failed: {}", e);
            AppError::Internal(e.to_string())
        })
}

/// GPU then CPU matrix multiply for the live channel; other kinds are refused.
pub async fn compare(
    state: &Arc<AppState>,
    req: BenchmarkRequest,
) -> Result<BenchmarkComparison, AppError> {
    let runner = gpu_runner(state)?;
    if requested_kind(&req) != BenchmarkType::MatrixMultiply.as_str() {
        return Err(AppError::BadRequest(WS_BENCHMARK_UNSUPPORTED.to_string()));
    }
    info!(size = ?req.size, "Running GPU/CPU comparison");

    tokio::task::spawn_blocking(move || runner.compare_matrix_multiply(req.size))
        .await
        .map_err(|e| {
            error!("Comparison task failed: {}", e);
            AppError::Internal(e.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(kind: Option<&str>) -> BenchmarkRequest {
        BenchmarkRequest {
            kind: kind.map(str::to_string),
            size: None,
        }
    }

    #[test]
    fn test_resolve_defaults_to_matrix_multiply() {
        let kind = resolve(&req(None), ExecutionTarget::Gpu).unwrap();
        assert_eq!(kind, BenchmarkType::MatrixMultiply);
    }

    #[test]
    fn test_resolve_unknown_kind() {
        let err = resolve(&req(Some("quantum")), ExecutionTarget::Gpu).unwrap_err();
        assert_eq!(err.message(), UNKNOWN_BENCHMARK);

        let err = resolve(&req(Some("quantum")), ExecutionTarget::Cpu).unwrap_err();
        assert_eq!(err.message(), CPU_BENCHMARK_UNAVAILABLE);
    }

    #[test]
    fn test_resolve_cpu_only_matrix() {
        assert!(resolve(&req(Some("matrix_multiply")), ExecutionTarget::Cpu).is_ok());
        let err = resolve(&req(Some("image_processing")), ExecutionTarget::Cpu).unwrap_err();
        assert_eq!(err.message(), CPU_BENCHMARK_UNAVAILABLE);
    }
}
