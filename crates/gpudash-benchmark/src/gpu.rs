use std::sync::Arc;

#[cfg(feature = "cuda")]
use tracing::info;
use tracing::warn;

use crate::backend::ComputeBackend;

#[cfg(feature = "cuda")]
pub use crate::cuda::CudaBackend;

/// Opens the first CUDA device. `None` means GPU benchmarks are unavailable
/// for the lifetime of the process.
#[cfg(feature = "cuda")]
pub fn detect_gpu_backend() -> Option<Arc<dyn ComputeBackend>> {
    match CudaBackend::open(0) {
        Ok(backend) => {
            info!("cuBLAS compute backend initialized on {}", backend.name());
            Some(Arc::new(backend))
        }
        Err(e) => {
            warn!("GPU compute unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "cuda"))]
pub fn detect_gpu_backend() -> Option<Arc<dyn ComputeBackend>> {
    warn!("GPU compute unavailable: built without the cuda feature");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_no_backend_without_cuda_feature() {
        assert!(detect_gpu_backend().is_none());
    }
}
