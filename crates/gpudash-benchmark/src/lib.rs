pub mod backend;
pub mod cpu;
#[cfg(feature = "cuda")]
mod cuda;
pub mod gpu;
pub mod runner;
pub mod workload;

pub use backend::{BackendError, ComputeBackend, ImageSummary};
pub use cpu::CpuBackend;
#[cfg(feature = "cuda")]
pub use gpu::CudaBackend;
pub use gpu::detect_gpu_backend;
pub use runner::{BenchmarkRunner, RunnerError, GPU_UNAVAILABLE, MAX_INPUT_ELEMENTS};
pub use workload::Workload;
