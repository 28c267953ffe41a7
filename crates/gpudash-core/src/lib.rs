// Domain modules
pub mod benchmark_type;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod metrics;
pub mod system;

pub use benchmark_type::{BenchmarkType, ExecutionTarget};
pub use capabilities::Capabilities;
pub use config::{BenchmarkDefaults, BroadcastConfig, GpuDashConfig, MetricsConfig, ServerConfig};
pub use error::{GpuDashError, Result};
pub use metrics::{speedup, BenchmarkComparison, BenchmarkParams, BenchmarkResult, DEFAULT_BENCHMARK_SIZE};
pub use system::{
    CpuFrequency, CpuUsage, DiskUsage, GpuRecord, MemoryUsage, NetworkCounters, SystemSnapshot,
};
