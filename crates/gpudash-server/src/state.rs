use std::sync::Arc;

use gpudash_benchmark::{BenchmarkRunner, ComputeBackend};
use gpudash_core::{Capabilities, GpuDashConfig};
use gpudash_services::{GpuMonitor, GpuSource, MetricsSource, SystemMetricsReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shared by every handler, socket session and the broadcast loop.
pub struct AppState {
    pub capabilities: Capabilities,
    pub metrics: Arc<dyn MetricsSource>,
    pub gpu: Option<Arc<dyn GpuSource>>,
    pub runner: Option<Arc<BenchmarkRunner>>,
    pub events: broadcast::Sender<String>,
}

impl AppState {
    /// Opens NVML and builds the benchmark runner. Anything that fails to
    /// load is logged and left out; the server still starts.
    pub fn new(config: &GpuDashConfig, gpu_backend: Option<Arc<dyn ComputeBackend>>) -> Self {
        let gpu = GpuMonitor::detect();
        let metrics = Arc::new(SystemMetricsReader::new(&config.metrics, gpu.clone()));

        let runner = match BenchmarkRunner::new(&config.benchmarks, gpu_backend) {
            Ok(runner) => Some(Arc::new(runner)),
            Err(e) => {
                warn!("Benchmarks unavailable: {}", e);
                None
            }
        };

        Self::from_parts(metrics, gpu, runner, config.broadcast.capacity)
    }

    pub fn from_parts(
        metrics: Arc<dyn MetricsSource>,
        gpu: Option<Arc<dyn GpuSource>>,
        runner: Option<Arc<BenchmarkRunner>>,
        capacity: usize,
    ) -> Self {
        let capabilities = Capabilities::new(
            gpu.is_some(),
            runner.is_some(),
            runner.as_ref().is_some_and(|r| r.has_gpu()),
        );
        info!(
            gpu_available = capabilities.gpu_metrics,
            gpu_demos_available = capabilities.benchmarks,
            gpu_compute_available = capabilities.gpu_compute,
            "Capabilities detected"
        );

        let (events, _) = broadcast::channel(capacity.max(1));

        Self {
            capabilities,
            metrics,
            gpu,
            runner,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}
