mod gpu_monitor;
mod metrics_reader;

pub use gpu_monitor::{GpuMonitor, GpuMonitorError, GpuSource};
pub use metrics_reader::{MetricsError, MetricsSource, SystemMetricsReader};
