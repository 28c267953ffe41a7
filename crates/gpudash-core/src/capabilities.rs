use serde::Serialize;

/// Which optional backends loaded at startup. Built once and handed to every
/// component; never changes afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// GPU device metrics (NVML) are readable.
    pub gpu_metrics: bool,
    /// The benchmark runner initialized.
    pub benchmarks: bool,
    /// A GPU numeric backend is loaded.
    pub gpu_compute: bool,
}

impl Capabilities {
    pub fn new(gpu_metrics: bool, benchmarks: bool, gpu_compute: bool) -> Self {
        Self {
            gpu_metrics,
            benchmarks,
            gpu_compute,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}
