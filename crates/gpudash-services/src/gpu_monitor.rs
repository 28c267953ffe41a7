use std::sync::Arc;

use gpudash_core::GpuRecord;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "nvml")]
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
#[cfg(feature = "nvml")]
use nvml_wrapper::Nvml;

#[derive(Error, Debug)]
pub enum GpuMonitorError {
    #[cfg(feature = "nvml")]
    #[error("NVML error: {0}")]
    Nvml(#[from] nvml_wrapper::error::NvmlError),
    #[error("GPU monitoring not supported: {0}")]
    Unsupported(String),
    #[error("GPU query failed: {0}")]
    QueryFailed(String),
}

/// Anything that can list the host's GPUs.
pub trait GpuSource: Send + Sync {
    fn gpus(&self) -> Result<Vec<GpuRecord>, GpuMonitorError>;
}

/// GPU device metrics read through NVML.
pub struct GpuMonitor {
    #[cfg(feature = "nvml")]
    nvml: Nvml,
}

impl GpuMonitor {
    #[cfg(feature = "nvml")]
    pub fn init() -> Result<Self, GpuMonitorError> {
        let nvml = Nvml::init()?;
        Ok(Self { nvml })
    }

    #[cfg(not(feature = "nvml"))]
    pub fn init() -> Result<Self, GpuMonitorError> {
        Err(GpuMonitorError::Unsupported(
            "built without the `nvml` feature".to_string(),
        ))
    }

    /// Opens NVML once. `None` means GPU metrics are unavailable for the
    /// lifetime of the process.
    pub fn detect() -> Option<Arc<dyn GpuSource>> {
        match Self::init() {
            Ok(monitor) => {
                info!("NVML GPU monitor initialized");
                Some(Arc::new(monitor))
            }
            Err(e) => {
                warn!("GPU metrics unavailable: {}", e);
                None
            }
        }
    }
}

#[cfg(feature = "nvml")]
impl GpuSource for GpuMonitor {
    #[instrument(skip(self))]
    fn gpus(&self) -> Result<Vec<GpuRecord>, GpuMonitorError> {
        let count = self.nvml.device_count()?;
        debug!("Reading {} NVML device(s)", count);

        let mut records = Vec::with_capacity(count as usize);
        for index in 0..count {
            let device = self.nvml.device_by_index(index)?;
            let memory = device.memory_info()?;
            let utilization = device.utilization_rates()?;

            records.push(GpuRecord {
                id: index,
                name: device.name()?,
                load: f64::from(utilization.gpu) / 100.0,
                memory_total: memory.total,
                memory_used: memory.used,
                memory_free: memory.free,
                // Some boards expose no GPU-core sensor
                temperature: device.temperature(TemperatureSensor::Gpu).unwrap_or(0),
                uuid: device.uuid()?,
            });
        }

        Ok(records)
    }
}

#[cfg(not(feature = "nvml"))]
impl GpuSource for GpuMonitor {
    fn gpus(&self) -> Result<Vec<GpuRecord>, GpuMonitorError> {
        Err(GpuMonitorError::Unsupported(
            "built without the `nvml` feature".to_string(),
        ))
    }
}
