use chrono::{DateTime, Local};
use gpudash_core::GpuRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Local>,
    pub gpu_available: bool,
    pub gpu_demos_available: bool,
    pub gpu_compute_available: bool,
}

/// Body of both benchmark routes and data of the `request_benchmark` event.
/// The kind stays a string so unknown names get a domain error rather than
/// a deserialization failure.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BenchmarkRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub size: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GpuInfoResponse {
    Devices { gpus: Vec<GpuRecord> },
    Unavailable { error: String },
}
