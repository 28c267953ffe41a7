use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{BenchmarkType, ExecutionTarget};

pub const DEFAULT_BENCHMARK_SIZE: usize = 1024;

/// Shortest compute time a successful run may report, in seconds.
pub const MIN_COMPUTE_TIME_SECS: f64 = 1e-9;

pub const IMAGE_SIDE_PER_SIZE: usize = 4;
pub const IMAGE_CHANNELS: usize = 3;
pub const KMEANS_SAMPLES_PER_SIZE: usize = 100;
pub const KMEANS_FEATURES: usize = 100;
pub const KMEANS_CLUSTERS: usize = 10;
pub const REGRESSION_SAMPLES_PER_SIZE: usize = 1000;
pub const REGRESSION_FEATURES: usize = 50;

/// Input dimensions derived from the requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BenchmarkParams {
    Matrix {
        rows: usize,
        cols: usize,
    },
    Image {
        width: usize,
        height: usize,
        channels: usize,
    },
    Clustering {
        n_samples: usize,
        n_features: usize,
        n_clusters: usize,
    },
    Regression {
        n_samples: usize,
        n_features: usize,
    },
}

impl BenchmarkParams {
    pub fn for_size(kind: BenchmarkType, size: usize) -> Self {
        match kind {
            BenchmarkType::MatrixMultiply => Self::Matrix {
                rows: size,
                cols: size,
            },
            BenchmarkType::ImageProcessing => {
                let side = size.saturating_mul(IMAGE_SIDE_PER_SIZE);
                Self::Image {
                    width: side,
                    height: side,
                    channels: IMAGE_CHANNELS,
                }
            }
            BenchmarkType::MlInference => Self::Clustering {
                n_samples: size.saturating_mul(KMEANS_SAMPLES_PER_SIZE),
                n_features: KMEANS_FEATURES,
                n_clusters: KMEANS_CLUSTERS,
            },
            BenchmarkType::LinearRegression => Self::Regression {
                n_samples: size.saturating_mul(REGRESSION_SAMPLES_PER_SIZE),
                n_features: REGRESSION_FEATURES,
            },
        }
    }

    /// Number of scalar input values a run allocates.
    pub fn input_elements(&self) -> usize {
        match *self {
            Self::Matrix { rows, cols } => rows.saturating_mul(cols).saturating_mul(2),
            Self::Image {
                width,
                height,
                channels,
            } => width.saturating_mul(height).saturating_mul(channels),
            Self::Clustering {
                n_samples,
                n_features,
                ..
            }
            | Self::Regression {
                n_samples,
                n_features,
            } => n_samples.saturating_mul(n_features),
        }
    }

    /// Units of work the throughput figure is expressed in.
    pub fn work_units(&self) -> f64 {
        match *self {
            Self::Matrix { rows, .. } => 2.0 * (rows as f64).powi(3),
            Self::Image { width, height, .. } => (width * height) as f64,
            Self::Clustering { n_samples, .. } | Self::Regression { n_samples, .. } => {
                n_samples as f64
            }
        }
    }

    pub fn throughput_unit(&self) -> &'static str {
        match self {
            Self::Matrix { .. } => "GFLOPS",
            Self::Image { .. } => "megapixels/s",
            Self::Clustering { .. } | Self::Regression { .. } => "samples/s",
        }
    }

    fn unit_scale(&self) -> f64 {
        match self {
            Self::Matrix { .. } => 1e9,
            Self::Image { .. } => 1e6,
            Self::Clustering { .. } | Self::Regression { .. } => 1.0,
        }
    }

    /// Throughput for a run that took `compute_time` seconds. Zero when the
    /// time is not positive.
    pub fn throughput(&self, compute_time: f64) -> f64 {
        if compute_time <= 0.0 || !compute_time.is_finite() {
            return 0.0;
        }
        self.work_units() / (compute_time * self.unit_scale())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    #[serde(rename = "type")]
    pub kind: BenchmarkType,
    pub target: ExecutionTarget,
    pub algorithm: String,
    pub size: usize,
    pub params: BenchmarkParams,
    pub compute_time: f64,
    pub total_time: f64,
    pub throughput: f64,
    pub throughput_unit: String,
    #[serde(default)]
    pub cpu_time: Option<f64>,
    #[serde(default)]
    pub speedup: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<String>>,
    pub timestamp: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BenchmarkResult {
    /// A successful run. Throughput is derived from `params` and `compute_time`.
    pub fn completed(
        kind: BenchmarkType,
        target: ExecutionTarget,
        size: usize,
        compute_time: f64,
        total_time: f64,
    ) -> Self {
        let params = BenchmarkParams::for_size(kind, size);
        Self {
            kind,
            target,
            algorithm: kind.label().to_string(),
            size,
            params,
            compute_time,
            total_time,
            throughput: params.throughput(compute_time),
            throughput_unit: params.throughput_unit().to_string(),
            cpu_time: None,
            speedup: None,
            r2_score: None,
            memory_used_mb: None,
            device: None,
            operations: None,
            timestamp: Local::now(),
            error: None,
        }
    }

    /// A run that could not complete. All numeric fields are zero and `error`
    /// is never empty.
    pub fn failed(
        kind: BenchmarkType,
        target: ExecutionTarget,
        size: usize,
        error: impl Into<String>,
    ) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        let params = BenchmarkParams::for_size(kind, size);
        Self {
            kind,
            target,
            algorithm: kind.label().to_string(),
            size,
            params,
            compute_time: 0.0,
            total_time: 0.0,
            throughput: 0.0,
            throughput_unit: params.throughput_unit().to_string(),
            cpu_time: None,
            speedup: None,
            r2_score: None,
            memory_used_mb: None,
            device: None,
            operations: None,
            timestamp: Local::now(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Records an opportunistic CPU comparison and the derived speedup.
    pub fn with_cpu_comparison(mut self, cpu_time: Option<f64>) -> Self {
        self.cpu_time = cpu_time;
        self.speedup = speedup(cpu_time, Some(self.compute_time));
        self
    }

    /// Compute time when the run succeeded.
    pub fn timing(&self) -> Option<f64> {
        self.is_ok().then_some(self.compute_time)
    }
}

/// GPU and CPU results for the same workload, as sent over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    #[serde(rename = "type")]
    pub kind: BenchmarkType,
    pub gpu_result: BenchmarkResult,
    pub cpu_result: BenchmarkResult,
    pub speedup: Option<f64>,
}

impl BenchmarkComparison {
    pub fn new(kind: BenchmarkType, gpu_result: BenchmarkResult, cpu_result: BenchmarkResult) -> Self {
        let speedup = speedup(cpu_result.timing(), gpu_result.timing());
        Self {
            kind,
            gpu_result,
            cpu_result,
            speedup,
        }
    }
}

/// `cpu_time / gpu_time`, or `None` unless both are present and the ratio is
/// a finite number.
pub fn speedup(cpu_time: Option<f64>, gpu_time: Option<f64>) -> Option<f64> {
    let (cpu, gpu) = (cpu_time?, gpu_time?);
    if !cpu.is_finite() || !gpu.is_finite() || gpu <= 0.0 || cpu < 0.0 {
        return None;
    }
    let ratio = cpu / gpu;
    ratio.is_finite().then_some(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speedup_requires_both_times() {
        assert_eq!(speedup(None, Some(1.0)), None);
        assert_eq!(speedup(Some(1.0), None), None);
        assert_eq!(speedup(Some(4.0), Some(2.0)), Some(2.0));
    }

    #[test]
    fn test_speedup_never_infinite_or_nan() {
        let cases = [
            (Some(1.0), Some(0.0)),
            (Some(0.0), Some(0.0)),
            (Some(1.0), Some(-0.0)),
            (Some(1.0), Some(f64::MIN_POSITIVE / 4.0)),
            (Some(f64::NAN), Some(1.0)),
            (Some(1.0), Some(f64::INFINITY)),
            (Some(f64::MAX), Some(1e-300)),
        ];
        for (cpu, gpu) in cases {
            if let Some(s) = speedup(cpu, gpu) {
                assert!(s.is_finite(), "{cpu:?}/{gpu:?} gave {s}");
            }
        }
        assert_eq!(speedup(Some(1.0), Some(0.0)), None);
    }

    #[test]
    fn test_matrix_throughput_is_gflops() {
        let params = BenchmarkParams::for_size(BenchmarkType::MatrixMultiply, 1000);
        let gflops = params.throughput(2.0);
        assert!((gflops - 1.0).abs() < 1e-12);
        assert_eq!(params.throughput_unit(), "GFLOPS");
    }

    #[test]
    fn test_throughput_is_zero_without_time() {
        let params = BenchmarkParams::for_size(BenchmarkType::MlInference, 8);
        assert_eq!(params.throughput(0.0), 0.0);
        assert_eq!(params.throughput(f64::NAN), 0.0);
    }

    #[test]
    fn test_params_scale_with_size() {
        assert_eq!(
            BenchmarkParams::for_size(BenchmarkType::ImageProcessing, 1024),
            BenchmarkParams::Image {
                width: 4096,
                height: 4096,
                channels: 3
            }
        );
        assert_eq!(
            BenchmarkParams::for_size(BenchmarkType::LinearRegression, 2),
            BenchmarkParams::Regression {
                n_samples: 2000,
                n_features: 50
            }
        );
    }

    #[test]
    fn test_failed_result_is_zeroed_with_error() {
        let result = BenchmarkResult::failed(
            BenchmarkType::MatrixMultiply,
            ExecutionTarget::Gpu,
            512,
            "",
        );
        assert!(!result.is_ok());
        assert_eq!(result.error.as_deref(), Some("unknown error"));
        assert_eq!(result.compute_time, 0.0);
        assert_eq!(result.total_time, 0.0);
        assert_eq!(result.throughput, 0.0);
        assert_eq!(result.timing(), None);
    }

    #[test]
    fn test_comparison_skips_speedup_for_failed_gpu() {
        let gpu = BenchmarkResult::failed(
            BenchmarkType::MatrixMultiply,
            ExecutionTarget::Gpu,
            64,
            "device lost",
        );
        let cpu = BenchmarkResult::completed(
            BenchmarkType::MatrixMultiply,
            ExecutionTarget::Cpu,
            64,
            0.5,
            0.6,
        );
        let cmp = BenchmarkComparison::new(BenchmarkType::MatrixMultiply, gpu, cpu);
        assert_eq!(cmp.speedup, None);

        let value = serde_json::to_value(&cmp).unwrap();
        assert!(value["speedup"].is_null());
        assert_eq!(value["type"], "matrix_multiply");
        assert_eq!(value["gpu_result"]["error"], "device lost");
    }

    #[test]
    fn test_comparison_speedup() {
        let gpu = BenchmarkResult::completed(
            BenchmarkType::MatrixMultiply,
            ExecutionTarget::Gpu,
            64,
            0.25,
            0.3,
        );
        let cpu = BenchmarkResult::completed(
            BenchmarkType::MatrixMultiply,
            ExecutionTarget::Cpu,
            64,
            1.0,
            1.1,
        );
        let cmp = BenchmarkComparison::new(BenchmarkType::MatrixMultiply, gpu, cpu);
        assert_eq!(cmp.speedup, Some(4.0));
    }
}
