use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::GpuDashError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkType {
    #[default]
    MatrixMultiply,
    ImageProcessing,
    MlInference,
    LinearRegression,
}

impl BenchmarkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkType::MatrixMultiply => "matrix_multiply",
            BenchmarkType::ImageProcessing => "image_processing",
            BenchmarkType::MlInference => "ml_inference",
            BenchmarkType::LinearRegression => "linear_regression",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BenchmarkType::MatrixMultiply => "Matrix Multiplication",
            BenchmarkType::ImageProcessing => "Image Processing Pipeline",
            BenchmarkType::MlInference => "K-Means Clustering",
            BenchmarkType::LinearRegression => "Linear Regression",
        }
    }

    /// Whether a standalone CPU run exists for this kind. The other kinds only
    /// run on the CPU as the comparison half of a GPU run.
    pub fn has_cpu_variant(&self) -> bool {
        matches!(self, BenchmarkType::MatrixMultiply)
    }

    pub fn all() -> &'static [BenchmarkType] {
        &[
            BenchmarkType::MatrixMultiply,
            BenchmarkType::ImageProcessing,
            BenchmarkType::MlInference,
            BenchmarkType::LinearRegression,
        ]
    }
}

impl fmt::Display for BenchmarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BenchmarkType {
    type Err = GpuDashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GpuDashError::UnknownBenchmark(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTarget {
    Gpu,
    Cpu,
}

impl ExecutionTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionTarget::Gpu => "gpu",
            ExecutionTarget::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionTarget {
    type Err = GpuDashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(ExecutionTarget::Gpu),
            "cpu" => Ok(ExecutionTarget::Cpu),
            other => Err(GpuDashError::Config(format!("unknown target: {other}"))),
        }
    }
}
