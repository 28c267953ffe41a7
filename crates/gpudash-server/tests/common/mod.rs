#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use chrono::Local;
use gpudash_benchmark::{BenchmarkRunner, CpuBackend};
use gpudash_core::{
    BenchmarkDefaults, CpuUsage, DiskUsage, GpuRecord, MemoryUsage, NetworkCounters,
    SystemSnapshot,
};
use gpudash_server::{app, AppState};
use gpudash_services::{GpuMonitorError, GpuSource, MetricsError, MetricsSource};

pub struct FixedMetrics;

impl MetricsSource for FixedMetrics {
    fn read_snapshot(&self) -> Result<SystemSnapshot, MetricsError> {
        Ok(SystemSnapshot {
            timestamp: Local::now(),
            cpu: CpuUsage {
                usage_percent: 12.5,
                count: 8,
                freq: None,
            },
            memory: MemoryUsage::new(1000, 250, 750),
            disk: DiskUsage::new(2000, 500),
            network: NetworkCounters::default(),
            gpu: Vec::new(),
        })
    }
}

pub struct BrokenMetrics;

impl MetricsSource for BrokenMetrics {
    fn read_snapshot(&self) -> Result<SystemSnapshot, MetricsError> {
        Err(MetricsError::ReadFailed("no /proc".into()))
    }
}

pub struct OneGpu;

impl GpuSource for OneGpu {
    fn gpus(&self) -> Result<Vec<GpuRecord>, GpuMonitorError> {
        Ok(vec![GpuRecord {
            id: 0,
            name: "Test Accelerator".into(),
            load: 0.25,
            memory_total: 8 << 30,
            memory_used: 2 << 30,
            memory_free: 6 << 30,
            temperature: 55,
            uuid: "GPU-0000".into(),
        }])
    }
}

pub struct LostGpu;

impl GpuSource for LostGpu {
    fn gpus(&self) -> Result<Vec<GpuRecord>, GpuMonitorError> {
        Err(GpuMonitorError::QueryFailed("device lost".into()))
    }
}

pub fn small_benchmarks() -> BenchmarkDefaults {
    BenchmarkDefaults {
        enabled: true,
        default_size: 16,
        max_size: 64,
    }
}

/// Runner whose "GPU" is a second CPU backend, so every path produces timings.
pub fn runner_with_gpu() -> Arc<BenchmarkRunner> {
    let runner = BenchmarkRunner::new(&small_benchmarks(), Some(Arc::new(CpuBackend::new())))
        .expect("runner");
    Arc::new(runner)
}

pub fn runner_without_gpu() -> Arc<BenchmarkRunner> {
    Arc::new(BenchmarkRunner::new(&small_benchmarks(), None).expect("runner"))
}

pub struct Harness {
    pub metrics: Arc<dyn MetricsSource>,
    pub gpu: Option<Arc<dyn GpuSource>>,
    pub runner: Option<Arc<BenchmarkRunner>>,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            metrics: Arc::new(FixedMetrics),
            gpu: Some(Arc::new(OneGpu)),
            runner: Some(runner_with_gpu()),
        }
    }
}

impl Harness {
    pub fn state(self) -> Arc<AppState> {
        Arc::new(AppState::from_parts(self.metrics, self.gpu, self.runner, 16))
    }

    pub fn router(self) -> Router {
        app(self.state(), Path::new("./no-such-static-dir"))
    }
}
