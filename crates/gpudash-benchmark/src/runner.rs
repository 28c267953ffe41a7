use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use gpudash_core::metrics::{KMEANS_CLUSTERS, MIN_COMPUTE_TIME_SECS};
use gpudash_core::{
    BenchmarkComparison, BenchmarkDefaults, BenchmarkParams, BenchmarkResult, BenchmarkType,
    ExecutionTarget,
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::backend::{BackendError, ComputeBackend, Result};
use crate::cpu::CpuBackend;
use crate::workload::{r2_score, Workload};

/// Upper bound on scalar inputs a single run may allocate.
pub const MAX_INPUT_ELEMENTS: usize = 1 << 28;

pub const GPU_UNAVAILABLE: &str = "GPU compute backend not available";

const BLUR_SIGMA: f32 = 3.0;
const KMEANS_MAX_ITER: usize = 300;
const IMAGE_OPERATIONS: [&str; 4] = ["grayscale", "blur", "edge_detection", "histogram"];
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Benchmarks disabled by configuration")]
    Disabled,
    #[error("Invalid benchmark configuration: {0}")]
    InvalidConfig(String),
}

/// Runs each benchmark kind on the GPU backend (when one is loaded) or the
/// CPU backend and reports a [`BenchmarkResult`].
///
/// No public method returns an error or panics: every failure, including a
/// panicking kernel, comes back as a result with `error` set and zeroed
/// numbers.
pub struct BenchmarkRunner {
    cpu: Arc<dyn ComputeBackend>,
    gpu: Option<Arc<dyn ComputeBackend>>,
    default_size: usize,
    max_size: usize,
}

impl BenchmarkRunner {
    pub fn new(
        config: &BenchmarkDefaults,
        gpu: Option<Arc<dyn ComputeBackend>>,
    ) -> std::result::Result<Self, RunnerError> {
        Self::with_backends(config, Arc::new(CpuBackend::new()), gpu)
    }

    pub fn with_backends(
        config: &BenchmarkDefaults,
        cpu: Arc<dyn ComputeBackend>,
        gpu: Option<Arc<dyn ComputeBackend>>,
    ) -> std::result::Result<Self, RunnerError> {
        if !config.enabled {
            return Err(RunnerError::Disabled);
        }
        if config.default_size == 0 || config.default_size > config.max_size {
            return Err(RunnerError::InvalidConfig(format!(
                "default size {} outside 1..={}",
                config.default_size, config.max_size
            )));
        }

        match &gpu {
            Some(backend) => info!("GPU compute backend loaded: {}", backend.name()),
            None => warn!("No GPU compute backend; GPU benchmarks will report errors"),
        }

        Ok(Self {
            cpu,
            gpu,
            default_size: config.default_size,
            max_size: config.max_size,
        })
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn run(
        &self,
        kind: BenchmarkType,
        target: ExecutionTarget,
        size: Option<usize>,
    ) -> BenchmarkResult {
        use BenchmarkType::*;
        use ExecutionTarget::*;

        match (kind, target) {
            (MatrixMultiply, Gpu) => self.matrix_multiply_gpu(size),
            (MatrixMultiply, Cpu) => self.matrix_multiply_cpu(size),
            (ImageProcessing, Gpu) => self.image_processing(size),
            (MlInference, Gpu) => self.ml_inference(size),
            (LinearRegression, Gpu) => self.linear_regression(size),
            (kind, Cpu) => BenchmarkResult::failed(
                kind,
                Cpu,
                size.unwrap_or(self.default_size),
                format!("CPU benchmark not available for {kind}"),
            ),
        }
    }

    /// GPU then CPU matrix multiply on the same size, with the derived speedup.
    pub fn compare_matrix_multiply(&self, size: Option<usize>) -> BenchmarkComparison {
        let gpu_result = self.matrix_multiply_gpu(size);
        let cpu_result = self.matrix_multiply_cpu(size);
        BenchmarkComparison::new(BenchmarkType::MatrixMultiply, gpu_result, cpu_result)
    }

    pub fn matrix_multiply_gpu(&self, size: Option<usize>) -> BenchmarkResult {
        self.run_on_gpu(BenchmarkType::MatrixMultiply, size, |gpu, size| {
            matmul_on(gpu, ExecutionTarget::Gpu, size, true)
        })
    }

    pub fn matrix_multiply_cpu(&self, size: Option<usize>) -> BenchmarkResult {
        let cpu = self.cpu.as_ref();
        self.guarded(
            BenchmarkType::MatrixMultiply,
            ExecutionTarget::Cpu,
            size,
            |size| matmul_on(cpu, ExecutionTarget::Cpu, size, false),
        )
    }

    pub fn image_processing(&self, size: Option<usize>) -> BenchmarkResult {
        self.run_on_gpu(BenchmarkType::ImageProcessing, size, |gpu, size| {
            self.image_on(gpu, size)
        })
    }

    pub fn ml_inference(&self, size: Option<usize>) -> BenchmarkResult {
        self.run_on_gpu(BenchmarkType::MlInference, size, |gpu, size| {
            self.kmeans_on(gpu, size)
        })
    }

    pub fn linear_regression(&self, size: Option<usize>) -> BenchmarkResult {
        self.run_on_gpu(BenchmarkType::LinearRegression, size, |gpu, size| {
            self.regression_on(gpu, size)
        })
    }

    fn run_on_gpu<F>(&self, kind: BenchmarkType, size: Option<usize>, f: F) -> BenchmarkResult
    where
        F: FnOnce(&dyn ComputeBackend, usize) -> Result<BenchmarkResult>,
    {
        let Some(gpu) = self.gpu.as_deref() else {
            let size = size.unwrap_or(self.default_size);
            return BenchmarkResult::failed(kind, ExecutionTarget::Gpu, size, GPU_UNAVAILABLE);
        };
        self.guarded(kind, ExecutionTarget::Gpu, size, |size| f(gpu, size))
    }

    fn guarded<F>(
        &self,
        kind: BenchmarkType,
        target: ExecutionTarget,
        size: Option<usize>,
        f: F,
    ) -> BenchmarkResult
    where
        F: FnOnce(usize) -> Result<BenchmarkResult>,
    {
        let size = size.unwrap_or(self.default_size);
        if let Err(reason) = self.check_size(kind, size) {
            warn!(%kind, %target, size, "Rejected benchmark: {}", reason);
            return BenchmarkResult::failed(kind, target, size, reason);
        }

        info!(%kind, %target, size, "Running benchmark");
        match panic::catch_unwind(AssertUnwindSafe(|| f(size))) {
            Ok(Ok(result)) => {
                info!(
                    %kind,
                    %target,
                    compute_time = result.compute_time,
                    "Benchmark completed: {:.2} {}",
                    result.throughput,
                    result.throughput_unit
                );
                result
            }
            Ok(Err(e)) => {
                error!(%kind, %target, size, "Benchmark failed: {}", e);
                BenchmarkResult::failed(kind, target, size, e.to_string())
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(%kind, %target, size, "Benchmark panicked: {}", msg);
                BenchmarkResult::failed(kind, target, size, format!("benchmark panicked: {msg}"))
            }
        }
    }

    fn check_size(&self, kind: BenchmarkType, size: usize) -> std::result::Result<(), String> {
        if size == 0 {
            return Err("size must be at least 1".to_string());
        }
        if size > self.max_size {
            return Err(format!("size {size} exceeds the maximum of {}", self.max_size));
        }
        let elements = BenchmarkParams::for_size(kind, size).input_elements();
        if elements > MAX_INPUT_ELEMENTS {
            return Err(format!(
                "input of {elements} values exceeds the limit of {MAX_INPUT_ELEMENTS}"
            ));
        }
        Ok(())
    }

    fn image_on(&self, gpu: &dyn ComputeBackend, size: usize) -> Result<BenchmarkResult> {
        let kind = BenchmarkType::ImageProcessing;
        let BenchmarkParams::Image { width, height, .. } = BenchmarkParams::for_size(kind, size)
        else {
            return Err(BackendError::InvalidInput("not an image workload".into()));
        };

        let start = Instant::now();
        let image = Workload::default().rgb_image(width, height)?;

        let (_, gpu_time) = timed(gpu, || gpu.image_pipeline(&image, BLUR_SIGMA))?;
        let cpu_time = cpu_comparison(kind, || self.cpu.image_pipeline(&image, BLUR_SIGMA));

        let mut result =
            BenchmarkResult::completed(kind, ExecutionTarget::Gpu, size, gpu_time, since(start, gpu_time))
                .with_cpu_comparison(cpu_time);
        result.operations = Some(IMAGE_OPERATIONS.iter().map(|op| op.to_string()).collect());
        result.memory_used_mb = Some(image.as_raw().len() as f64 / BYTES_PER_MB);
        result.device = gpu.device_id();
        Ok(result)
    }

    fn kmeans_on(&self, gpu: &dyn ComputeBackend, size: usize) -> Result<BenchmarkResult> {
        let kind = BenchmarkType::MlInference;
        let BenchmarkParams::Clustering {
            n_samples,
            n_features,
            n_clusters,
        } = BenchmarkParams::for_size(kind, size)
        else {
            return Err(BackendError::InvalidInput("not a clustering workload".into()));
        };
        debug_assert_eq!(n_clusters, KMEANS_CLUSTERS);

        let start = Instant::now();
        let data = Workload::default().matrix(n_samples, n_features);

        let (_, gpu_time) = timed(gpu, || gpu.kmeans(&data, n_clusters, KMEANS_MAX_ITER))?;
        let cpu_time = cpu_comparison(kind, || {
            self.cpu.kmeans(&data, n_clusters, KMEANS_MAX_ITER)
        });

        let mut result =
            BenchmarkResult::completed(kind, ExecutionTarget::Gpu, size, gpu_time, since(start, gpu_time))
                .with_cpu_comparison(cpu_time);
        result.device = gpu.device_id();
        Ok(result)
    }

    fn regression_on(&self, gpu: &dyn ComputeBackend, size: usize) -> Result<BenchmarkResult> {
        let kind = BenchmarkType::LinearRegression;
        let BenchmarkParams::Regression {
            n_samples,
            n_features,
        } = BenchmarkParams::for_size(kind, size)
        else {
            return Err(BackendError::InvalidInput("not a regression workload".into()));
        };

        let start = Instant::now();
        let (x, y) = Workload::default().regression(n_samples, n_features);

        let (predictions, gpu_time) = timed(gpu, || gpu.linear_regression(&x, &y))?;
        let r2 = r2_score(&y, &predictions);
        let cpu_time = cpu_comparison(kind, || self.cpu.linear_regression(&x, &y));

        let mut result =
            BenchmarkResult::completed(kind, ExecutionTarget::Gpu, size, gpu_time, since(start, gpu_time))
                .with_cpu_comparison(cpu_time);
        result.r2_score = r2;
        result.device = gpu.device_id();
        Ok(result)
    }
}

fn matmul_on(
    backend: &dyn ComputeBackend,
    target: ExecutionTarget,
    size: usize,
    warm_up: bool,
) -> Result<BenchmarkResult> {
    let start = Instant::now();
    let mut workload = Workload::default();
    let a = workload.matrix(size, size);
    let b = workload.matrix(size, size);

    if warm_up {
        backend.matmul(&a, &b)?;
        backend.synchronize()?;
    }

    let (_, compute_time) = timed(backend, || backend.matmul(&a, &b))?;

    let mut result = BenchmarkResult::completed(
        BenchmarkType::MatrixMultiply,
        target,
        size,
        compute_time,
        since(start, compute_time),
    );
    result.memory_used_mb = backend
        .memory_used_bytes()
        .map(|bytes| bytes as f64 / BYTES_PER_MB);
    result.device = backend.device_id();
    Ok(result)
}

/// Runs `work` and waits for the backend to drain before reading the clock.
fn timed<T>(backend: &dyn ComputeBackend, work: impl FnOnce() -> Result<T>) -> Result<(T, f64)> {
    let start = Instant::now();
    let out = work()?;
    backend.synchronize()?;
    Ok((out, elapsed_secs(start)))
}

/// Times the CPU half of a GPU run. Failures only drop the comparison.
fn cpu_comparison<T>(kind: BenchmarkType, work: impl FnOnce() -> Result<T>) -> Option<f64> {
    let start = Instant::now();
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(_)) => Some(elapsed_secs(start)),
        Ok(Err(e)) => {
            warn!(%kind, "CPU comparison failed: {}", e);
            None
        }
        Err(payload) => {
            warn!(%kind, "CPU comparison panicked: {}", panic_message(payload.as_ref()));
            None
        }
    }
}

fn elapsed_secs(start: Instant) -> f64 {
    start.elapsed().as_secs_f64().max(MIN_COMPUTE_TIME_SECS)
}

/// Wall time since `start`, never shorter than the compute time inside it.
fn since(start: Instant, compute_time: f64) -> f64 {
    start.elapsed().as_secs_f64().max(compute_time)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImageSummary;
    use image::RgbImage;
    use ndarray::{Array1, Array2};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default, Clone, Copy, PartialEq)]
    enum Mode {
        #[default]
        Work,
        Fail,
        Panic,
    }

    /// CPU kernels with call counters and injectable failures.
    #[derive(Default)]
    struct CountingBackend {
        mode: Mode,
        kernel_calls: AtomicUsize,
        syncs: AtomicUsize,
    }

    impl CountingBackend {
        fn with_mode(mode: Mode) -> Self {
            Self {
                mode,
                ..Self::default()
            }
        }

        fn enter(&self) -> Result<()> {
            self.kernel_calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Work => Ok(()),
                Mode::Fail => Err(BackendError::Device("out of device memory".into())),
                Mode::Panic => panic!("kernel exploded"),
            }
        }

        fn calls(&self) -> usize {
            self.kernel_calls.load(Ordering::SeqCst)
        }
    }

    impl ComputeBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn device_id(&self) -> Option<u32> {
            Some(0)
        }

        fn matmul(&self, a: &Array2<f32>, b: &Array2<f32>) -> Result<Array2<f32>> {
            self.enter()?;
            CpuBackend.matmul(a, b)
        }

        fn image_pipeline(&self, image: &RgbImage, sigma: f32) -> Result<ImageSummary> {
            self.enter()?;
            CpuBackend.image_pipeline(image, sigma)
        }

        fn kmeans(&self, data: &Array2<f32>, k: usize, max_iter: usize) -> Result<Vec<usize>> {
            self.enter()?;
            CpuBackend.kmeans(data, k, max_iter)
        }

        fn linear_regression(&self, x: &Array2<f32>, y: &Array1<f32>) -> Result<Array1<f32>> {
            self.enter()?;
            CpuBackend.linear_regression(x, y)
        }

        fn synchronize(&self) -> Result<()> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> BenchmarkDefaults {
        BenchmarkDefaults {
            enabled: true,
            default_size: 16,
            max_size: 64,
        }
    }

    fn runner_with(
        cpu: Arc<CountingBackend>,
        gpu: Option<Arc<CountingBackend>>,
    ) -> BenchmarkRunner {
        let gpu = gpu.map(|g| g as Arc<dyn ComputeBackend>);
        BenchmarkRunner::with_backends(&config(), cpu, gpu).unwrap()
    }

    #[test]
    fn test_gpu_operations_fail_fast_without_backend() {
        let cpu = Arc::new(CountingBackend::default());
        let runner = runner_with(cpu.clone(), None);

        for kind in BenchmarkType::all() {
            let result = runner.run(*kind, ExecutionTarget::Gpu, Some(8));
            assert_eq!(result.error.as_deref(), Some(GPU_UNAVAILABLE));
            assert_eq!(result.compute_time, 0.0);
            assert_eq!(result.total_time, 0.0);
            assert_eq!(result.throughput, 0.0);
            assert_eq!(result.cpu_time, None);
            assert_eq!(result.speedup, None);
        }
        assert_eq!(cpu.calls(), 0);
    }

    #[test]
    fn test_cpu_matmul_runs_without_gpu() {
        let runner = BenchmarkRunner::new(&config(), None).unwrap();
        let result = runner.matrix_multiply_cpu(Some(8));
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.target, ExecutionTarget::Cpu);
        assert!(result.compute_time > 0.0);
        assert!(result.total_time >= result.compute_time);
    }

    #[test]
    fn test_throughput_is_function_of_size_and_time() {
        let runner = BenchmarkRunner::new(&config(), None).unwrap();
        for size in [1, 2, 7, 32] {
            let result = runner.matrix_multiply_cpu(Some(size));
            assert!(result.compute_time > 0.0);
            let expected = 2.0 * (size as f64).powi(3) / (result.compute_time * 1e9);
            assert!((result.throughput - expected).abs() <= expected * 1e-12);
        }
    }

    #[test]
    fn test_default_size_applies() {
        let runner = BenchmarkRunner::new(&config(), None).unwrap();
        assert_eq!(runner.matrix_multiply_cpu(None).size, 16);
    }

    #[test]
    fn test_gpu_matmul_warms_up_and_synchronizes() {
        let gpu = Arc::new(CountingBackend::default());
        let runner = runner_with(Arc::new(CountingBackend::default()), Some(gpu.clone()));

        let result = runner.matrix_multiply_gpu(Some(8));
        assert!(result.is_ok());
        assert_eq!(result.device, Some(0));
        assert_eq!(gpu.calls(), 2);
        assert_eq!(gpu.syncs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_gpu_workloads_report_cpu_comparison() {
        let runner = runner_with(
            Arc::new(CountingBackend::default()),
            Some(Arc::new(CountingBackend::default())),
        );

        for result in [
            runner.image_processing(Some(4)),
            runner.ml_inference(Some(1)),
            runner.linear_regression(Some(1)),
        ] {
            assert!(result.is_ok(), "{:?}", result.error);
            assert!(result.compute_time > 0.0);
            assert!(result.cpu_time.is_some());
            let speedup = result.speedup.unwrap();
            assert!(speedup.is_finite() && speedup > 0.0);
        }

        let regression = runner.linear_regression(Some(1));
        assert!(regression.r2_score.unwrap() > 0.9);

        let image = runner.image_processing(Some(4));
        assert_eq!(image.operations.unwrap().len(), 4);
    }

    #[test]
    fn test_failed_cpu_comparison_keeps_gpu_result() {
        let runner = runner_with(
            Arc::new(CountingBackend::with_mode(Mode::Fail)),
            Some(Arc::new(CountingBackend::default())),
        );
        let result = runner.ml_inference(Some(1));
        assert!(result.is_ok());
        assert_eq!(result.cpu_time, None);
        assert_eq!(result.speedup, None);
    }

    #[test]
    fn test_backend_error_becomes_result() {
        let runner = runner_with(
            Arc::new(CountingBackend::default()),
            Some(Arc::new(CountingBackend::with_mode(Mode::Fail))),
        );
        let result = runner.matrix_multiply_gpu(Some(4));
        assert!(result.error.unwrap().contains("out of device memory"));
        assert_eq!(result.compute_time, 0.0);
        assert_eq!(result.throughput, 0.0);
    }

    #[test]
    fn test_panicking_backend_becomes_result() {
        let runner = runner_with(
            Arc::new(CountingBackend::default()),
            Some(Arc::new(CountingBackend::with_mode(Mode::Panic))),
        );
        let result = runner.linear_regression(Some(1));
        assert!(result.error.unwrap().contains("kernel exploded"));
    }

    #[test]
    fn test_size_limits() {
        let runner = BenchmarkRunner::new(&config(), None).unwrap();
        assert!(runner.matrix_multiply_cpu(Some(0)).error.is_some());
        let too_big = runner.matrix_multiply_cpu(Some(65));
        assert!(too_big.error.unwrap().contains("maximum"));
    }

    #[test]
    fn test_cpu_target_only_for_matrix_multiply() {
        let runner = BenchmarkRunner::new(&config(), None).unwrap();
        let result = runner.run(BenchmarkType::ImageProcessing, ExecutionTarget::Cpu, Some(4));
        assert!(result.error.unwrap().contains("CPU benchmark not available"));
    }

    #[test]
    fn test_compare_matrix_multiply() {
        let runner = runner_with(
            Arc::new(CountingBackend::default()),
            Some(Arc::new(CountingBackend::default())),
        );
        let cmp = runner.compare_matrix_multiply(Some(8));
        assert!(cmp.gpu_result.is_ok() && cmp.cpu_result.is_ok());
        assert!(cmp.speedup.unwrap().is_finite());

        let runner = runner_with(Arc::new(CountingBackend::default()), None);
        let cmp = runner.compare_matrix_multiply(Some(8));
        assert!(cmp.cpu_result.is_ok());
        assert_eq!(cmp.speedup, None);
    }

    #[test]
    fn test_disabled_or_invalid_config() {
        let disabled = BenchmarkDefaults {
            enabled: false,
            ..config()
        };
        assert!(matches!(
            BenchmarkRunner::new(&disabled, None),
            Err(RunnerError::Disabled)
        ));

        let invalid = BenchmarkDefaults {
            default_size: 128,
            ..config()
        };
        assert!(matches!(
            BenchmarkRunner::new(&invalid, None),
            Err(RunnerError::InvalidConfig(_))
        ));
    }
}
