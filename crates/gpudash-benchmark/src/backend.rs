use image::RgbImage;
use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Shape mismatch: {left:?} x {right:?}")]
    Shape {
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("Matrix is singular")]
    Singular,
    #[error("Model fit failed: {0}")]
    Fit(String),
    #[error("Device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Summary of the image pipeline output; enough to keep the work observable.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSummary {
    pub histogram: [u32; 256],
    pub edge_energy: u64,
}

/// A numeric backend the benchmarks run on.
///
/// Kernels may return before the device has finished; `synchronize` must
/// block until all submitted work is complete. Implementations are shared
/// across request threads and do not arbitrate device contention.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn device_id(&self) -> Option<u32> {
        None
    }

    fn memory_used_bytes(&self) -> Option<u64> {
        None
    }

    fn matmul(&self, a: &Array2<f32>, b: &Array2<f32>) -> Result<Array2<f32>>;

    /// Grayscale, Gaussian blur, edge detection and histogram.
    fn image_pipeline(&self, image: &RgbImage, sigma: f32) -> Result<ImageSummary>;

    /// Cluster labels for each row of `data`.
    fn kmeans(&self, data: &Array2<f32>, k: usize, max_iter: usize) -> Result<Vec<usize>>;

    /// Fits ordinary least squares on standardized features and returns the
    /// in-sample predictions.
    fn linear_regression(&self, x: &Array2<f32>, y: &Array1<f32>) -> Result<Array1<f32>>;

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn check_matmul(a: &Array2<f32>, b: &Array2<f32>) -> Result<()> {
    if a.ncols() != b.nrows() {
        return Err(BackendError::Shape {
            left: a.dim(),
            right: b.dim(),
        });
    }
    Ok(())
}

pub(crate) fn check_image(image: &RgbImage, sigma: f32) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(BackendError::InvalidInput("empty image".into()));
    }
    if !(sigma > 0.0) {
        return Err(BackendError::InvalidInput(format!("sigma must be > 0, got {sigma}")));
    }
    Ok(())
}

pub(crate) fn check_kmeans(data: &Array2<f32>, k: usize) -> Result<()> {
    if k == 0 || k > data.nrows() {
        return Err(BackendError::InvalidInput(format!(
            "cannot form {k} clusters from {} samples",
            data.nrows()
        )));
    }
    if data.ncols() == 0 {
        return Err(BackendError::InvalidInput("samples have no features".into()));
    }
    Ok(())
}

pub(crate) fn check_regression(x: &Array2<f32>, y: &Array1<f32>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(BackendError::Shape {
            left: x.dim(),
            right: (y.len(), 1),
        });
    }
    if x.ncols() == 0 {
        return Err(BackendError::InvalidInput("samples have no features".into()));
    }
    if x.nrows() <= x.ncols() {
        return Err(BackendError::InvalidInput(format!(
            "{} samples for {} features",
            x.nrows(),
            x.ncols()
        )));
    }
    Ok(())
}

/// Zero-mean, unit-variance columns. Constant columns become all zeros.
pub fn standardize(x: &Array2<f32>) -> Array2<f32> {
    let Some(mean) = x.mean_axis(ndarray::Axis(0)) else {
        return x.clone();
    };
    let std = x
        .std_axis(ndarray::Axis(0), 0.0)
        .mapv(|s| if s > 0.0 { s } else { 1.0 });
    (x - &mean) / &std
}
