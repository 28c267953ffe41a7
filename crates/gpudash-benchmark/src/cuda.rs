//! cuBLAS backend. Dense products run on the device through `sgemm`; the
//! small reductions around them stay on the host.

use std::fmt::Display;
use std::panic;
use std::sync::Arc;

use cudarc::cublas::sys::cublasOperation_t;
use cudarc::cublas::{CudaBlas, Gemm, GemmConfig};
use cudarc::driver::{result as driver, CudaDevice, CudaSlice};
use image::RgbImage;
use ndarray::{s, Array1, Array2, Axis};

use crate::backend::{
    check_image, check_kmeans, check_matmul, check_regression, standardize, BackendError,
    ComputeBackend, ImageSummary, Result,
};

const PIVOT_EPSILON: f64 = 1e-9;
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];
const SOBEL_DIFF: [f32; 3] = [-1.0, 0.0, 1.0];

pub struct CudaBackend {
    device: Arc<CudaDevice>,
    blas: CudaBlas,
    name: String,
    ordinal: usize,
}

/// A row-major device matrix as one side of a product.
#[derive(Clone, Copy)]
struct Operand<'a> {
    buf: &'a CudaSlice<f32>,
    /// Column count as stored, i.e. the leading dimension.
    cols: usize,
    transpose: bool,
}

impl<'a> Operand<'a> {
    fn plain(buf: &'a CudaSlice<f32>, cols: usize) -> Self {
        Self {
            buf,
            cols,
            transpose: false,
        }
    }

    fn transposed(buf: &'a CudaSlice<f32>, cols: usize) -> Self {
        Self {
            buf,
            cols,
            transpose: true,
        }
    }
}

impl CudaBackend {
    pub fn open(ordinal: usize) -> Result<Self> {
        // The driver library is loaded on first use and panics when missing
        panic::catch_unwind(|| Self::init(ordinal))
            .map_err(|_| BackendError::Device("CUDA driver library not found".into()))?
    }

    fn init(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal).map_err(device_err)?;
        let blas = CudaBlas::new(device.clone()).map_err(device_err)?;
        Ok(Self {
            device,
            blas,
            name: format!("cuda:{ordinal}"),
            ordinal,
        })
    }

    fn upload(&self, host: &Array2<f32>) -> Result<CudaSlice<f32>> {
        let host = host.as_standard_layout();
        let data = host
            .as_slice()
            .ok_or_else(|| BackendError::InvalidInput("array is not contiguous".into()))?;
        self.device.htod_sync_copy(data).map_err(device_err)
    }

    fn download(&self, buf: &CudaSlice<f32>, rows: usize, cols: usize) -> Result<Array2<f32>> {
        let data = self.device.dtoh_sync_copy(buf).map_err(device_err)?;
        Array2::from_shape_vec((rows, cols), data).map_err(device_err)
    }

    /// Row-major `op(a) · op(b)` into a new `m x n` buffer. cuBLAS is
    /// column-major, so the call computes `cᵀ = op(b)ᵀ · op(a)ᵀ`.
    fn gemm(
        &self,
        a: Operand,
        b: Operand,
        (m, n, k): (usize, usize, usize),
    ) -> Result<CudaSlice<f32>> {
        let mut c = self.device.alloc_zeros::<f32>(m * n).map_err(device_err)?;
        let cfg = GemmConfig {
            transa: op(b.transpose),
            transb: op(a.transpose),
            m: dim(n)?,
            n: dim(m)?,
            k: dim(k)?,
            alpha: 1.0f32,
            lda: dim(b.cols)?,
            ldb: dim(a.cols)?,
            beta: 0.0f32,
            ldc: dim(n)?,
        };
        // SAFETY: every buffer was allocated for the dimensions passed above
        unsafe { self.blas.gemm(cfg, b.buf, a.buf, &mut c) }.map_err(device_err)?;
        Ok(c)
    }

    /// `left · plane · rightᵀ` for an `h x w` plane.
    fn separable(
        &self,
        plane: &CudaSlice<f32>,
        (h, w): (usize, usize),
        left: &CudaSlice<f32>,
        right: &CudaSlice<f32>,
    ) -> Result<CudaSlice<f32>> {
        let rows = self.gemm(Operand::plain(left, h), Operand::plain(plane, w), (h, w, h))?;
        self.gemm(Operand::plain(&rows, w), Operand::transposed(right, w), (h, w, w))
    }
}

impl ComputeBackend for CudaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_id(&self) -> Option<u32> {
        u32::try_from(self.ordinal).ok()
    }

    fn memory_used_bytes(&self) -> Option<u64> {
        self.device.bind_to_thread().ok()?;
        let (free, total) = driver::mem_get_info().ok()?;
        u64::try_from(total.saturating_sub(free)).ok()
    }

    fn matmul(&self, a: &Array2<f32>, b: &Array2<f32>) -> Result<Array2<f32>> {
        check_matmul(a, b)?;
        let (m, k) = a.dim();
        let n = b.ncols();

        let (da, db) = (self.upload(a)?, self.upload(b)?);
        let c = self.gemm(Operand::plain(&da, k), Operand::plain(&db, n), (m, n, k))?;
        self.download(&c, m, n)
    }

    fn image_pipeline(&self, image: &RgbImage, sigma: f32) -> Result<ImageSummary> {
        check_image(image, sigma)?;
        let (w, h) = (image.width() as usize, image.height() as usize);

        let rgb = Array2::from_shape_vec(
            (h * w, 3),
            image.as_raw().iter().map(|&v| f32::from(v)).collect(),
        )
        .map_err(device_err)?;
        let luma = Array1::from(LUMA.to_vec()).insert_axis(Axis(1));
        let (d_rgb, d_luma) = (self.upload(&rgb)?, self.upload(&luma)?);
        let gray = self.gemm(Operand::plain(&d_rgb, 3), Operand::plain(&d_luma, 1), (h * w, 1, 3))?;

        let taps = gaussian_taps(sigma);
        let blur_v = self.upload(&band(h, &taps))?;
        let blur_h = self.upload(&band(w, &taps))?;
        let blurred = self.separable(&gray, (h, w), &blur_v, &blur_h)?;

        let smooth_v = self.upload(&band(h, &SOBEL_SMOOTH))?;
        let smooth_h = self.upload(&band(w, &SOBEL_SMOOTH))?;
        let diff_v = self.upload(&band(h, &SOBEL_DIFF))?;
        let diff_h = self.upload(&band(w, &SOBEL_DIFF))?;
        let gx = self.separable(&blurred, (h, w), &smooth_v, &diff_h)?;
        let gy = self.separable(&blurred, (h, w), &diff_v, &smooth_h)?;

        let (gx, gy) = (self.download(&gx, h, w)?, self.download(&gy, h, w)?);
        let edge_energy = gx
            .iter()
            .zip(gy.iter())
            .map(|(x, y)| x.hypot(*y).round().min(f32::from(u16::MAX)) as u64)
            .sum();

        let mut histogram = [0u32; 256];
        for v in self.download(&gray, h * w, 1)?.iter() {
            histogram[v.round().clamp(0.0, 255.0) as usize] += 1;
        }

        Ok(ImageSummary {
            histogram,
            edge_energy,
        })
    }

    fn kmeans(&self, data: &Array2<f32>, k: usize, max_iter: usize) -> Result<Vec<usize>> {
        check_kmeans(data, k)?;
        let (rows, dims) = data.dim();
        let points = self.upload(data)?;

        // Evenly spaced rows seed the centroids
        let mut centroids = Array2::from_shape_fn((k, dims), |(c, d)| data[[c * rows / k, d]]);
        let mut labels = vec![usize::MAX; rows];

        for _ in 0..max_iter.max(1) {
            let d_centroids = self.upload(&centroids)?;
            let cross = self.gemm(
                Operand::plain(&points, dims),
                Operand::transposed(&d_centroids, dims),
                (rows, k, dims),
            )?;
            let cross = self.download(&cross, rows, k)?;
            let norms = centroids.map_axis(Axis(1), |c| c.dot(&c));

            // |x - c|² ranks the same as |c|² - 2 x·c
            let mut changed = false;
            for (label, row) in labels.iter_mut().zip(cross.outer_iter()) {
                let nearest = row
                    .iter()
                    .zip(norms.iter())
                    .map(|(&xc, &cn)| cn - 2.0 * xc)
                    .enumerate()
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(c, _)| c)
                    .unwrap_or(0);
                if *label != nearest {
                    *label = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = Array2::<f32>::zeros((k, dims));
            let mut counts = vec![0usize; k];
            for (row, &label) in data.outer_iter().zip(&labels) {
                sums.row_mut(label).scaled_add(1.0, &row);
                counts[label] += 1;
            }
            for (c, &count) in counts.iter().enumerate() {
                // An empty cluster keeps its previous centroid
                if count > 0 {
                    centroids.row_mut(c).assign(&(&sums.row(c) / count as f32));
                }
            }
        }

        Ok(labels)
    }

    fn linear_regression(&self, x: &Array2<f32>, y: &Array1<f32>) -> Result<Array1<f32>> {
        check_regression(x, y)?;
        let scaled = standardize(x);
        let (rows, cols) = scaled.dim();
        let p = cols + 1;

        // Z = [1 | X]
        let mut z = Array2::<f32>::ones((rows, p));
        z.slice_mut(s![.., 1..]).assign(&scaled);
        let dz = self.upload(&z)?;
        let dy = self.upload(&y.view().insert_axis(Axis(1)).to_owned())?;

        let gram = self.gemm(Operand::transposed(&dz, p), Operand::plain(&dz, p), (p, p, rows))?;
        let moment = self.gemm(Operand::transposed(&dz, p), Operand::plain(&dy, 1), (p, 1, rows))?;
        let gram = self.download(&gram, p, p)?.mapv(f64::from);
        let moment = self.download(&moment, p, 1)?.column(0).mapv(f64::from);

        let coef = solve(gram, moment)?.mapv(|c| c as f32);
        let d_coef = self.upload(&coef.insert_axis(Axis(1)))?;
        let predictions = self.gemm(Operand::plain(&dz, p), Operand::plain(&d_coef, 1), (rows, 1, p))?;
        Ok(self.download(&predictions, rows, 1)?.column(0).to_owned())
    }

    fn synchronize(&self) -> Result<()> {
        self.device.synchronize().map_err(device_err)
    }
}

fn device_err(e: impl Display) -> BackendError {
    BackendError::Device(e.to_string())
}

fn op(transpose: bool) -> cublasOperation_t {
    if transpose {
        cublasOperation_t::CUBLAS_OP_T
    } else {
        cublasOperation_t::CUBLAS_OP_N
    }
}

fn dim(v: usize) -> Result<i32> {
    i32::try_from(v)
        .map_err(|_| BackendError::InvalidInput(format!("dimension {v} too large for cuBLAS")))
}

/// Normalized Gaussian taps out to three standard deviations.
fn gaussian_taps(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil() as i32;
    let taps: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = taps.iter().sum();
    taps.into_iter().map(|t| t / total).collect()
}

/// `n x n` matrix applying centered `taps` along one axis, clamping at the
/// borders.
fn band(n: usize, taps: &[f32]) -> Array2<f32> {
    let radius = taps.len() / 2;
    let mut m = Array2::zeros((n, n));
    for i in 0..n {
        for (t, &w) in taps.iter().enumerate() {
            let j = (i + t).saturating_sub(radius).min(n - 1);
            m[[i, j]] += w;
        }
    }
    m
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&r, &s| a[[r, col]].abs().total_cmp(&a[[s, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < PIVOT_EPSILON {
            return Err(BackendError::Singular);
        }
        if pivot != col {
            for j in 0..n {
                a.swap([col, j], [pivot, j]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            for j in col..n {
                a[[row, j]] -= factor * a[[col, j]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|j| a[[row, j]] * x[j]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}
