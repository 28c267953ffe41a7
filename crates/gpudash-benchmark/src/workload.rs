//! Synthetic random inputs for the benchmarks.

use image::{Rgb, RgbImage};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{BackendError, Result};

pub const DEFAULT_SEED: u64 = 42;

pub struct Workload {
    rng: StdRng,
}

impl Workload {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform values in `[0, 1)`.
    pub fn matrix(&mut self, rows: usize, cols: usize) -> Array2<f32> {
        Array2::from_shape_simple_fn((rows, cols), || self.rng.gen::<f32>())
    }

    pub fn rgb_image(&mut self, width: usize, height: usize) -> Result<RgbImage> {
        let (w, h) = (to_u32(width)?, to_u32(height)?);
        let rng = &mut self.rng;
        Ok(RgbImage::from_fn(w, h, |_, _| Rgb(rng.gen::<[u8; 3]>())))
    }

    /// `y = X·w + noise` with random weights and noise in `[-0.1, 0.1)`.
    pub fn regression(
        &mut self,
        n_samples: usize,
        n_features: usize,
    ) -> (Array2<f32>, Array1<f32>) {
        let x = self.matrix(n_samples, n_features);
        let weights = Array1::from_shape_simple_fn(n_features, || self.rng.gen::<f32>());
        let noise = Array1::from_shape_simple_fn(n_samples, || self.rng.gen_range(-0.1f32..0.1));
        let y = x.dot(&weights) + noise;
        (x, y)
    }
}

impl Default for Workload {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

fn to_u32(v: usize) -> Result<u32> {
    u32::try_from(v).map_err(|_| BackendError::InvalidInput(format!("image side {v} too large")))
}

/// Coefficient of determination of `predictions` against `actual`.
pub fn r2_score(actual: &Array1<f32>, predictions: &Array1<f32>) -> Option<f64> {
    if actual.is_empty() || actual.len() != predictions.len() {
        return None;
    }
    let mean = actual.iter().map(|&v| f64::from(v)).sum::<f64>() / actual.len() as f64;
    let (ss_res, ss_tot) = actual
        .iter()
        .zip(predictions.iter())
        .fold((0.0f64, 0.0f64), |(res, tot), (&a, &p)| {
            let (a, p) = (f64::from(a), f64::from(p));
            (res + (a - p).powi(2), tot + (a - mean).powi(2))
        });
    (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot)
}
