//! Reference kernels that run on the host CPU.

use image::RgbImage;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::sobel_gradients;
use imageproc::stats::histogram;
use linfa::traits::{Fit, Predict};
use linfa::{Dataset, DatasetBase};
use linfa_clustering::KMeans;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};

use crate::backend::{
    check_image, check_kmeans, check_matmul, check_regression, standardize, BackendError,
    ComputeBackend, ImageSummary, Result,
};

const KMEANS_TOLERANCE: f32 = 1e-4;

#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn matmul(&self, a: &Array2<f32>, b: &Array2<f32>) -> Result<Array2<f32>> {
        check_matmul(a, b)?;
        Ok(a.dot(b))
    }

    fn image_pipeline(&self, image: &RgbImage, sigma: f32) -> Result<ImageSummary> {
        check_image(image, sigma)?;

        let gray = image::imageops::grayscale(image);
        let blurred = gaussian_blur_f32(&gray, sigma);
        let edges = sobel_gradients(&blurred);
        let edge_energy = edges.pixels().map(|p| u64::from(p.0[0])).sum();

        let hist = histogram(&gray);
        let histogram = hist
            .channels
            .first()
            .copied()
            .ok_or_else(|| BackendError::Device("histogram has no channels".into()))?;

        Ok(ImageSummary {
            histogram,
            edge_energy,
        })
    }

    fn kmeans(&self, data: &Array2<f32>, k: usize, max_iter: usize) -> Result<Vec<usize>> {
        check_kmeans(data, k)?;

        let dataset = DatasetBase::from(data.clone());
        // Seeded k-means++ with ten restarts
        let model = KMeans::params(k)
            .max_n_iterations(max_iter.max(1) as u64)
            .tolerance(KMEANS_TOLERANCE)
            .fit(&dataset)
            .map_err(|e| BackendError::Fit(e.to_string()))?;

        let labels: Array1<usize> = model.predict(data);
        Ok(labels.to_vec())
    }

    fn linear_regression(&self, x: &Array2<f32>, y: &Array1<f32>) -> Result<Array1<f32>> {
        check_regression(x, y)?;

        let scaled = standardize(x);
        let dataset = Dataset::new(scaled.clone(), y.clone());
        let model = LinearRegression::default()
            .fit(&dataset)
            .map_err(|e| BackendError::Fit(e.to_string()))?;
        Ok(model.predict(&scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::array;

    #[test]
    fn test_matmul_small() {
        let a = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let b = array![[7.0f32, 8.0], [9.0, 10.0], [11.0, 12.0]];
        let c = CpuBackend::new().matmul(&a, &b).unwrap();
        assert_eq!(c, array![[58.0f32, 64.0], [139.0, 154.0]]);
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let a = Array2::<f32>::zeros((2, 3));
        let err = CpuBackend::new().matmul(&a, &a).unwrap_err();
        assert!(matches!(err, BackendError::Shape { left: (2, 3), right: (2, 3) }));
    }

    #[test]
    fn test_kmeans_separates_obvious_clusters() {
        let data = array![
            [0.0f32, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1]
        ];
        let labels = CpuBackend::new().kmeans(&data, 2, 20).unwrap();
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_kmeans_rejects_too_many_clusters() {
        let data = Array2::<f32>::zeros((3, 2));
        assert!(CpuBackend::new().kmeans(&data, 4, 10).is_err());
        assert!(CpuBackend::new().kmeans(&data, 0, 10).is_err());
    }

    #[test]
    fn test_regression_recovers_exact_line() {
        // y = 3 + 2*x0 - x1
        let x = Array2::from_shape_fn((20, 2), |(i, j)| {
            if j == 0 {
                i as f32
            } else {
                (i * i % 7) as f32
            }
        });
        let y = x.map_axis(ndarray::Axis(1), |r| 3.0 + 2.0 * r[0] - r[1]);

        let predictions = CpuBackend::new().linear_regression(&x, &y).unwrap();
        for (p, t) in predictions.iter().zip(&y) {
            assert!((p - t).abs() < 1e-2, "{p} vs {t}");
        }
    }

    #[test]
    fn test_regression_needs_more_samples_than_features() {
        let x = Array2::<f32>::zeros((2, 2));
        let err = CpuBackend::new()
            .linear_regression(&x, &array![1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidInput(_)));
    }

    #[test]
    fn test_image_pipeline_histogram_covers_every_pixel() {
        let image = RgbImage::from_fn(16, 8, |x, y| Rgb([(x * 16) as u8, (y * 32) as u8, 7]));
        let summary = CpuBackend::new().image_pipeline(&image, 3.0).unwrap();
        let counted: u32 = summary.histogram.iter().sum();
        assert_eq!(counted, 16 * 8);
    }

    #[test]
    fn test_image_pipeline_rejects_bad_sigma() {
        let image = RgbImage::new(4, 4);
        assert!(CpuBackend::new().image_pipeline(&image, 0.0).is_err());
    }
}
