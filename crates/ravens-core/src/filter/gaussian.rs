use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::convolution::convolve_axis;
use crate::image::Image;
use crate::spatial::Spacing3;

/// Units of the standard deviations given to a [`GaussianFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigmaUnits {
    /// Millimetres; converted to voxels with the image spacing.
    Physical,
    /// Voxels of the grid being filtered.
    Voxels,
}

/// Gaussian smoothing filter.
///
/// Applies a Gaussian smoothing filter to a volume using separable 1D
/// convolutions. Kernels are truncated at 3σ and normalized to unit sum.
pub struct GaussianFilter<B: Backend> {
    /// Standard deviation per index axis `(x, y, z)`.
    sigmas: [f64; 3],
    units: SigmaUnits,
    max_kernel_width: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    /// Create a new Gaussian filter with standard deviations in physical units (mm).
    ///
    /// # Arguments
    /// * `sigmas` - Standard deviation for each axis `(x, y, z)`; a single
    ///   value applies to every axis.
    pub fn new(sigmas: Vec<f64>) -> Self {
        let first = sigmas.first().copied().unwrap_or(0.0);
        let pick = |i: usize| sigmas.get(i).copied().unwrap_or(first);
        Self {
            sigmas: [pick(0), pick(1), pick(2)],
            units: SigmaUnits::Physical,
            max_kernel_width: 32, // bounds the cost for very wide kernels
            _b: std::marker::PhantomData,
        }
    }

    /// Isotropic filter with `sigma` given in voxels.
    pub fn in_voxels(sigma: f64) -> Self {
        Self {
            sigmas: [sigma; 3],
            units: SigmaUnits::Voxels,
            max_kernel_width: 32,
            _b: std::marker::PhantomData,
        }
    }

    /// Apply the filter to an image.
    pub fn apply(&self, image: &Image<B>) -> Image<B> {
        image.with_data(self.apply_tensor(image.data().clone(), image.geometry().spacing()))
    }

    /// Apply the filter to a `[Z, Y, X]` tensor directly.
    ///
    /// # Arguments
    /// * `input` - Input tensor
    /// * `spacing` - Physical spacing `(x, y, z)`, only used for physical sigmas
    pub fn apply_tensor(&self, input: Tensor<B, 3>, spacing: &Spacing3) -> Tensor<B, 3> {
        let mut data = input;
        for axis in 0..3 {
            let sigma = self.sigmas[axis];
            // Skip if sigma is close to zero
            if sigma <= 1e-6 {
                continue;
            }
            let voxel_sigma = match self.units {
                SigmaUnits::Physical => sigma / spacing[axis],
                SigmaUnits::Voxels => sigma,
            };
            let kernel = self.kernel(voxel_sigma);
            // index axis x is tensor dimension 2
            data = convolve_axis(data, &kernel, 2 - axis);
        }
        data
    }

    fn kernel(&self, sigma: f64) -> Vec<f32> {
        let radius = (3.0 * sigma).ceil() as usize;
        let width = (2 * radius + 1).min(self.max_kernel_width | 1);
        gaussian_kernel(sigma, (width - 1) / 2)
    }
}

/// Normalized Gaussian kernel of `2 * radius + 1` taps.
pub fn gaussian_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let taps: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma2).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|v| (v / sum) as f32).collect()
}
