use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ravens_core::filter::BoxFilter;
use ravens_core::interpolation::{Interpolator, LinearInterpolator};
use ravens_core::{Image, Transform};

use super::trait_::{Metric, NormalizationMode};

/// Local Normalized Cross Correlation (LNCC) Metric.
///
/// Computes the squared normalized cross correlation within a cubic window
/// around each voxel:
///
/// cc = (cov² + ε) / (var_f · var_m + ε)
///
/// with windowed means taken by a box filter. Robust to local intensity
/// variations and bias fields. The loss is `-cc` reduced according to the
/// [`NormalizationMode`].
#[derive(Clone, Debug)]
pub struct LocalNormalizedCrossCorrelation<B: Backend> {
    interpolator: LinearInterpolator,
    filter: BoxFilter<B>,
    epsilon: f64,
    normalization: NormalizationMode,
}

impl<B: Backend> LocalNormalizedCrossCorrelation<B> {
    /// Create a new LNCC metric.
    ///
    /// # Arguments
    /// * `window` - Edge length of the local window in voxels (rounded up to odd).
    pub fn new(window: usize) -> Self {
        Self {
            interpolator: LinearInterpolator::new(),
            filter: BoxFilter::new(window),
            epsilon: 1e-5,
            normalization: NormalizationMode::ByCount,
        }
    }

    pub fn with_normalization(mut self, normalization: NormalizationMode) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn window(&self) -> usize {
        self.filter.window()
    }

    pub fn normalization(&self) -> NormalizationMode {
        self.normalization
    }

    /// Moving intensities sampled on the fixed grid, shape of `fixed`.
    pub fn warp(&self, fixed: &Image<B>, moving: &Image<B>, transform: &impl Transform<B>) -> Tensor<B, 3> {
        let fixed_points = fixed.physical_grid();
        let moving_points = transform.transform_points(fixed_points);
        let moving_indices = moving.world_to_index_tensor(moving_points);
        self.interpolator
            .interpolate(moving.data(), moving_indices)
            .reshape(fixed.shape())
    }

    /// Per-voxel squared local correlation of two volumes on the same grid.
    pub fn correlation_map(&self, fixed: Tensor<B, 3>, moving: Tensor<B, 3>) -> Tensor<B, 3> {
        let mean_f = self.filter.apply_tensor(fixed.clone());
        let mean_m = self.filter.apply_tensor(moving.clone());
        let mean_ff = self.filter.apply_tensor(fixed.clone() * fixed.clone());
        let mean_mm = self.filter.apply_tensor(moving.clone() * moving.clone());
        let mean_fm = self.filter.apply_tensor(fixed * moving);

        let cov = mean_fm - mean_f.clone() * mean_m.clone();
        // Clamp variance to avoid negatives from float cancellation
        let var_f = (mean_ff - mean_f.powf_scalar(2.0)).clamp_min(0.0);
        let var_m = (mean_mm - mean_m.powf_scalar(2.0)).clamp_min(0.0);

        (cov.powf_scalar(2.0) + self.epsilon) / (var_f * var_m + self.epsilon)
    }

    /// Loss of two volumes already on the same grid.
    pub fn loss_from_values(&self, fixed: Tensor<B, 3>, moving: Tensor<B, 3>) -> Tensor<B, 1> {
        let cc = self.correlation_map(fixed, moving);
        match self.normalization {
            NormalizationMode::None => cc.sum().neg(),
            NormalizationMode::ByCount => cc.mean().neg(),
        }
    }
}

impl<B: Backend> Metric<B> for LocalNormalizedCrossCorrelation<B> {
    fn forward(&self, fixed: &Image<B>, moving: &Image<B>, transform: &impl Transform<B>) -> Tensor<B, 1> {
        let moving_values = self.warp(fixed, moving, transform);
        self.loss_from_values(fixed.data().clone(), moving_values)
    }

    fn name(&self) -> &'static str {
        "LocalNormalizedCrossCorrelation"
    }
}
