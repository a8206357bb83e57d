//! Metric trait for image similarity measurement.
//!
//! This module defines the core Metric trait that similarity metrics
//! implement for image registration.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ravens_core::{Image, Transform};

/// Metric trait for measuring similarity between images.
///
/// Metrics compute a loss value that represents the dissimilarity between
/// a fixed (reference) image and a moving image sampled through a
/// transform. Lower values indicate better alignment.
pub trait Metric<B: Backend> {
    /// Calculate the loss (dissimilarity) between fixed and moving images.
    ///
    /// # Arguments
    /// * `fixed` - The fixed (reference) image
    /// * `moving` - The moving image
    /// * `transform` - Maps fixed-grid physical points into moving space
    ///
    /// # Returns
    /// Scalar tensor representing the loss value
    fn forward(&self, fixed: &Image<B>, moving: &Image<B>, transform: &impl Transform<B>) -> Tensor<B, 1>;

    /// Get the name of this metric.
    fn name(&self) -> &'static str;
}

/// How per-voxel similarity values are reduced to a scalar loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationMode {
    /// Sum over voxels. Gradients keep the magnitude of a single voxel term.
    None,
    /// Mean over voxels.
    #[default]
    ByCount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_mode_default() {
        let mode: NormalizationMode = Default::default();
        assert_eq!(mode, NormalizationMode::ByCount);
    }
}
