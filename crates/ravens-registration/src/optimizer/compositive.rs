use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ravens_core::DeformationField;

use crate::profile::DeformableConfig;

/// Gradients with a largest norm below this are applied unnormalized.
const MIN_GRADIENT_NORM: f64 = 1.0;

/// Compositive steepest descent on a dense displacement field.
///
/// One step takes the per-voxel similarity gradient (mm⁻¹ units, one row
/// per voxel of the field grid) and:
///
/// 1. smooths it with a Gaussian of `gradient_sigma` voxels,
/// 2. scales it so the largest update is at most `learning_rate` voxels,
/// 3. composes the update with the current field, `u ← δ + u∘(id + δ)`,
/// 4. smooths the whole field with a Gaussian of `warp_sigma` voxels.
///
/// Gradients whose largest norm is below one are not amplified, so a field
/// at an optimum stays where it is.
#[derive(Debug, Clone)]
pub struct CompositiveDescent {
    learning_rate: f64,
    gradient_sigma: f64,
    warp_sigma: f64,
}

impl CompositiveDescent {
    pub fn new(learning_rate: f64, gradient_sigma: f64, warp_sigma: f64) -> Self {
        Self {
            learning_rate,
            gradient_sigma,
            warp_sigma,
        }
    }

    pub fn from_config(config: &DeformableConfig) -> Self {
        Self::new(config.learning_rate, config.gradient_sigma, config.warp_sigma)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Physical update `δ` for `gradient`, before composition.
    pub fn update<B: Backend>(&self, field: &DeformationField<B>, gradient: Tensor<B, 2>) -> Tensor<B, 2> {
        let smoothed = DeformationField::from_vectors(gradient, field.shape(), *field.geometry())
            .smooth(self.gradient_sigma);
        let norm = smoothed.max_norm();
        let max_step = self.learning_rate * field.geometry().min_spacing();
        let scale = max_step / norm.max(MIN_GRADIENT_NORM);
        smoothed.vectors().mul_scalar(-scale)
    }

    /// Descend one step along `gradient`.
    pub fn step<B: Backend>(&self, field: &DeformationField<B>, gradient: Tensor<B, 2>) -> DeformationField<B> {
        let delta = self.update(field, gradient);
        field.compose_update(delta).smooth(self.warp_sigma)
    }
}
