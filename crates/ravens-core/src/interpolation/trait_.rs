//! Interpolator trait for sampling values at continuous coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Samples a volume at continuous voxel indices.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// Interpolate values of a `[Z, Y, X]` volume.
    ///
    /// # Arguments
    /// * `data` - Source volume, shape `[Z, Y, X]`
    /// * `indices` - Continuous indices `[Batch, 3]` with columns `(x, y, z)`
    ///
    /// # Returns
    /// Sampled values `[Batch]`
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}
