//! Transform trait for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps physical points from one space to another.
///
/// Registration transforms are used in resampling (pull-back) form: they
/// carry a point of the output (fixed) grid to the position in the input
/// (moving) volume whose intensity is sampled there.
///
/// The trait does not require `burn::module::Module`, so both trainable
/// transforms and plain host-side ones can be used for resampling.
pub trait Transform<B: Backend> {
    /// Apply the transform to `[Batch, 3]` physical points.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}

impl<B: Backend, T: Transform<B> + ?Sized> Transform<B> for &T {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        (**self).transform_points(points)
    }
}
