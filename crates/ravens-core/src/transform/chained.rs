//! Chained transform implementation.
//!
//! T(x) = T2(T1(x))

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Transform;

/// Chained Transform (T2 after T1).
///
/// The full registration warp is a chain of the dense field followed by the
/// linear transform: a fixed point `x` samples the moving image at
/// `L(x + u(x))`.
#[derive(Debug, Clone)]
pub struct ChainedTransform<B: Backend, T1, T2> {
    pub first: T1,
    pub second: T2,
    _phantom: PhantomData<B>,
}

impl<B: Backend, T1, T2> ChainedTransform<B, T1, T2> {
    /// Create a new chained transform.
    ///
    /// # Arguments
    /// * `first` - The first transform to apply
    /// * `second` - The second transform to apply
    pub fn new(first: T1, second: T2) -> Self {
        Self {
            first,
            second,
            _phantom: PhantomData,
        }
    }
}

impl<B, T1, T2> Transform<B> for ChainedTransform<B, T1, T2>
where
    B: Backend,
    T1: Transform<B>,
    T2: Transform<B>,
{
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let intermediate = self.first.transform_points(points);
        self.second.transform_points(intermediate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Geometry;
    use crate::spatial::{Direction3, Vector3};
    use crate::transform::{DeformationField, LinearTransform};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_field_then_linear() {
        let device = Default::default();

        // u = 0 everywhere except through the affine: scale by 2 then shift x by 1
        let field = DeformationField::<TestBackend>::zeros([4, 4, 4], Geometry::identity(), &device);
        let linear = LinearTransform::from_parts(
            Direction3::from_diagonal_element(2.0),
            Vector3::new(1.0, 0.0, 0.0),
        );
        let chain = ChainedTransform::new(field, linear);

        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0, 1.0]], &device);
        let values: Vec<f32> = chain.transform_points(points).into_data().iter::<f32>().collect();
        assert_eq!(values, vec![3.0, 2.0, 2.0]);
    }

    #[test]
    fn test_order_matters() {
        let device = Default::default();
        let shift = LinearTransform::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let scale = LinearTransform::from_parts(Direction3::from_diagonal_element(3.0), Vector3::zeros());

        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0, 0.0]], &device);
        let a: Vec<f32> = ChainedTransform::<TestBackend, _, _>::new(shift, scale)
            .transform_points(points.clone())
            .into_data()
            .iter::<f32>()
            .collect();
        let b: Vec<f32> = ChainedTransform::<TestBackend, _, _>::new(scale, shift)
            .transform_points(points)
            .into_data()
            .iter::<f32>()
            .collect();
        assert_eq!(a[0], 6.0);
        assert_eq!(b[0], 4.0);
    }
}
