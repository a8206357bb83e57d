//! Trainable affine transform.
//!
//! This module provides the affine transform optimized by the affine stage.

use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::linear::LinearTransform;
use super::trait_::Transform;
use crate::spatial::{Direction3, Point3, Vector3};

/// Affine Transform (linear map + translation) with a fixed center:
///
/// T(x) = A(x - c) + c + s·t
///
/// where:
/// * A is a 3×3 matrix (rotation, scale, shear)
/// * t is the translation, stored in units of `s`
/// * c is a fixed center, usually the physical center of the fixed grid
/// * s is a fixed length scale (mm), usually the grid's half extent
///
/// Scaling the translation by `s` keeps the gradients of `A` and `t` on the
/// same order of magnitude, so a single learning rate suits both.
#[derive(Module, Debug)]
pub struct AffineTransform<B: Backend> {
    matrix: Param<Tensor<B, 2>>,      // [3, 3] linear transformation matrix
    translation: Param<Tensor<B, 1>>, // [3] translation in units of `translation_scale`
    center: Tensor<B, 1>,             // [3] fixed center
    translation_scale: f64,
}

impl<B: Backend> AffineTransform<B> {
    /// Create a new affine transform.
    ///
    /// # Arguments
    /// * `matrix` - Tensor of shape `[3, 3]`
    /// * `translation` - Tensor of shape `[3]`, in units of `translation_scale`
    /// * `center` - Tensor of shape `[3]`
    /// * `translation_scale` - Length (mm) of one translation unit
    pub fn new(
        matrix: Tensor<B, 2>,
        translation: Tensor<B, 1>,
        center: Tensor<B, 1>,
        translation_scale: f64,
    ) -> Self {
        Self {
            matrix: Param::from_tensor(matrix),
            translation: Param::from_tensor(translation),
            center,
            translation_scale: if translation_scale > 0.0 { translation_scale } else { 1.0 },
        }
    }

    /// Identity transform about `center`.
    pub fn identity(center: &Point3, translation_scale: f64, device: &B::Device) -> Self {
        Self::from_linear(&LinearTransform::identity(), center, translation_scale, device)
    }

    /// Re-parameterize a host transform about `center`.
    pub fn from_linear(
        linear: &LinearTransform,
        center: &Point3,
        translation_scale: f64,
        device: &B::Device,
    ) -> Self {
        let scale = if translation_scale > 0.0 { translation_scale } else { 1.0 };
        let a = linear.linear();
        let t = linear.translation_about(center) / scale;

        let mut matrix_data = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                matrix_data.push(a[(r, c)] as f32);
            }
        }
        let matrix = Tensor::from_data(TensorData::new(matrix_data, Shape::new([3, 3])), device);
        let translation = Tensor::from_data(
            TensorData::new(vec![t[0] as f32, t[1] as f32, t[2] as f32], Shape::new([3])),
            device,
        );
        let center = Tensor::from_data(
            TensorData::new(
                vec![center[0] as f32, center[1] as f32, center[2] as f32],
                Shape::new([3]),
            ),
            device,
        );

        Self::new(matrix, translation, center, scale)
    }

    /// Get the transformation matrix.
    pub fn matrix(&self) -> Tensor<B, 2> {
        self.matrix.val()
    }

    /// Get the translation parameter (in units of the translation scale).
    pub fn translation(&self) -> Tensor<B, 1> {
        self.translation.val()
    }

    /// Get the center of rotation.
    pub fn center(&self) -> Tensor<B, 1> {
        self.center.clone()
    }

    pub fn translation_scale(&self) -> f64 {
        self.translation_scale
    }

    /// Copy the current parameters into a host [`LinearTransform`].
    pub fn to_linear(&self) -> LinearTransform {
        let a: Vec<f64> = self.matrix.val().into_data().iter::<f32>().map(f64::from).collect();
        let t: Vec<f64> = self.translation.val().into_data().iter::<f32>().map(f64::from).collect();
        let c: Vec<f64> = self.center.clone().into_data().iter::<f32>().map(f64::from).collect();

        let linear = Direction3::from_row_slice(&a);
        let center = Point3::new(c[0], c[1], c[2]);
        let translation = Vector3::new(t[0], t[1], t[2]) * self.translation_scale;
        LinearTransform::centered(linear, &center, translation)
    }
}

impl<B: Backend> Transform<B> for AffineTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row vectors: y = (x - c) @ A^T + c + s t
        let c = self.center.clone().reshape([1, 3]);
        let t = self.translation.val().reshape([1, 3]) * self.translation_scale;
        let a = self.matrix.val();

        let centered = points - c.clone();
        centered.matmul(a.transpose()) + c + t
    }
}
