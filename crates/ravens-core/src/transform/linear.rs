//! Host-side homogeneous linear transform.
//!
//! [`LinearTransform`] is the exchange type between registration stages and
//! the on-disk transform files. It holds a 4×4 `f64` matrix
//! `[[A, o], [0, 1]]` acting as `T(x) = A x + o` on physical points.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use thiserror::Error;

use super::trait_::Transform;
use crate::image::geometry::{matrix_tensor, vector_tensor};
use crate::spatial::{Affine4, Direction3, Point3, Vector3};

/// Smallest |det A| still treated as invertible.
pub const MIN_DETERMINANT: f64 = 1e-8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("transform is not invertible (det = {determinant:e})")]
    NonInvertible { determinant: f64 },

    #[error("transform contains NaN or infinite values")]
    NonFinite,

    #[error("displacement field must have shape [3, Z, Y, X], got {0:?}")]
    InvalidFieldShape(Vec<usize>),
}

/// Affine map of physical space stored as a homogeneous matrix.
///
/// Composition order: `a.then(&b)` applies `a` first and `b` second, i.e. the
/// matrix product `B · A`. `a.compose(&b)` is the mathematical composition
/// `a ∘ b` (apply `b` first), the matrix product `A · B`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTransform {
    matrix: Affine4,
}

impl LinearTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Affine4::identity(),
        }
    }

    /// Build from a homogeneous matrix. The last row is forced to `[0, 0, 0, 1]`.
    pub fn from_matrix(matrix: Affine4) -> Self {
        let mut matrix = matrix;
        matrix[(3, 0)] = 0.0;
        matrix[(3, 1)] = 0.0;
        matrix[(3, 2)] = 0.0;
        matrix[(3, 3)] = 1.0;
        Self { matrix }
    }

    /// `T(x) = A x + offset`.
    pub fn from_parts(linear: Direction3, offset: Vector3) -> Self {
        let mut matrix = Affine4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&offset);
        Self { matrix }
    }

    /// `T(x) = A (x - c) + c + t`, the centred parameterization used by ITK.
    pub fn centered(linear: Direction3, center: &Point3, translation: Vector3) -> Self {
        let offset = center.coords + translation - linear * center.coords;
        Self::from_parts(linear, offset)
    }

    pub fn from_translation(translation: Vector3) -> Self {
        Self::from_parts(Direction3::identity(), translation)
    }

    pub fn matrix(&self) -> &Affine4 {
        &self.matrix
    }

    /// Upper-left 3×3 block `A`.
    pub fn linear(&self) -> Direction3 {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Translation column `o`.
    pub fn offset(&self) -> Vector3 {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Translation `t` of the centred form about `center`.
    pub fn translation_about(&self, center: &Point3) -> Vector3 {
        self.transform_point(center) - center
    }

    pub fn transform_point(&self, point: &Point3) -> Point3 {
        Point3::from(self.linear() * point.coords + self.offset())
    }

    pub fn transform_vector(&self, vector: &Vector3) -> Vector3 {
        self.linear() * vector
    }

    /// Apply `self`, then `next`.
    pub fn then(&self, next: &Self) -> Self {
        Self::from_matrix(next.matrix * self.matrix)
    }

    /// `self ∘ inner`: apply `inner`, then `self`.
    pub fn compose(&self, inner: &Self) -> Self {
        inner.then(self)
    }

    pub fn determinant(&self) -> f64 {
        self.linear().determinant()
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|v| v.is_finite())
    }

    /// Check the transform is finite and invertible.
    pub fn validate(&self) -> Result<(), TransformError> {
        if !self.is_finite() {
            return Err(TransformError::NonFinite);
        }
        let determinant = self.determinant();
        if determinant.abs() < MIN_DETERMINANT {
            return Err(TransformError::NonInvertible { determinant });
        }
        Ok(())
    }

    pub fn inverse(&self) -> Result<Self, TransformError> {
        self.validate()?;
        let determinant = self.determinant();
        self.matrix
            .try_inverse()
            .map(Self::from_matrix)
            .ok_or(TransformError::NonInvertible { determinant })
    }

    /// Largest absolute element-wise difference between two matrices.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        (self.matrix - other.matrix).amax()
    }
}

impl Default for LinearTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl<B: Backend> Transform<B> for LinearTransform {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        // y = x @ A^T + o
        let a_t = matrix_tensor::<B>(&self.linear().transpose(), &device);
        points.matmul(a_t) + vector_tensor::<B>(&self.offset(), &device)
    }
}
