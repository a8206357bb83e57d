//! Physical geometry of a voxel grid.
//!
//! A [`Geometry`] maps continuous voxel indices `(x, y, z)` to physical RAS
//! coordinates in millimetres:
//!
//! `point = origin + Direction * (index ⊙ spacing)`
//!
//! Grid shapes are always given in tensor order `[nz, ny, nx]`.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use thiserror::Error;

use crate::spatial::{Affine4, Direction3, Point3, Spacing3, Vector3};

/// Errors raised when a geometry cannot describe a valid grid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("spacing must be finite and strictly positive, got {0:?}")]
    InvalidSpacing([f64; 3]),

    #[error("origin must be finite, got {0:?}")]
    InvalidOrigin([f64; 3]),

    #[error("direction matrix is singular or not finite")]
    SingularDirection,

    #[error("grid shape {0:?} has an empty axis")]
    EmptyShape([usize; 3]),
}

/// Origin, spacing and direction of a regular 3D grid.
///
/// The matrices used for index/physical conversion are computed once at
/// construction, so a `Geometry` is cheap to copy and never changes after it
/// is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
    // Direction * diag(spacing) and its inverse.
    index_to_physical: Direction3,
    physical_to_index: Direction3,
}

impl Geometry {
    /// Create a validated geometry.
    pub fn new(
        origin: Point3,
        spacing: Spacing3,
        direction: Direction3,
    ) -> Result<Self, GeometryError> {
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(GeometryError::InvalidSpacing([spacing[0], spacing[1], spacing[2]]));
        }
        if origin.coords.iter().any(|o| !o.is_finite()) {
            return Err(GeometryError::InvalidOrigin([origin[0], origin[1], origin[2]]));
        }
        if direction.iter().any(|d| !d.is_finite()) || direction.determinant().abs() < 1e-12 {
            return Err(GeometryError::SingularDirection);
        }

        let index_to_physical = direction * Direction3::from_diagonal(&spacing);
        let physical_to_index = index_to_physical
            .try_inverse()
            .ok_or(GeometryError::SingularDirection)?;

        Ok(Self {
            origin,
            spacing,
            direction,
            index_to_physical,
            physical_to_index,
        })
    }

    /// Unit spacing, zero origin and identity direction.
    pub fn identity() -> Self {
        Self::isotropic(1.0)
    }

    /// Zero origin and identity direction with the same spacing on every axis.
    ///
    /// Non-positive spacing falls back to 1mm.
    pub fn isotropic(spacing: f64) -> Self {
        let spacing = if spacing.is_finite() && spacing > 0.0 { spacing } else { 1.0 };
        let diag = Direction3::from_diagonal_element(spacing);
        Self {
            origin: Point3::origin(),
            spacing: Spacing3::repeat(spacing),
            direction: Direction3::identity(),
            index_to_physical: diag,
            physical_to_index: Direction3::from_diagonal_element(1.0 / spacing),
        }
    }

    /// Decompose a 4×4 voxel-to-physical matrix (NIfTI sform layout).
    ///
    /// Column norms of the upper 3×3 block give the spacing; the normalized
    /// columns give the direction.
    pub fn from_affine(affine: &Affine4) -> Result<Self, GeometryError> {
        let linear = affine.fixed_view::<3, 3>(0, 0).into_owned();
        let mut spacing = Spacing3::zeros();
        let mut direction = Direction3::identity();
        for c in 0..3 {
            let column = linear.column(c).into_owned();
            let norm = column.norm();
            spacing[c] = norm;
            if norm > 1e-12 {
                direction.set_column(c, &(column / norm));
            }
        }
        let origin = Point3::new(affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]);
        Self::new(origin, spacing, direction)
    }

    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    /// `index → physical` as a homogeneous 4×4 matrix.
    pub fn to_affine(&self) -> Affine4 {
        let mut affine = Affine4::identity();
        affine
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.index_to_physical);
        affine[(0, 3)] = self.origin[0];
        affine[(1, 3)] = self.origin[1];
        affine[(2, 3)] = self.origin[2];
        affine
    }

    /// Map a continuous index `(x, y, z)` to a physical point.
    pub fn index_to_physical(&self, index: &Point3) -> Point3 {
        self.origin + self.index_to_physical * index.coords
    }

    /// Map a physical point to a continuous index `(x, y, z)`.
    pub fn physical_to_index(&self, point: &Point3) -> Point3 {
        Point3::from(self.physical_to_index * (point - self.origin))
    }

    /// Map a displacement expressed in physical millimetres to index units.
    pub fn physical_to_index_vector(&self, vector: &Vector3) -> Vector3 {
        self.physical_to_index * vector
    }

    /// Physical position of the geometric centre of a grid of `shape = [nz, ny, nx]`.
    pub fn center(&self, shape: [usize; 3]) -> Point3 {
        let half = |n: usize| (n.saturating_sub(1)) as f64 / 2.0;
        self.index_to_physical(&Point3::new(half(shape[2]), half(shape[1]), half(shape[0])))
    }

    /// Largest half-extent of the grid along any axis, in millimetres.
    pub fn max_half_extent(&self, shape: [usize; 3]) -> f64 {
        let counts = [shape[2], shape[1], shape[0]];
        (0..3)
            .map(|a| self.spacing[a] * counts[a].saturating_sub(1) as f64 / 2.0)
            .fold(0.0, f64::max)
    }

    /// Smallest voxel spacing.
    pub fn min_spacing(&self) -> f64 {
        self.spacing.min()
    }

    /// Geometry of the grid obtained by keeping every `factor`-th voxel from index 0.
    ///
    /// The origin is unchanged so that voxel 0 keeps its physical position.
    pub fn downsampled(&self, factor: usize) -> Self {
        let factor = factor.max(1) as f64;
        let index_to_physical = self.index_to_physical * factor;
        Self {
            origin: self.origin,
            spacing: self.spacing * factor,
            direction: self.direction,
            index_to_physical,
            physical_to_index: self.physical_to_index / factor,
        }
    }

    /// Batch map `[N, 3]` continuous indices to physical points.
    pub fn index_to_world_tensor<B: Backend>(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        // P = O + I @ M with M[r, c] = (Direction * diag(spacing))[c, r]
        let m = matrix_tensor::<B>(&self.index_to_physical.transpose(), &device);
        indices.matmul(m) + vector_tensor::<B>(&self.origin.coords, &device)
    }

    /// Batch map `[N, 3]` physical points to continuous indices.
    pub fn world_to_index_tensor<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let t = matrix_tensor::<B>(&self.physical_to_index.transpose(), &device);
        (points - vector_tensor::<B>(&self.origin.coords, &device)).matmul(t)
    }

    /// Whether two geometries describe the same physical grid within `tolerance`.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.origin - other.origin).amax() <= tolerance
            && (self.spacing - other.spacing).amax() <= tolerance
            && (self.direction - other.direction).amax() <= tolerance
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::identity()
    }
}

/// Row-major `[3, 3]` tensor from a nalgebra matrix.
pub(crate) fn matrix_tensor<B: Backend>(m: &Direction3, device: &B::Device) -> Tensor<B, 2> {
    let mut data = Vec::with_capacity(9);
    for r in 0..3 {
        for c in 0..3 {
            data.push(m[(r, c)] as f32);
        }
    }
    Tensor::from_data(TensorData::new(data, Shape::new([3, 3])), device)
}

/// `[1, 3]` row tensor from a vector, for broadcasting against `[N, 3]`.
pub(crate) fn vector_tensor<B: Backend>(v: &Vector3, device: &B::Device) -> Tensor<B, 2> {
    let data = vec![v[0] as f32, v[1] as f32, v[2] as f32];
    Tensor::from_data(TensorData::new(data, Shape::new([1, 3])), device)
}
