//! Dense displacement fields.
//!
//! A [`DeformationField`] stores one physical (RAS, mm) displacement vector
//! per voxel of a reference grid, as a `[3, Z, Y, X]` tensor whose leading
//! axis holds the `(x, y, z)` components. Used as a transform it maps
//! `p → p + u(p)`, with `u` trilinearly interpolated and clamped at the
//! grid edge.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

use super::linear::TransformError;
use super::trait_::Transform;
use crate::filter::gaussian::GaussianFilter;
use crate::image::{generate_grid_3d, Geometry};
use crate::interpolation::{Boundary, Interpolator, LinearInterpolator};
use crate::spatial::{Direction3, Vector3};

/// Points per interpolation batch when sampling a whole grid.
const CHUNK_SIZE: usize = 32768;

#[derive(Debug, Clone)]
pub struct DeformationField<B: Backend> {
    displacement: Tensor<B, 4>,
    geometry: Geometry,
}

impl<B: Backend> DeformationField<B> {
    pub fn new(displacement: Tensor<B, 4>, geometry: Geometry) -> Result<Self, TransformError> {
        let dims = displacement.dims();
        if dims[0] != 3 || dims[1..].iter().any(|&n| n == 0) {
            return Err(TransformError::InvalidFieldShape(dims.to_vec()));
        }
        Ok(Self { displacement, geometry })
    }

    /// Identity field on a `[nz, ny, nx]` grid.
    pub fn zeros(shape: [usize; 3], geometry: Geometry, device: &B::Device) -> Self {
        let [nz, ny, nx] = shape;
        Self {
            displacement: Tensor::zeros([3, nz, ny, nx], device),
            geometry,
        }
    }

    /// Build from per-voxel rows `[N, 3]` in grid order.
    pub fn from_vectors(vectors: Tensor<B, 2>, shape: [usize; 3], geometry: Geometry) -> Self {
        let [nz, ny, nx] = shape;
        Self {
            displacement: vectors.swap_dims(0, 1).reshape([3, nz, ny, nx]),
            geometry,
        }
    }

    pub fn displacement(&self) -> &Tensor<B, 4> {
        &self.displacement
    }

    pub fn into_displacement(self) -> Tensor<B, 4> {
        self.displacement
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Grid shape `[nz, ny, nx]`.
    pub fn shape(&self) -> [usize; 3] {
        let [_, nz, ny, nx] = self.displacement.dims();
        [nz, ny, nx]
    }

    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn device(&self) -> B::Device {
        self.displacement.device()
    }

    /// Per-voxel displacement rows `[N, 3]` in grid order.
    pub fn vectors(&self) -> Tensor<B, 2> {
        let n = self.num_voxels();
        self.displacement.clone().reshape([3, n]).swap_dims(0, 1)
    }

    /// One displacement component as a `[Z, Y, X]` volume.
    pub fn component(&self, axis: usize) -> Tensor<B, 3> {
        let [nz, ny, nx] = self.shape();
        self.displacement.clone().narrow(0, axis, 1).reshape([nz, ny, nx])
    }

    /// Physical positions of the grid voxels, `[N, 3]`.
    pub fn grid_points(&self) -> Tensor<B, 2> {
        let indices = generate_grid_3d::<B>(self.shape(), &self.device());
        self.geometry.index_to_world_tensor(indices)
    }

    /// Interpolate displacements at `[N, 3]` physical points.
    pub fn sample(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let indices = self.geometry.world_to_index_tensor(points);
        let interpolator = LinearInterpolator::with_boundary(Boundary::Clamp);
        let components = (0..3)
            .map(|axis| interpolator.interpolate(&self.component(axis), indices.clone()))
            .collect();
        Tensor::stack(components, 1)
    }

    /// Resample the field onto another grid.
    ///
    /// Displacements are physical, so their values are carried over without
    /// rescaling when the grid spacing changes.
    pub fn resample_to(&self, geometry: Geometry, shape: [usize; 3]) -> Self {
        let indices = generate_grid_3d::<B>(shape, &self.device());
        let points = geometry.index_to_world_tensor(indices);
        let [n, _] = points.dims();

        let vectors = if n <= CHUNK_SIZE {
            self.sample(points)
        } else {
            let chunks = (0..n)
                .step_by(CHUNK_SIZE)
                .map(|start| {
                    let end = (start + CHUNK_SIZE).min(n);
                    self.sample(points.clone().slice([start..end]))
                })
                .collect();
            Tensor::cat(chunks, 0)
        };
        Self::from_vectors(vectors, shape, geometry)
    }

    /// Compositive update `u'(x) = δ(x) + u(x + δ(x))`.
    ///
    /// `delta` holds one physical displacement per voxel of this field's grid.
    pub fn compose_update(&self, delta: Tensor<B, 2>) -> Self {
        let moved = self.grid_points() + delta.clone();
        let carried = self.sample(moved);
        Self::from_vectors(delta + carried, self.shape(), self.geometry)
    }

    /// Gaussian smoothing of every component with `sigma` given in voxels.
    pub fn smooth(&self, sigma: f64) -> Self {
        if sigma <= 0.0 {
            return self.clone();
        }
        let filter = GaussianFilter::<B>::in_voxels(sigma);
        let components = (0..3)
            .map(|axis| filter.apply_tensor(self.component(axis), self.geometry.spacing()))
            .collect();
        Self {
            displacement: Tensor::stack(components, 0),
            geometry: self.geometry,
        }
    }

    /// Largest displacement magnitude in millimetres.
    pub fn max_norm(&self) -> f64 {
        self.displacement
            .clone()
            .powf_scalar(2.0)
            .sum_dim(0)
            .sqrt()
            .max()
            .into_scalar()
            .elem::<f64>()
    }

    pub fn is_finite(&self) -> bool {
        self.displacement
            .clone()
            .into_data()
            .iter::<f32>()
            .all(f32::is_finite)
    }

    /// Jacobian determinant of `x → x + u(x)` at every voxel, in grid order.
    ///
    /// Derivatives use central differences (one-sided at the edges) in index
    /// space. Values `<= 0` indicate folding.
    pub fn jacobian_determinant(&self) -> Vec<f64> {
        let [nz, ny, nx] = self.shape();
        let n = nz * ny * nx;
        let data: Vec<f32> = self.displacement.clone().into_data().iter::<f32>().collect();
        let at = |z: usize, y: usize, x: usize| {
            let i = (z * ny + y) * nx + x;
            Vector3::new(data[i] as f64, data[n + i] as f64, data[2 * n + i] as f64)
        };
        let neighbours = |i: usize, size: usize| {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(size - 1);
            (lo, hi, (hi - lo).max(1) as f64)
        };

        let mut determinants = Vec::with_capacity(n);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let (x0, x1, dx) = neighbours(x, nx);
                    let (y0, y1, dy) = neighbours(y, ny);
                    let (z0, z1, dz) = neighbours(z, nz);
                    let columns = [
                        (at(z, y, x1) - at(z, y, x0)) / dx,
                        (at(z, y1, x) - at(z, y0, x)) / dy,
                        (at(z1, y, x) - at(z0, y, x)) / dz,
                    ];
                    let mut jacobian = Direction3::identity();
                    for (axis, column) in columns.iter().enumerate() {
                        let du = self.geometry.physical_to_index_vector(column);
                        let updated = jacobian.column(axis) + du;
                        jacobian.set_column(axis, &updated);
                    }
                    determinants.push(jacobian.determinant());
                }
            }
        }
        determinants
    }

    /// Mean round-trip error `|u(x) + v(x + u(x))|` in millimetres.
    ///
    /// `inverse` must live on a grid covering this one; both fields of a
    /// registration share the fixed grid.
    pub fn inverse_consistency_error(&self, inverse: &Self) -> f64 {
        let u = self.vectors();
        let v = inverse.sample(self.grid_points() + u.clone());
        (u + v)
            .powf_scalar(2.0)
            .sum_dim(1)
            .sqrt()
            .mean()
            .into_scalar()
            .elem::<f64>()
    }
}

impl<B: Backend> Transform<B> for DeformationField<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let displacement = self.sample(points.clone());
        points + displacement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, TensorData};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn constant_field(shift: [f32; 3], shape: [usize; 3]) -> DeformationField<Backend> {
        let device = Default::default();
        let n: usize = shape.iter().product();
        let mut values = Vec::with_capacity(3 * n);
        for s in shift {
            values.extend(std::iter::repeat(s).take(n));
        }
        let [nz, ny, nx] = shape;
        let tensor = Tensor::from_data(TensorData::new(values, Shape::new([3, nz, ny, nx])), &device);
        DeformationField::new(tensor, Geometry::isotropic(2.0)).unwrap()
    }

    #[test]
    fn test_rejects_bad_shape() {
        let device = Default::default();
        let tensor = Tensor::<Backend, 4>::zeros([2, 4, 4, 4], &device);
        assert!(matches!(
            DeformationField::new(tensor, Geometry::identity()),
            Err(TransformError::InvalidFieldShape(_))
        ));
    }

    #[test]
    fn test_zero_field_is_identity() {
        let device = Default::default();
        let field = DeformationField::<Backend>::zeros([4, 5, 6], Geometry::identity(), &device);
        let points = Tensor::<Backend, 2>::from_floats([[1.5, 2.0, 3.25]], &device);
        let mapped: Vec<f32> = field.transform_points(points).into_data().iter::<f32>().collect();
        assert_eq!(mapped, vec![1.5, 2.0, 3.25]);
        assert_eq!(field.max_norm(), 0.0);
        assert!(field.is_finite());
    }

    #[test]
    fn test_vectors_roundtrip_layout() {
        let field = constant_field([1.0, -2.0, 0.5], [3, 4, 5]);
        let vectors: Vec<f32> = field.vectors().into_data().iter::<f32>().collect();
        assert_eq!(&vectors[0..3], &[1.0, -2.0, 0.5]);
        let rebuilt = DeformationField::from_vectors(field.vectors(), field.shape(), *field.geometry());
        let a: Vec<f32> = rebuilt.displacement().clone().into_data().iter::<f32>().collect();
        let b: Vec<f32> = field.displacement().clone().into_data().iter::<f32>().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_compose_constant_fields_adds() {
        let field = constant_field([1.0, 0.0, -1.0], [4, 4, 4]);
        let delta = constant_field([0.5, 0.25, 0.0], [4, 4, 4]).vectors();
        let composed = field.compose_update(delta);
        let values: Vec<f32> = composed.vectors().into_data().iter::<f32>().collect();
        for row in values.chunks(3) {
            assert!((row[0] - 1.5).abs() < 1e-5);
            assert!((row[1] - 0.25).abs() < 1e-5);
            assert!((row[2] + 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_resample_keeps_physical_values() {
        let field = constant_field([2.0, 0.0, 0.0], [4, 4, 4]);
        let fine = field.resample_to(Geometry::isotropic(1.0), [8, 8, 8]);
        assert_eq!(fine.shape(), [8, 8, 8]);
        assert!((fine.max_norm() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_smoothing_preserves_constant_interior() {
        let field = constant_field([1.0, 1.0, 1.0], [9, 9, 9]);
        let smooth = field.smooth(0.5);
        let center: Vec<f32> = smooth.sample(Tensor::from_floats([[8.0, 8.0, 8.0]], &smooth.device()))
            .into_data()
            .iter::<f32>()
            .collect();
        for v in center {
            assert!((v - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_jacobian_of_identity_and_translation() {
        let field = constant_field([3.0, -1.0, 2.0], [4, 5, 6]);
        assert!(field.jacobian_determinant().iter().all(|d| (d - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_inverse_consistency_of_opposite_shifts() {
        let forward = constant_field([1.0, 0.0, 0.0], [6, 6, 6]);
        let inverse = constant_field([-1.0, 0.0, 0.0], [6, 6, 6]);
        assert!(forward.inverse_consistency_error(&inverse) < 1e-5);
        let wrong = constant_field([1.0, 0.0, 0.0], [6, 6, 6]);
        assert!((forward.inverse_consistency_error(&wrong) - 2.0).abs() < 1e-4);
    }
}
