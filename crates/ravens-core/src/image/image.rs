//! Image type with physical geometry and coordinate transformations.
//!
//! This module provides the [`Image`] struct, the in-memory volume handle used
//! by every registration stage: a `[Z, Y, X]` tensor plus the [`Geometry`]
//! that places it in physical space.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::geometry::{Geometry, GeometryError};
use super::grid;
use crate::spatial::Point3;

/// 3D scalar volume with physical geometry.
///
/// The geometry is fixed at construction. Operations that change voxel values
/// return a new image sharing the same geometry ([`Image::with_data`]); there
/// is no way to mutate the geometry of an existing image.
///
/// # Examples
/// ```rust
/// use ravens_core::{Geometry, Image};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 12, 14], &device);
/// let image = Image::new(data, Geometry::isotropic(2.0)).unwrap();
/// assert_eq!(image.shape(), [10, 12, 14]);
/// assert_eq!(image.size_xyz(), [14, 12, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend> {
    /// Voxel values, shape `[Z, Y, X]`.
    data: Tensor<B, 3>,
    geometry: Geometry,
}

impl<B: Backend> Image<B> {
    /// Create an image, rejecting grids with an empty axis.
    pub fn new(data: Tensor<B, 3>, geometry: Geometry) -> Result<Self, GeometryError> {
        let shape: [usize; 3] = data.dims();
        if shape.iter().any(|&n| n == 0) {
            return Err(GeometryError::EmptyShape(shape));
        }
        Ok(Self { data, geometry })
    }

    /// Image on a grid whose shape is known to be non-empty.
    pub(crate) fn on_grid(data: Tensor<B, 3>, geometry: Geometry) -> Self {
        Self { data, geometry }
    }

    /// Image with new voxel values on the same grid.
    ///
    /// `data` must have the same shape as the current data.
    pub fn with_data(&self, data: Tensor<B, 3>) -> Self {
        debug_assert_eq!(data.dims(), self.shape());
        Self {
            data,
            geometry: self.geometry,
        }
    }

    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, 3> {
        self.data
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Tensor shape `[nz, ny, nx]`.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    /// Grid size in index order `[nx, ny, nz]`.
    pub fn size_xyz(&self) -> [usize; 3] {
        let [nz, ny, nx] = self.shape();
        [nx, ny, nz]
    }

    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Physical centre of the grid.
    pub fn center(&self) -> Point3 {
        self.geometry.center(self.shape())
    }

    /// Convert a physical point to a continuous index.
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point3) -> Point3 {
        self.geometry.physical_to_index(point)
    }

    /// Convert a continuous index to a physical point.
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point3) -> Point3 {
        self.geometry.index_to_physical(index)
    }

    /// Batch transform `[N, 3]` physical points to continuous indices.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.geometry.world_to_index_tensor(points)
    }

    /// Batch transform `[N, 3]` continuous indices to physical points.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        self.geometry.index_to_world_tensor(indices)
    }

    /// Physical coordinates of every voxel, `[N, 3]`, z-outer / x-inner order.
    pub fn physical_grid(&self) -> Tensor<B, 2> {
        let indices = grid::generate_grid_3d::<B>(self.shape(), &self.device());
        self.index_to_world_tensor(indices)
    }

    /// Voxel values copied to host memory in `[Z, Y, X]` row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.clone().into_data().iter::<f32>().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction3, Spacing3};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_image_creation() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([4, 5, 6], &device);
        let image = Image::new(data, Geometry::identity()).unwrap();

        assert_eq!(image.shape(), [4, 5, 6]);
        assert_eq!(image.size_xyz(), [6, 5, 4]);
        assert_eq!(image.num_voxels(), 120);
        assert_eq!(image.geometry(), &Geometry::identity());
    }

    #[test]
    fn test_empty_shape_rejected() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([0, 5, 6], &device);
        assert!(matches!(
            Image::new(data, Geometry::identity()),
            Err(GeometryError::EmptyShape([0, 5, 6]))
        ));
    }

    #[test]
    fn test_with_data_keeps_geometry() {
        let device = Default::default();
        let geometry = Geometry::new(
            Point3::new(1.0, 2.0, 3.0),
            Spacing3::new(0.5, 0.5, 2.0),
            Direction3::identity(),
        )
        .unwrap();
        let image = Image::new(Tensor::<Backend, 3>::zeros([3, 3, 3], &device), geometry).unwrap();
        let ones = image.with_data(Tensor::ones([3, 3, 3], &device));
        assert_eq!(ones.geometry(), image.geometry());
        assert!(ones.to_vec().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_physical_grid_order() {
        let device = Default::default();
        let image = Image::new(Tensor::<Backend, 3>::zeros([2, 2, 3], &device), Geometry::isotropic(2.0)).unwrap();
        let grid: Vec<f32> = image.physical_grid().into_data().iter::<f32>().collect();
        assert_eq!(grid.len(), 12 * 3);
        // second voxel steps along x
        assert_eq!(&grid[3..6], &[2.0, 0.0, 0.0]);
        // fourth voxel starts the next row in y
        assert_eq!(&grid[9..12], &[0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_transform_roundtrip() {
        let device = Default::default();
        let image = Image::new(Tensor::<Backend, 3>::zeros([10, 10, 10], &device), Geometry::isotropic(1.5)).unwrap();
        let point = Point3::new(3.5, 4.5, 5.5);
        let index = image.transform_physical_point_to_continuous_index(&point);
        let back = image.transform_continuous_index_to_physical_point(&index);
        assert!((point - back).norm() < 1e-12);
    }
}
