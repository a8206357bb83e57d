use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::image::{generate_grid_3d, Geometry, Image};
use crate::interpolation::trait_::Interpolator;
use crate::interpolation::LinearInterpolator;
use crate::transform::trait_::Transform;

/// Points per interpolation batch.
const CHUNK_SIZE: usize = 32768;

/// Resample an image onto a reference grid through a transform.
///
/// For every output voxel `x` the input is sampled at `T(x)`. Output voxels
/// whose sample falls outside the input are 0 with the default
/// [`LinearInterpolator`]. The computation is differentiable with respect to
/// the transform, which is how the registration metrics get their gradients.
pub struct ResampleImageFilter<B, T, I = LinearInterpolator>
where
    B: Backend,
    T: Transform<B>,
    I: Interpolator<B>,
{
    shape: [usize; 3],
    geometry: Geometry,
    transform: T,
    interpolator: I,
    _phantom: PhantomData<B>,
}

impl<B, T, I> ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B>,
    I: Interpolator<B>,
{
    pub fn new(shape: [usize; 3], geometry: Geometry, transform: T, interpolator: I) -> Self {
        Self {
            shape,
            geometry,
            transform,
            interpolator,
            _phantom: PhantomData,
        }
    }

    /// Output on the grid of `reference`.
    pub fn new_from_reference(reference: &Image<B>, transform: T, interpolator: I) -> Self {
        Self::new(reference.shape(), *reference.geometry(), transform, interpolator)
    }

    pub fn apply(&self, input: &Image<B>) -> Image<B> {
        Image::on_grid(self.resample_values(input), self.geometry)
    }

    /// Resampled values as a `[Z, Y, X]` tensor on the output grid.
    pub fn resample_values(&self, input: &Image<B>) -> Tensor<B, 3> {
        let device = input.device();
        let indices = generate_grid_3d::<B>(self.shape, &device);
        let [n, _] = indices.dims();

        let sample = |chunk: Tensor<B, 2>| {
            let output_points = self.geometry.index_to_world_tensor(chunk);
            let input_points = self.transform.transform_points(output_points);
            let input_indices = input.world_to_index_tensor(input_points);
            self.interpolator.interpolate(input.data(), input_indices)
        };

        // Chunked to bound the size of intermediate gather tensors
        let flat = if n <= CHUNK_SIZE {
            sample(indices)
        } else {
            let chunks = (0..n)
                .step_by(CHUNK_SIZE)
                .map(|start| sample(indices.clone().slice([start..(start + CHUNK_SIZE).min(n)])))
                .collect();
            Tensor::cat(chunks, 0)
        };

        flat.reshape(self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Vector3;
    use crate::transform::LinearTransform;
    use burn::tensor::{Shape, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn block_image() -> Image<TestBackend> {
        let device = Default::default();
        let mut data = vec![0.0; 10 * 10 * 10];
        for z in 4..6 {
            for y in 4..6 {
                for x in 4..6 {
                    data[(z * 10 + y) * 10 + x] = 1.0;
                }
            }
        }
        let tensor = Tensor::from_data(TensorData::new(data, Shape::new([10, 10, 10])), &device);
        Image::new(tensor, Geometry::identity()).unwrap()
    }

    #[test]
    fn test_resample_translation() {
        let image = block_image();
        // Output voxel x samples input at x + (-2, -1, 0): the block moves by (+2, +1, 0)
        let transform = LinearTransform::from_translation(Vector3::new(-2.0, -1.0, 0.0));
        let filter = ResampleImageFilter::new_from_reference(&image, transform, LinearInterpolator::new());
        let result = filter.apply(&image).to_vec();

        let at = |z: usize, y: usize, x: usize| result[(z * 10 + y) * 10 + x];
        assert!(at(4, 5, 6) > 0.9);
        assert!(at(5, 6, 7) > 0.9);
        assert!(at(4, 4, 4) < 0.1);
    }

    #[test]
    fn test_identity_reproduces_input() {
        let image = block_image();
        let filter = ResampleImageFilter::new_from_reference(&image, LinearTransform::identity(), LinearInterpolator::new());
        let result = filter.apply(&image);
        assert_eq!(result.geometry(), image.geometry());
        for (a, b) in result.to_vec().iter().zip(image.to_vec().iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_outside_is_zero() {
        let device = Default::default();
        let image = Image::new(Tensor::<TestBackend, 3>::ones([4, 4, 4], &device), Geometry::identity()).unwrap();
        let transform = LinearTransform::from_translation(Vector3::new(100.0, 0.0, 0.0));
        let filter = ResampleImageFilter::new_from_reference(&image, transform, LinearInterpolator::new());
        assert!(filter.apply(&image).to_vec().iter().all(|&v| v == 0.0));
    }
}
