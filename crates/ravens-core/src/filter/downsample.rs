use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::image::Image;

/// Keeps every `factor`-th voxel along each axis, starting at index 0.
///
/// No smoothing is applied; pair it with a low-pass filter to avoid aliasing.
/// An axis of `n` voxels becomes `ceil(n / factor)` voxels.
pub struct DownsampleFilter<B: Backend> {
    factor: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> DownsampleFilter<B> {
    pub fn new(factor: usize) -> Self {
        Self {
            factor: factor.max(1),
            _b: std::marker::PhantomData,
        }
    }

    /// Output shape `[nz, ny, nx]` for an input shape.
    pub fn output_shape(&self, shape: [usize; 3]) -> [usize; 3] {
        shape.map(|n| n.div_ceil(self.factor))
    }

    pub fn apply(&self, image: &Image<B>) -> Image<B> {
        if self.factor == 1 {
            return image.clone();
        }
        let mut data = image.data().clone();
        let device = data.device();
        let dims = data.dims();

        for (d, &size) in dims.iter().enumerate() {
            let indices: Vec<i32> = (0..size).step_by(self.factor).map(|x| x as i32).collect();
            let indices = Tensor::<B, 1, Int>::from_ints(indices.as_slice(), &device);
            data = data.select(d, indices);
        }

        Image::on_grid(data, image.geometry().downsampled(self.factor))
    }
}
