use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Continuous index grid for a `[nz, ny, nx]` volume.
///
/// Returns `[N, 3]` rows `(x, y, z)` in the same z-outer / x-inner order as
/// the flattened volume tensor, so row `i` addresses voxel `i` of
/// `data.reshape([N])`.
pub fn generate_grid_3d<B: Backend>(shape: [usize; 3], device: &B::Device) -> Tensor<B, 2> {
    let [d, h, w] = shape;
    let total = d * h * w;

    let mut grid = Vec::with_capacity(total * 3);
    for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                grid.push(x as f32);
                grid.push(y as f32);
                grid.push(z as f32);
            }
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * 3])), device)
        .reshape([total, 3])
}
