//! Separable 1D convolution along one axis of a `[Z, Y, X]` volume.

use burn::tensor::backend::Backend;
use burn::tensor::module::conv1d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::Tensor;

/// Convolve `input` with an odd-length `kernel` along tensor dimension `dim`.
///
/// The target dimension is permuted last and the others are flattened into
/// the batch, so a single `conv1d` call handles the whole volume. Borders are
/// zero-padded and the output keeps the input shape.
pub fn convolve_axis<B: Backend>(input: Tensor<B, 3>, kernel: &[f32], dim: usize) -> Tensor<B, 3> {
    if kernel.len() <= 1 {
        return match kernel.first() {
            Some(&k) if k != 1.0 => input * k,
            _ => input,
        };
    }

    let dims = input.dims();
    let device = input.device();

    // 1. Permute target dimension to the last
    let mut order = [0usize; 3];
    let mut next = 0;
    for i in 0..3 {
        if i != dim {
            order[next] = i;
            next += 1;
        }
    }
    order[2] = dim;
    let permuted = input.permute(order.map(|d| d as isize));

    // 2. Flatten other dimensions into batch: [Batch, 1, Length]
    let length = dims[dim];
    let batch = dims[order[0]] * dims[order[1]];
    let reshaped = permuted.reshape([batch, 1, length]);

    // Kernel: [OutChannels=1, InChannels=1, KernelSize]
    let size = kernel.len();
    let weight = Tensor::<B, 1>::from_floats(kernel, &device).reshape([1, 1, size]);

    let options = ConvOptions::new([1], [size / 2], [1], 1);
    let output = conv1d(reshaped, weight, None, options);

    // 3. Reshape back and invert the permutation
    let output = output.reshape([dims[order[0]], dims[order[1]], length]);
    let mut inverse = [0usize; 3];
    for (new_pos, &old_pos) in order.iter().enumerate() {
        inverse[old_pos] = new_pos;
    }
    output.permute(inverse.map(|d| d as isize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, TensorData};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn impulse(shape: [usize; 3], at: [usize; 3]) -> Tensor<Backend, 3> {
        let device = Default::default();
        let mut values = vec![0.0f32; shape.iter().product()];
        values[(at[0] * shape[1] + at[1]) * shape[2] + at[2]] = 1.0;
        Tensor::from_data(TensorData::new(values, Shape::new(shape)), &device)
    }

    #[test]
    fn test_shape_preserved_on_every_axis() {
        for dim in 0..3 {
            let out = convolve_axis(impulse([4, 5, 6], [2, 2, 2]), &[0.25, 0.5, 0.25], dim);
            assert_eq!(out.dims(), [4, 5, 6]);
        }
    }

    #[test]
    fn test_spreads_only_along_axis() {
        let out = convolve_axis(impulse([5, 5, 5], [2, 2, 2]), &[0.25, 0.5, 0.25], 2);
        let values: Vec<f32> = out.into_data().iter::<f32>().collect();
        let idx = |z: usize, y: usize, x: usize| (z * 5 + y) * 5 + x;
        assert!((values[idx(2, 2, 1)] - 0.25).abs() < 1e-6);
        assert!((values[idx(2, 2, 2)] - 0.5).abs() < 1e-6);
        assert!((values[idx(2, 2, 3)] - 0.25).abs() < 1e-6);
        assert_eq!(values[idx(2, 1, 2)], 0.0);
        assert_eq!(values[idx(1, 2, 2)], 0.0);
    }
}
