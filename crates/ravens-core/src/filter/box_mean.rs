use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::convolution::convolve_axis;

/// Cubic moving-average filter.
///
/// Each output voxel is the mean over a `window³` neighbourhood, with zeros
/// beyond the border. Used for windowed image statistics.
#[derive(Debug, Clone)]
pub struct BoxFilter<B: Backend> {
    window: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> BoxFilter<B> {
    /// `window` is rounded up to the next odd size.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1) | 1,
            _b: std::marker::PhantomData,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn apply_tensor(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let kernel = vec![1.0 / self.window as f32; self.window];
        (0..3).fold(input, |data, dim| convolve_axis(data, &kernel, dim))
    }
}
