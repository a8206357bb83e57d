use burn::tensor::backend::Backend;

use super::downsample::DownsampleFilter;
use super::gaussian::GaussianFilter;
use crate::image::Image;

/// Anti-aliasing sigma, in voxels of the input grid, for a shrink factor.
pub fn smoothing_sigma(factor: usize) -> f64 {
    if factor > 1 {
        0.5 * factor as f64
    } else {
        0.0
    }
}

/// Coarse-to-fine views of one volume.
///
/// Each level is the input smoothed with a Gaussian of σ = 0.5·factor voxels
/// and then subsampled by `factor`. A factor of 1 keeps the input untouched.
/// Every level keeps the input's origin and direction, so a physical point
/// means the same thing at every level.
pub struct MultiResolutionPyramid<B: Backend> {
    factors: Vec<usize>,
    images: Vec<Image<B>>,
}

impl<B: Backend> MultiResolutionPyramid<B> {
    pub fn new(input: &Image<B>, shrink_factors: &[usize]) -> Self {
        let images = shrink_factors
            .iter()
            .map(|&factor| {
                if factor <= 1 {
                    return input.clone();
                }
                let smoothed = GaussianFilter::in_voxels(smoothing_sigma(factor)).apply(input);
                DownsampleFilter::new(factor).apply(&smoothed)
            })
            .collect();

        Self {
            factors: shrink_factors.to_vec(),
            images,
        }
    }

    pub fn get_level(&self, level: usize) -> Option<&Image<B>> {
        self.images.get(level)
    }

    pub fn factor(&self, level: usize) -> Option<usize> {
        self.factors.get(level).copied()
    }

    pub fn levels(&self) -> usize {
        self.images.len()
    }
}
