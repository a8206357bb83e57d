//! Image filters: smoothing, subsampling, resampling and intensity rescaling.

pub mod box_mean;
pub mod convolution;
pub mod downsample;
pub mod gaussian;
pub mod intensity;
pub mod pyramid;
pub mod resample;

pub use box_mean::BoxFilter;
pub use downsample::DownsampleFilter;
pub use gaussian::{GaussianFilter, SigmaUnits};
pub use intensity::RescaleIntensityFilter;
pub use pyramid::MultiResolutionPyramid;
pub use resample::ResampleImageFilter;
