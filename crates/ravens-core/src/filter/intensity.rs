use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;

use crate::image::Image;

/// Linear min-max rescaling of voxel values to `[out_min, out_max]`.
///
/// A constant image maps to `out_min` everywhere.
#[derive(Debug, Clone, Copy)]
pub struct RescaleIntensityFilter {
    out_min: f64,
    out_max: f64,
}

impl RescaleIntensityFilter {
    pub fn new(out_min: f64, out_max: f64) -> Self {
        Self { out_min, out_max }
    }

    /// Rescale to `[0, 1]`.
    pub fn unit() -> Self {
        Self::new(0.0, 1.0)
    }

    pub fn apply<B: Backend>(&self, image: &Image<B>) -> Image<B> {
        let data = image.data().clone();
        let min = data.clone().min().into_scalar().elem::<f64>();
        let max = data.clone().max().into_scalar().elem::<f64>();
        let range = max - min;

        if !range.is_finite() || range <= f64::EPSILON {
            return image.with_data(data.zeros_like() + self.out_min);
        }

        let scale = (self.out_max - self.out_min) / range;
        image.with_data((data - min) * scale + self.out_min)
    }
}
