//! Trilinear interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};

use super::trait_::Interpolator;

/// How samples outside the grid are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Boundary {
    /// Corners outside the grid contribute zero, so values fade to 0 over the
    /// last voxel and are exactly 0 one voxel beyond the edge.
    #[default]
    Zero,
    /// Indices are clamped to the edge voxel.
    Clamp,
}

/// Trilinear interpolator.
///
/// Differentiable with respect to the sample positions, which is what the
/// registration stages rely on to get gradients for transform parameters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator {
    boundary: Boundary,
}

impl LinearInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boundary(boundary: Boundary) -> Self {
        Self { boundary }
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    /// Per-axis corner weights `(w0, w1)` and clamped integer corners `(i0, i1)`.
    fn axis<B: Backend>(
        &self,
        coord: Tensor<B, 1>,
        size: usize,
    ) -> (Tensor<B, 1>, Tensor<B, 1>, Tensor<B, 1, Int>, Tensor<B, 1, Int>) {
        let max = (size - 1) as f64;
        let c0 = coord.clone().floor();
        let c1 = c0.clone() + 1.0;
        let frac = coord - c0.clone();
        let one_minus = frac.clone().neg() + 1.0;

        let (w0, w1) = match self.boundary {
            Boundary::Clamp => (one_minus, frac),
            Boundary::Zero => {
                let in0 = c0.clone().greater_equal_elem(0.0).float()
                    * c0.clone().lower_equal_elem(max).float();
                let in1 = c1.clone().greater_equal_elem(0.0).float()
                    * c1.clone().lower_equal_elem(max).float();
                (one_minus * in0, frac * in1)
            }
        };

        (w0, w1, c0.clamp(0.0, max).int(), c1.clamp(0.0, max).int())
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d, h, w] = data.dims();

        // indices: [Batch, 3] -> (x, y, z)
        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let (wx0, wx1, x0, x1) = self.axis(x, w);
        let (wy0, wy1, y0, y1) = self.axis(y, h);
        let (wz0, wz1, z0, z1) = self.axis(z, d);

        // Strides for [Z, Y, X] layout
        let stride_z = (h * w) as i32;
        let stride_y = w as i32;
        let flat = data.clone().reshape([d * h * w]);

        let gather = |xi: &Tensor<B, 1, Int>, yi: &Tensor<B, 1, Int>, zi: &Tensor<B, 1, Int>| {
            let idx = zi.clone() * stride_z + yi.clone() * stride_y + xi.clone();
            flat.clone().gather(0, idx)
        };

        // Interpolate along X
        let c00 = gather(&x0, &y0, &z0) * wx0.clone() + gather(&x1, &y0, &z0) * wx1.clone();
        let c10 = gather(&x0, &y1, &z0) * wx0.clone() + gather(&x1, &y1, &z0) * wx1.clone();
        let c01 = gather(&x0, &y0, &z1) * wx0.clone() + gather(&x1, &y0, &z1) * wx1.clone();
        let c11 = gather(&x0, &y1, &z1) * wx0 + gather(&x1, &y1, &z1) * wx1;

        // Interpolate along Y
        let c0 = c00 * wy0.clone() + c10 * wy1.clone();
        let c1 = c01 * wy0 + c11 * wy1;

        // Interpolate along Z
        c0 * wz0 + c1 * wz1
    }
}
