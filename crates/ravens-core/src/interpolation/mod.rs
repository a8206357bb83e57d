//! Interpolation of volumes at continuous indices.

pub mod linear;
pub mod trait_;

pub use linear::{Boundary, LinearInterpolator};
pub use trait_::Interpolator;
