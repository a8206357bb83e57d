//! Transform types and operations.

pub mod affine;
pub mod chained;
pub mod displacement_field;
pub mod linear;
pub mod trait_;

pub use affine::AffineTransform;
pub use chained::ChainedTransform;
pub use displacement_field::DeformationField;
pub use linear::{LinearTransform, TransformError};
pub use trait_::Transform;
