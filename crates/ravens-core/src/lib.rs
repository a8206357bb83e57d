//! Core primitives for ravens registration.
//!
//! Volumes are `[Z, Y, X]` burn tensors with a [`Geometry`] mapping voxel
//! indices `(x, y, z)` to physical RAS millimetres. Transforms map physical
//! points in resampling direction: from the output (fixed) grid into the
//! input (moving) volume.

pub mod filter;
pub mod image;
pub mod interpolation;
pub mod spatial;
pub mod transform;

pub use image::{Geometry, GeometryError, Image};
pub use spatial::{Affine4, Direction3, Point3, Spacing3, Vector3};
pub use transform::{
    AffineTransform, ChainedTransform, DeformationField, LinearTransform, Transform, TransformError,
};
