//! Plain nalgebra aliases for physical-space quantities.
//!
//! All physical quantities are `f64` and expressed in the RAS+ millimetre
//! frame used by NIfTI. Index triples are ordered `(x, y, z)`.

use nalgebra::{Matrix3, Matrix4, Point3 as NaPoint3, Vector3 as NaVector3};

pub type Point3 = NaPoint3<f64>;
pub type Vector3 = NaVector3<f64>;
pub type Spacing3 = NaVector3<f64>;
pub type Direction3 = Matrix3<f64>;
pub type Affine4 = Matrix4<f64>;
