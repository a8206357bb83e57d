//! Optimizers for the affine and deformable stages.
//!
//! [`AdamOptimizer`] trains burn modules such as the affine transform;
//! [`CompositiveDescent`] updates dense displacement fields directly.

pub mod adam;
pub mod compositive;
pub mod trait_;

pub use adam::AdamOptimizer;
pub use compositive::CompositiveDescent;
pub use trait_::Optimizer;
