//! File formats for ravens registration.
//!
//! * [`nifti_io`]: scalar volumes and ANTs-style displacement fields
//! * [`ants`]: MATLAB v4 `.mat` affine transforms in ITK's LPS convention
//! * [`export`]: [`TransformExporter`], which publishes a run's artifacts
//!   all at once

pub mod ants;
pub mod export;
pub mod nifti_io;

pub use ants::{read_ants_affine, write_ants_affine};
pub use export::{ArtifactPaths, TransformExporter};
pub use nifti_io::{read_displacement_field, read_nifti, write_displacement_field, write_nifti};
