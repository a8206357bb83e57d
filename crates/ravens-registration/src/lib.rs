//! Multi-stage registration of a moving volume to a fixed volume.
//!
//! Stages run coarse to fine over a shared [`ResolutionPyramid`]:
//!
//! 1. [`MomentsInitializer`]: optional rigid seed from intensity moments.
//! 2. [`AffineStage`]: Adam on a centred affine transform.
//! 3. [`DeformableStage`]: forward and inverse dense displacement fields.
//!
//! [`RegistrationOrchestrator`] threads the stages together and hands the
//! [`RegistrationResult`] to an [`ArtifactSink`].

pub mod affine;
pub mod cancel;
pub mod deformable;
pub mod error;
pub mod metric;
pub mod moments;
pub mod optimizer;
pub mod orchestrator;
pub mod profile;
pub mod progress;
pub mod pyramid;
pub mod registration;
pub mod validation;

pub use affine::{AffineConfig, AffineStage};
pub use cancel::CancellationToken;
pub use deformable::{DeformableOutput, DeformableStage};
pub use error::{RegistrationError, Result};
pub use moments::{ImageMoments, MomentsInitializer};
pub use orchestrator::{
    ArtifactSink, MomentsArtifacts, RegistrationOrchestrator, RegistrationParts, RegistrationResult,
    RegistrationState,
};
pub use profile::{DeformableConfig, MomentsConfig, OrientationMode, Profile, ProfileConfig};
pub use progress::{
    ConsoleProgressCallback, HistoryCallback, LevelContext, ProgressCallback, ProgressInfo, ProgressTracker, Stage,
};
pub use pyramid::ResolutionPyramid;
