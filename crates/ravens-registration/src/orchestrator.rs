//! Multi-stage registration driver.
//!
//! [`RegistrationOrchestrator`] runs moments → affine → deformable over one
//! resolution pyramid, resamples the moving volume through the result and
//! optionally hands everything to an [`ArtifactSink`]. Progress through the
//! run is recorded as a sequence of [`RegistrationState`]s.

use std::fmt;
use std::path::PathBuf;

use burn::tensor::backend::{AutodiffBackend, Backend};
use ravens_core::filter::{ResampleImageFilter, RescaleIntensityFilter};
use ravens_core::interpolation::LinearInterpolator;
use ravens_core::{ChainedTransform, DeformationField, Image, LinearTransform};

use crate::affine::{AffineConfig, AffineStage};
use crate::cancel::CancellationToken;
use crate::deformable::DeformableStage;
use crate::error::{RegistrationError, Result};
use crate::moments::MomentsInitializer;
use crate::profile::{Profile, ProfileConfig};
use crate::progress::{ProgressTracker, Stage};
use crate::pyramid::ResolutionPyramid;
use crate::validation::{validate_field_grid, validate_linear, validate_volume};

/// Lifecycle of one registration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Inputs validated.
    Init,
    MomentsDone,
    AffineDone,
    DeformableDone,
    Exported,
    Complete,
    /// Terminal state after any error, including cancellation.
    Failed,
}

/// Rigid seed produced when the moments stage runs.
#[derive(Debug, Clone)]
pub struct MomentsArtifacts<B: Backend> {
    pub transform: LinearTransform,
    /// Moving volume resampled on the fixed grid under `transform`.
    pub warped: Image<B>,
}

/// Owned pieces of a [`RegistrationResult`].
#[derive(Debug, Clone)]
pub struct RegistrationParts<B: Backend> {
    pub linear: LinearTransform,
    pub forward: DeformationField<B>,
    pub inverse: DeformationField<B>,
    pub warped: Image<B>,
    pub moments: Option<MomentsArtifacts<B>>,
}

/// Everything a successful run produced. Immutable once returned.
#[derive(Debug, Clone)]
pub struct RegistrationResult<B: Backend> {
    linear: LinearTransform,
    forward: DeformationField<B>,
    inverse: DeformationField<B>,
    warped: Image<B>,
    moments: Option<MomentsArtifacts<B>>,
}

impl<B: Backend> RegistrationResult<B> {
    /// Final moving→fixed linear transform (resampling direction).
    pub fn linear_transform(&self) -> &LinearTransform {
        &self.linear
    }

    /// Forward field `u`: a fixed point `x` samples moving at `L(x + u(x))`.
    pub fn forward_field(&self) -> &DeformationField<B> {
        &self.forward
    }

    /// Inverse field `v`: a moving point `y` maps to `z + v(z)`, `z = L⁻¹(y)`.
    pub fn inverse_field(&self) -> &DeformationField<B> {
        &self.inverse
    }

    /// Moving volume warped onto the fixed grid, original intensities.
    pub fn warped(&self) -> &Image<B> {
        &self.warped
    }

    pub fn moments(&self) -> Option<&MomentsArtifacts<B>> {
        self.moments.as_ref()
    }

    pub fn moments_transform(&self) -> Option<&LinearTransform> {
        self.moments.as_ref().map(|m| &m.transform)
    }

    pub fn moments_warped(&self) -> Option<&Image<B>> {
        self.moments.as_ref().map(|m| &m.warped)
    }

    pub fn into_parts(self) -> RegistrationParts<B> {
        RegistrationParts {
            linear: self.linear,
            forward: self.forward,
            inverse: self.inverse,
            warped: self.warped,
            moments: self.moments,
        }
    }
}

/// Destination for the artifacts of a finished run.
///
/// Implementations must publish all artifacts or none of them.
pub trait ArtifactSink<B: Backend> {
    type Error: fmt::Display;

    /// Persist `result`, returning the published paths.
    fn publish(&mut self, result: &RegistrationResult<B>) -> std::result::Result<Vec<PathBuf>, Self::Error>;
}

/// Drives one registration at a time through its stages.
///
/// The orchestrator holds no image data between runs; separate instances
/// can run on separate threads.
pub struct RegistrationOrchestrator {
    config: ProfileConfig,
    do_moments: bool,
    cancel: CancellationToken,
    progress: ProgressTracker,
    states: Vec<RegistrationState>,
}

impl RegistrationOrchestrator {
    pub fn new(config: ProfileConfig) -> Self {
        Self {
            config,
            do_moments: true,
            cancel: CancellationToken::new(),
            progress: ProgressTracker::console(),
            states: Vec::new(),
        }
    }

    pub fn from_profile(profile: Profile) -> Self {
        Self::new(profile.config())
    }

    /// Enable or disable the moments stage (enabled by default).
    pub fn with_moments(mut self, enabled: bool) -> Self {
        self.do_moments = enabled;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// States visited by the most recent run, in order.
    pub fn states(&self) -> &[RegistrationState] {
        &self.states
    }

    pub fn state(&self) -> Option<RegistrationState> {
        self.states.last().copied()
    }

    /// Register `moving` to `fixed` without writing anything.
    pub fn run<B: AutodiffBackend>(&mut self, fixed: &Image<B>, moving: &Image<B>) -> Result<RegistrationResult<B>> {
        self.states.clear();
        let outcome = self.register(fixed, moving);
        let outcome = outcome.map(|result| {
            self.enter(RegistrationState::Complete);
            result
        });
        self.settle(outcome)
    }

    /// Register and publish the artifacts through `sink`.
    pub fn run_and_export<B, S>(
        &mut self,
        fixed: &Image<B>,
        moving: &Image<B>,
        sink: &mut S,
    ) -> Result<RegistrationResult<B>>
    where
        B: AutodiffBackend,
        S: ArtifactSink<B>,
    {
        self.states.clear();
        let outcome = self.register(fixed, moving).and_then(|result| {
            self.cancel.check()?;
            let paths = sink
                .publish(&result)
                .map_err(|err| RegistrationError::io(format!("{:#}", err)))?;
            tracing::info!("Published {} artifacts", paths.len());
            self.progress.stage_complete(Stage::Export);
            self.enter(RegistrationState::Exported);
            self.enter(RegistrationState::Complete);
            Ok(result)
        });
        self.settle(outcome)
    }

    fn enter(&mut self, state: RegistrationState) {
        tracing::debug!("Registration state: {:?}", state);
        self.states.push(state);
    }

    fn settle<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if let Err(err) = &outcome {
            self.progress.error(&err.to_string());
            self.enter(RegistrationState::Failed);
        }
        outcome
    }

    fn register<B: AutodiffBackend>(&mut self, fixed: &Image<B>, moving: &Image<B>) -> Result<RegistrationResult<B>> {
        self.config.validate()?;
        validate_volume("fixed", fixed)?;
        validate_volume("moving", moving)?;

        // Optimization sees [0, 1] intensities; outputs use the originals.
        let rescale = RescaleIntensityFilter::unit();
        let pyramid = ResolutionPyramid::new(&rescale.apply(fixed), &rescale.apply(moving), &self.config.scales)?;
        self.enter(RegistrationState::Init);
        self.progress.start();
        tracing::info!(
            "Registering with profile '{}' ({} levels, moments {})",
            self.config.name,
            pyramid.levels(),
            if self.do_moments { "on" } else { "off" }
        );

        let mut moments = None;
        let seed = if self.do_moments {
            self.cancel.check()?;
            let transform = MomentsInitializer::new(self.config.moments.clone(), self.config.lncc_window).run(&pyramid)?;
            validate_linear(&transform, Stage::Moments, 0)?;
            self.progress.stage_complete(Stage::Moments);
            moments = Some(MomentsArtifacts {
                transform,
                warped: resample(fixed, moving, transform),
            });
            self.enter(RegistrationState::MomentsDone);
            transform
        } else {
            LinearTransform::identity()
        };

        self.cancel.check()?;
        let affine = AffineStage::new(AffineConfig {
            learning_rate: self.config.affine_learning_rate,
            iterations: self.config.affine_budgets(),
            window: self.config.lncc_window,
        })
        .run(&pyramid, &seed, &self.cancel, &self.progress)?;
        self.enter(RegistrationState::AffineDone);

        self.cancel.check()?;
        let fields = DeformableStage::new(
            self.config.deformable.clone(),
            self.config.deformable_budgets(),
            self.config.lncc_window,
        )
        .run(&pyramid, &affine, &self.cancel, &self.progress)?;
        validate_field_grid(&fields.forward, fixed)?;
        validate_field_grid(&fields.inverse, fixed)?;

        let warped = resample(fixed, moving, ChainedTransform::new(fields.forward.clone(), affine));
        self.enter(RegistrationState::DeformableDone);

        Ok(RegistrationResult {
            linear: affine,
            forward: fields.forward,
            inverse: fields.inverse,
            warped,
            moments,
        })
    }
}

fn resample<B, T>(fixed: &Image<B>, moving: &Image<B>, transform: T) -> Image<B>
where
    B: Backend,
    T: ravens_core::Transform<B>,
{
    ResampleImageFilter::new_from_reference(fixed, transform, LinearInterpolator::new()).apply(moving)
}
