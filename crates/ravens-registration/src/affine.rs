//! Coarse-to-fine affine registration.

use burn::tensor::backend::AutodiffBackend;
use ravens_core::{AffineTransform, LinearTransform};

use crate::cancel::CancellationToken;
use crate::error::{RegistrationError, Result};
use crate::metric::LocalNormalizedCrossCorrelation;
use crate::optimizer::AdamOptimizer;
use crate::progress::{LevelContext, ProgressTracker, Stage};
use crate::pyramid::ResolutionPyramid;
use crate::registration::Registration;
use crate::validation::validate_linear;

/// Affine stage settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineConfig {
    pub learning_rate: f64,
    /// Iterations per pyramid level, coarsest first.
    pub iterations: Vec<usize>,
    /// LNCC window in voxels.
    pub window: usize,
}

/// Adam on a centred affine transform, minimizing negative mean LNCC.
///
/// The transform is parameterized about the centre of the full-resolution
/// fixed grid with translations scaled by the grid's half extent. The
/// estimate carries over between levels; each level gets a fresh optimizer.
pub struct AffineStage {
    config: AffineConfig,
}

impl AffineStage {
    pub fn new(config: AffineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AffineConfig {
        &self.config
    }

    pub fn run<B: AutodiffBackend>(
        &self,
        pyramid: &ResolutionPyramid<B>,
        seed: &LinearTransform,
        cancel: &CancellationToken,
        progress: &ProgressTracker,
    ) -> Result<LinearTransform> {
        if self.config.iterations.len() != pyramid.levels() {
            return Err(RegistrationError::invalid_configuration(format!(
                "{} affine budgets for {} pyramid levels",
                self.config.iterations.len(),
                pyramid.levels()
            )));
        }

        let geometry = pyramid.reference_geometry();
        let center = geometry.center(pyramid.reference_shape());
        let scale = geometry.max_half_extent(pyramid.reference_shape());
        let mut estimate = *seed;

        for (level, &iterations) in self.config.iterations.iter().enumerate() {
            cancel.check()?;
            let (fixed, moving) = pyramid
                .level(level)
                .ok_or_else(|| RegistrationError::input_geometry(format!("missing pyramid level {}", level)))?;
            let context = LevelContext::new(Stage::Affine, level, pyramid.levels(), pyramid.factor(level).unwrap_or(1));

            if iterations == 0 {
                tracing::info!("Skipping affine level {}/{} (no iterations)", level + 1, pyramid.levels());
                continue;
            }
            progress.level_start(&context, iterations);
            tracing::debug!("  Fixed size: {:?}, moving size: {:?}", fixed.shape(), moving.shape());

            let transform = AffineTransform::<B>::from_linear(&estimate, &center, scale, &fixed.device());
            let metric = LocalNormalizedCrossCorrelation::new(self.config.window);
            let mut registration = Registration::new(AdamOptimizer::new(self.config.learning_rate), metric);
            let transform = registration.execute(
                fixed,
                moving,
                transform,
                iterations,
                self.config.learning_rate,
                context,
                progress,
            )?;

            estimate = transform.to_linear();
            validate_linear(&estimate, Stage::Affine, level)?;
        }

        progress.stage_complete(Stage::Affine);
        Ok(estimate)
    }
}
