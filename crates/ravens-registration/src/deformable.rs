//! Dense deformable registration by compositive steepest descent.

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use ravens_core::filter::ResampleImageFilter;
use ravens_core::interpolation::LinearInterpolator;
use ravens_core::{DeformationField, Image, LinearTransform, Transform};

use crate::cancel::CancellationToken;
use crate::error::{RegistrationError, Result};
use crate::metric::{LocalNormalizedCrossCorrelation, Metric, NormalizationMode};
use crate::optimizer::CompositiveDescent;
use crate::profile::DeformableConfig;
use crate::progress::{LevelContext, ProgressTracker, Stage};
use crate::pyramid::ResolutionPyramid;
use crate::validation::validate_field;

/// Forward and inverse fields on the full-resolution fixed grid.
#[derive(Debug, Clone)]
pub struct DeformableOutput<B: Backend> {
    pub forward: DeformationField<B>,
    pub inverse: DeformationField<B>,
}

/// `x → L(x + u)` for the voxel centres of a grid, `u` given per voxel.
///
/// Only valid for the full grid point set in grid order, which is what the
/// metric passes in. Keeping `u` as plain rows lets gradients reach every
/// displacement directly.
struct DisplacedGrid<'a, B: Backend> {
    displacement: Tensor<B, 2>,
    linear: &'a LinearTransform,
}

impl<B: Backend> Transform<B> for DisplacedGrid<'_, B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        Transform::<B>::transform_points(self.linear, points + self.displacement.clone())
    }
}

/// Deformable stage seeded by a fixed linear transform.
///
/// The forward field `u` aligns `moving(L(x + u(x)))` to `fixed(x)`. The
/// inverse field `v` is estimated separately, aligning `fixed(z + v(z))` to
/// `moving(L(z))`, so a moving point `y` maps back to `z + v(z)` with
/// `z = L⁻¹(y)`.
pub struct DeformableStage {
    config: DeformableConfig,
    budgets: Vec<usize>,
    window: usize,
}

impl DeformableStage {
    /// `budgets` are per-level iteration counts, coarsest first, with any
    /// final-level cap already applied.
    pub fn new(config: DeformableConfig, budgets: Vec<usize>, window: usize) -> Self {
        Self { config, budgets, window }
    }

    pub fn budgets(&self) -> &[usize] {
        &self.budgets
    }

    pub fn run<B: AutodiffBackend>(
        &self,
        pyramid: &ResolutionPyramid<B>,
        linear: &LinearTransform,
        cancel: &CancellationToken,
        progress: &ProgressTracker,
    ) -> Result<DeformableOutput<B>> {
        if self.budgets.len() != pyramid.levels() {
            return Err(RegistrationError::invalid_configuration(format!(
                "{} deformable budgets for {} pyramid levels",
                self.budgets.len(),
                pyramid.levels()
            )));
        }

        let optimizer = CompositiveDescent::from_config(&self.config);
        let metric = LocalNormalizedCrossCorrelation::<B>::new(self.window).with_normalization(NormalizationMode::None);
        let identity = LinearTransform::identity();
        let mut fields: Option<(DeformationField<B>, DeformationField<B>)> = None;

        for (level, &iterations) in self.budgets.iter().enumerate() {
            cancel.check()?;
            let (fixed, moving) = pyramid
                .level(level)
                .ok_or_else(|| RegistrationError::input_geometry(format!("missing pyramid level {}", level)))?;
            let geometry = *fixed.geometry();
            let shape = fixed.shape();

            let (mut forward, mut inverse) = match fields.take() {
                Some((forward, inverse)) => (forward.resample_to(geometry, shape), inverse.resample_to(geometry, shape)),
                None => (
                    DeformationField::zeros(shape, geometry, &fixed.device()),
                    DeformationField::zeros(shape, geometry, &fixed.device()),
                ),
            };

            if iterations == 0 {
                tracing::info!("Skipping deformable level {}/{} (no iterations)", level + 1, pyramid.levels());
            } else {
                let context = LevelContext::new(Stage::Deformable, level, pyramid.levels(), pyramid.factor(level).unwrap_or(1));
                progress.level_start(&context, iterations);

                // moving brought onto the level grid by the linear part only
                let moving_linear =
                    ResampleImageFilter::new_from_reference(fixed, *linear, LinearInterpolator::new()).apply(moving);

                forward = self.optimize(&metric, &optimizer, fixed, moving, linear, forward, iterations, context, progress)?;
                inverse = self.optimize(&metric, &optimizer, &moving_linear, fixed, &identity, inverse, iterations, context, progress)?;
            }
            validate_field(&forward, Stage::Deformable, level)?;
            validate_field(&inverse, Stage::Deformable, level)?;
            fields = Some((forward, inverse));
        }

        let (forward, inverse) =
            fields.ok_or_else(|| RegistrationError::input_geometry("resolution pyramid has no levels"))?;
        let geometry = *pyramid.reference_geometry();
        let shape = pyramid.reference_shape();
        let output = if forward.shape() == shape && forward.geometry().approx_eq(&geometry, 1e-9) {
            DeformableOutput { forward, inverse }
        } else {
            DeformableOutput {
                forward: forward.resample_to(geometry, shape),
                inverse: inverse.resample_to(geometry, shape),
            }
        };

        log_diagnostics(&output);
        progress.stage_complete(Stage::Deformable);
        Ok(output)
    }

    /// Descend `iterations` steps on the field aligning
    /// `source(linear(x + u(x)))` to `reference(x)`.
    #[allow(clippy::too_many_arguments)]
    fn optimize<B: AutodiffBackend>(
        &self,
        metric: &LocalNormalizedCrossCorrelation<B>,
        optimizer: &CompositiveDescent,
        reference: &Image<B>,
        source: &Image<B>,
        linear: &LinearTransform,
        mut field: DeformationField<B>,
        iterations: usize,
        context: LevelContext,
        progress: &ProgressTracker,
    ) -> Result<DeformationField<B>> {
        for i in 0..iterations {
            let displacement = field.vectors().detach().require_grad();
            let transform = DisplacedGrid {
                displacement: displacement.clone(),
                linear,
            };

            let loss = metric.forward(reference, source, &transform);
            let value = loss.clone().into_scalar().elem::<f64>();
            if !value.is_finite() {
                return Err(RegistrationError::degenerate(
                    context.stage,
                    context.level,
                    format!("{} loss is {} at iteration {}", metric.name(), value, i + 1),
                ));
            }
            progress.update(context, i + 1, iterations, value, optimizer.learning_rate());

            let grads = loss.backward();
            let gradient = match displacement.grad(&grads) {
                Some(gradient) => Tensor::<B, 2>::from_inner(gradient),
                None => Tensor::zeros(displacement.dims(), &displacement.device()),
            };
            field = optimizer.step(&field, gradient);
        }
        Ok(field)
    }
}

fn log_diagnostics<B: Backend>(output: &DeformableOutput<B>) {
    for (name, field) in [("forward", &output.forward), ("inverse", &output.inverse)] {
        let min_jacobian = field
            .jacobian_determinant()
            .into_iter()
            .fold(f64::INFINITY, f64::min);
        if min_jacobian <= 0.0 {
            tracing::warn!("{} field folds: minimum Jacobian determinant {:.4}", name, min_jacobian);
        } else {
            tracing::info!(
                "{} field: max displacement {:.3} mm, minimum Jacobian determinant {:.4}",
                name,
                field.max_norm(),
                min_jacobian
            );
        }
    }
    tracing::info!(
        "Inverse consistency: mean round-trip error {:.4} mm",
        output.forward.inverse_consistency_error(&output.inverse)
    );
}
