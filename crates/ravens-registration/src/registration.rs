use std::marker::PhantomData;

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use ravens_core::{Image, Transform};

use crate::error::{RegistrationError, Result};
use crate::metric::Metric;
use crate::optimizer::Optimizer;
use crate::progress::{LevelContext, ProgressTracker};

/// Gradient-based optimization of a trainable transform on one image pair.
pub struct Registration<B, O, M, T>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B>,
    T: Transform<B> + AutodiffModule<B>,
{
    optimizer: O,
    metric: M,
    _phantom: PhantomData<(B, T)>,
}

impl<B, O, M, T> Registration<B, O, M, T>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B>,
    T: Transform<B> + AutodiffModule<B>,
{
    pub fn new(optimizer: O, metric: M) -> Self {
        Self {
            optimizer,
            metric,
            _phantom: PhantomData,
        }
    }

    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// Run exactly `iterations` optimizer steps.
    ///
    /// A non-finite loss aborts with `ConvergenceDegenerate` for the stage
    /// and level in `context`.
    pub fn execute(
        &mut self,
        fixed: &Image<B>,
        moving: &Image<B>,
        mut transform: T,
        iterations: usize,
        learning_rate: f64,
        context: LevelContext,
        progress: &ProgressTracker,
    ) -> Result<T> {
        self.optimizer.set_learning_rate(learning_rate);

        for i in 0..iterations {
            // Forward pass
            let loss = self.metric.forward(fixed, moving, &transform);
            let value = loss.clone().into_scalar().elem::<f64>();
            if !value.is_finite() {
                return Err(RegistrationError::degenerate(
                    context.stage,
                    context.level,
                    format!("{} loss is {} at iteration {}", self.metric.name(), value, i + 1),
                ));
            }
            progress.update(context, i + 1, iterations, value, learning_rate);

            // Backward pass
            let grads = loss.backward();
            let grads_params = GradientsParams::from_grads(grads, &transform);

            // Optimizer step
            transform = self.optimizer.step(transform, grads_params);
        }
        Ok(transform)
    }
}
