use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer as BurnOptimizer};
use burn::tensor::backend::AutodiffBackend;

use crate::optimizer::Optimizer;

/// Adam over the parameters of a trainable transform.
///
/// Moment estimates belong to one optimizer instance; the affine stage builds
/// a new one per pyramid level so a level starts from the previous level's
/// parameters but not from its momentum.
pub struct AdamOptimizer<M: AutodiffModule<B>, B: AutodiffBackend> {
    inner: OptimizerAdaptor<Adam, M, B>,
    learning_rate: f64,
}

impl<M: AutodiffModule<B>, B: AutodiffBackend> AdamOptimizer<M, B> {
    /// burn's default betas (0.9, 0.999) and epsilon.
    pub fn new(learning_rate: f64) -> Self {
        Self {
            inner: AdamConfig::new().init(),
            learning_rate,
        }
    }
}

impl<M, B> Optimizer<M, B> for AdamOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn step(&mut self, module: M, gradients: GradientsParams) -> M {
        self.inner.step(self.learning_rate, module, gradients)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
