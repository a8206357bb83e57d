//! Parameter optimizers for trainable transforms.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;

/// Turns the gradients of a similarity loss into updated transform parameters.
///
/// Implemented for burn modules such as
/// [`AffineTransform`](ravens_core::AffineTransform). Dense fields are
/// updated by [`CompositiveDescent`](super::CompositiveDescent) instead,
/// which works on raw gradient tensors.
pub trait Optimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    /// Take one step and return the updated module.
    fn step(&mut self, module: M, gradients: GradientsParams) -> M;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}
