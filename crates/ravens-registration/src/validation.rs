//! Validation utilities for registration operations.
//!
//! Checks applied to inputs before optimization starts and to intermediate
//! results between stages.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use ravens_core::{DeformationField, Image, LinearTransform};

use crate::error::{RegistrationError, Result};
use crate::progress::Stage;

/// Reject volumes containing NaN or infinite intensities.
pub fn validate_volume<B: Backend>(name: &str, image: &Image<B>) -> Result<()> {
    if !tensor_is_finite(image.data()) {
        return Err(RegistrationError::input_geometry(format!(
            "{} volume contains NaN or infinite intensities",
            name
        )));
    }
    Ok(())
}

/// True when every element of `tensor` is finite.
pub fn tensor_is_finite<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> bool {
    // NaN propagates through the sum, Inf survives it
    tensor.clone().sum().into_scalar().elem::<f64>().is_finite()
}

/// Validate learning rate.
pub fn validate_learning_rate(lr: f64) -> Result<()> {
    if !lr.is_finite() || lr <= 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate must be positive, got {}",
            lr
        )));
    }

    if lr > 10.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate too large: {}",
            lr
        )));
    }

    Ok(())
}

/// Validate a Gaussian width given in voxels.
pub fn validate_sigma(name: &str, sigma: f64) -> Result<()> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} must be finite and non-negative, got {}",
            name, sigma
        )));
    }
    Ok(())
}

/// Check a stage's linear output is finite and invertible.
pub fn validate_linear(transform: &LinearTransform, stage: Stage, level: usize) -> Result<()> {
    transform
        .validate()
        .map_err(|err| RegistrationError::degenerate(stage, level, err.to_string()))
}

/// Check a displacement field holds only finite values.
pub fn validate_field<B: Backend>(field: &DeformationField<B>, stage: Stage, level: usize) -> Result<()> {
    if !tensor_is_finite(field.displacement()) {
        return Err(RegistrationError::degenerate(
            stage,
            level,
            "displacement field contains NaN or infinite values",
        ));
    }
    Ok(())
}

/// Check a field lives on the grid of `reference`.
pub fn validate_field_grid<B: Backend>(field: &DeformationField<B>, reference: &Image<B>) -> Result<()> {
    if field.shape() != reference.shape() {
        return Err(RegistrationError::ShapeMismatch {
            expected: reference.shape().to_vec(),
            actual: field.shape().to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use ravens_core::spatial::{Direction3, Vector3};
    use ravens_core::Geometry;

    type Backend = NdArray<f32>;

    #[test]
    fn test_validate_learning_rate() {
        assert!(validate_learning_rate(0.01).is_ok());
        assert!(validate_learning_rate(0.0).is_err());
        assert!(validate_learning_rate(-0.01).is_err());
        assert!(validate_learning_rate(100.0).is_err());
        assert!(validate_learning_rate(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_volume_rejects_nan() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::from_floats([[[0.0, f32::NAN], [1.0, 2.0]]], &device);
        let image = Image::new(data, Geometry::identity()).unwrap();
        assert!(matches!(
            validate_volume("moving", &image),
            Err(RegistrationError::InputGeometry(_))
        ));
    }

    #[test]
    fn test_validate_linear_names_stage() {
        let singular = LinearTransform::from_parts(Direction3::zeros(), Vector3::zeros());
        match validate_linear(&singular, Stage::Affine, 1) {
            Err(RegistrationError::ConvergenceDegenerate { stage, level, .. }) => {
                assert_eq!(stage, Stage::Affine);
                assert_eq!(level, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_field_grid() {
        let device = Default::default();
        let image = Image::new(Tensor::<Backend, 3>::zeros([4, 4, 4], &device), Geometry::identity()).unwrap();
        let field = DeformationField::<Backend>::zeros([4, 4, 5], Geometry::identity(), &device);
        assert!(matches!(
            validate_field_grid(&field, &image),
            Err(RegistrationError::ShapeMismatch { .. })
        ));
        assert!(validate_field(&field, Stage::Deformable, 0).is_ok());
    }
}
