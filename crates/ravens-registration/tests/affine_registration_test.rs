use burn::backend::Autodiff;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use ravens_core::filter::GaussianFilter;
use ravens_core::spatial::Point3;
use ravens_core::{AffineTransform, Geometry, Image, LinearTransform};
use ravens_registration::metric::LocalNormalizedCrossCorrelation;
use ravens_registration::optimizer::AdamOptimizer;
use ravens_registration::registration::Registration;
use ravens_registration::{
    AffineConfig, AffineStage, CancellationToken, LevelContext, ProgressTracker, RegistrationError,
    ResolutionPyramid, Stage,
};

type B = Autodiff<NdArray<f32>>;

const D: usize = 32;

/// Box of ones covering `[lo, lo + side)` on every axis, lightly blurred.
fn make_box(lo: [usize; 3], side: usize) -> Image<B> {
    let device = Default::default();
    let mut data = Vec::with_capacity(D * D * D);
    for z in 0..D {
        for y in 0..D {
            for x in 0..D {
                let inside = [x, y, z].iter().zip(lo.iter()).all(|(&i, &l)| i >= l && i < l + side);
                data.push(if inside { 1.0f32 } else { 0.0 });
            }
        }
    }
    let tensor = Tensor::<B, 3>::from_data(TensorData::new(data, [D, D, D]), &device);
    let image = Image::new(tensor, Geometry::identity()).unwrap();
    GaussianFilter::in_voxels(1.0).apply(&image)
}

#[test]
fn test_affine_stage_recovers_translation() {
    let fixed = make_box([10, 10, 10], 12);
    // Moving is shifted by (+2, +1, 0) voxels
    let moving = make_box([12, 11, 10], 12);
    let pyramid = ResolutionPyramid::new(&fixed, &moving, &[2, 1]).unwrap();

    let stage = AffineStage::new(AffineConfig {
        learning_rate: 1e-2,
        iterations: vec![60, 40],
        window: 5,
    });
    let result = stage
        .run(&pyramid, &LinearTransform::identity(), &CancellationToken::new(), &ProgressTracker::new())
        .unwrap();

    // The box centre of the fixed image samples the moving box centre
    let center = Point3::new(15.5, 15.5, 15.5);
    let shift = result.transform_point(&center) - center;
    println!("Estimated shift: {:?}", shift);
    assert!((shift.x - 2.0).abs() < 0.5, "Translation X error: {}", shift.x);
    assert!((shift.y - 1.0).abs() < 0.5, "Translation Y error: {}", shift.y);
    assert!(shift.z.abs() < 0.5, "Translation Z error: {}", shift.z);
}

#[test]
fn test_zero_budget_keeps_seed() {
    let fixed = make_box([10, 10, 10], 12);
    let moving = make_box([12, 11, 10], 12);
    let pyramid = ResolutionPyramid::new(&fixed, &moving, &[2, 1]).unwrap();
    let seed = LinearTransform::from_translation(ravens_core::Vector3::new(1.0, 0.0, 0.0));

    let stage = AffineStage::new(AffineConfig {
        learning_rate: 1e-2,
        iterations: vec![0, 0],
        window: 5,
    });
    let result = stage
        .run(&pyramid, &seed, &CancellationToken::new(), &ProgressTracker::new())
        .unwrap();
    assert_eq!(result, seed);
}

#[test]
fn test_cancelled_before_first_level() {
    let fixed = make_box([10, 10, 10], 12);
    let pyramid = ResolutionPyramid::new(&fixed, &fixed, &[2, 1]).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let stage = AffineStage::new(AffineConfig {
        learning_rate: 1e-2,
        iterations: vec![5, 5],
        window: 5,
    });
    let result = stage.run(&pyramid, &LinearTransform::identity(), &token, &ProgressTracker::new());
    assert!(matches!(result, Err(RegistrationError::Cancelled)));
}

#[test]
fn test_nan_loss_is_degenerate() {
    let device = Default::default();
    let fixed = make_box([10, 10, 10], 12);
    let broken = fixed.with_data(fixed.data().clone() * f32::NAN);

    let transform = AffineTransform::<B>::identity(&Point3::new(15.5, 15.5, 15.5), 16.0, &device);
    let mut registration = Registration::new(AdamOptimizer::new(1e-2), LocalNormalizedCrossCorrelation::new(5));
    let result = registration.execute(
        &fixed,
        &broken,
        transform,
        3,
        1e-2,
        LevelContext::new(Stage::Affine, 1, 2, 1),
        &ProgressTracker::new(),
    );

    match result {
        Err(RegistrationError::ConvergenceDegenerate { stage, level, .. }) => {
            assert_eq!(stage, Stage::Affine);
            assert_eq!(level, 1);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("NaN loss was accepted"),
    }
}
