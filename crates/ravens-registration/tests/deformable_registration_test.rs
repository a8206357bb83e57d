use burn::backend::Autodiff;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use ravens_core::filter::ResampleImageFilter;
use ravens_core::interpolation::LinearInterpolator;
use ravens_core::{ChainedTransform, Geometry, Image, LinearTransform};
use ravens_registration::metric::{LocalNormalizedCrossCorrelation, Metric};
use ravens_registration::{
    CancellationToken, DeformableConfig, DeformableStage, HistoryCallback, ProgressTracker, ResolutionPyramid, Stage,
};
use std::sync::Arc;

type B = Autodiff<NdArray<f32>>;

const D: usize = 24;

/// Soft sphere of the given radius centred in the grid.
fn make_sphere(radius: f32) -> Image<B> {
    let device = Default::default();
    let c = (D as f32 - 1.0) / 2.0;
    let mut data = Vec::with_capacity(D * D * D);
    for z in 0..D {
        for y in 0..D {
            for x in 0..D {
                let r = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2) + (z as f32 - c).powi(2)).sqrt();
                // logistic edge about one voxel wide
                data.push(1.0 / (1.0 + ((r - radius) * 2.0).exp()));
            }
        }
    }
    let tensor = Tensor::<B, 3>::from_data(TensorData::new(data, [D, D, D]), &device);
    Image::new(tensor, Geometry::identity()).unwrap()
}

#[test]
fn test_deformable_improves_similarity() {
    let fixed = make_sphere(6.0);
    let moving = make_sphere(8.0);
    let pyramid = ResolutionPyramid::new(&fixed, &moving, &[2, 1]).unwrap();
    let identity = LinearTransform::identity();

    let history = Arc::new(HistoryCallback::new());
    let mut progress = ProgressTracker::new();
    progress.add_callback(history.clone());

    let stage = DeformableStage::new(DeformableConfig::default(), vec![20, 20], 5);
    let output = stage
        .run(&pyramid, &identity, &CancellationToken::new(), &progress)
        .unwrap();

    assert_eq!(output.forward.shape(), fixed.shape());
    assert_eq!(output.inverse.shape(), fixed.shape());
    assert!(output.forward.is_finite() && output.inverse.is_finite());
    assert!(output.forward.max_norm() > 0.1);
    assert!(output.inverse.max_norm() > 0.1);
    // forward and inverse optimizations at both levels
    assert_eq!(history.stage_history(Stage::Deformable).len(), 80);

    let metric = LocalNormalizedCrossCorrelation::<B>::new(5);
    let before = metric.forward(&fixed, &moving, &identity).into_scalar();
    let warped = ResampleImageFilter::new_from_reference(
        &fixed,
        ChainedTransform::new(output.forward.clone(), identity),
        LinearInterpolator::new(),
    )
    .apply(&moving);
    let after = metric.forward(&fixed, &warped, &identity).into_scalar();
    println!("LNCC before {} after {}", before, after);
    assert!(after < before);

    // the larger moving sphere is pulled inwards: a fixed point right of the
    // centre samples further right in moving
    let probe = Tensor::<B, 2>::from_floats([[17.5, 11.5, 11.5]], &Default::default());
    let u: Vec<f32> = output.forward.sample(probe).into_data().iter::<f32>().collect();
    assert!(u[0] > 0.0, "displacement at probe {:?}", u);
}

#[test]
fn test_zero_budgets_give_zero_fields() {
    let fixed = make_sphere(6.0);
    let moving = make_sphere(8.0);
    let pyramid = ResolutionPyramid::new(&fixed, &moving, &[2, 1]).unwrap();

    let stage = DeformableStage::new(DeformableConfig::default(), vec![0, 0], 5);
    let output = stage
        .run(&pyramid, &LinearTransform::identity(), &CancellationToken::new(), &ProgressTracker::new())
        .unwrap();
    assert_eq!(output.forward.max_norm(), 0.0);
    assert_eq!(output.inverse.max_norm(), 0.0);
    assert_eq!(output.forward.geometry(), fixed.geometry());
}

#[test]
fn test_identical_images_stay_put() {
    let fixed = make_sphere(6.0);
    let pyramid = ResolutionPyramid::new(&fixed, &fixed, &[2, 1]).unwrap();

    let stage = DeformableStage::new(DeformableConfig::default(), vec![10, 10], 5);
    let output = stage
        .run(&pyramid, &LinearTransform::identity(), &CancellationToken::new(), &ProgressTracker::new())
        .unwrap();
    assert!(output.forward.max_norm() < 1e-2, "forward norm {}", output.forward.max_norm());
    assert!(output.inverse.max_norm() < 1e-2, "inverse norm {}", output.inverse.max_norm());
}
