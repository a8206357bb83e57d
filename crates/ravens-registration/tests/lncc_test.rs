#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, Shape, Tensor};
    use burn_ndarray::NdArray;
    use ravens_core::spatial::Vector3;
    use ravens_core::{Geometry, Image, LinearTransform};
    use ravens_registration::metric::{LocalNormalizedCrossCorrelation, Metric, NormalizationMode};

    type B = NdArray<f32>;

    fn create_test_image(shape: [usize; 3]) -> Image<B> {
        let device = Default::default();
        let data = Tensor::<B, 3>::random(Shape::new(shape), Distribution::Uniform(0.0, 1.0), &device);
        Image::new(data, Geometry::identity()).unwrap()
    }

    #[test]
    fn test_lncc_perfect_match() {
        let fixed = create_test_image([10, 10, 10]);
        let moving = fixed.clone();

        let metric = LocalNormalizedCrossCorrelation::<B>::new(5);
        let value = metric.forward(&fixed, &moving, &LinearTransform::identity()).into_scalar();

        // squared local correlation of a volume with itself is 1
        assert!((value + 1.0).abs() < 1e-3, "perfect match score {}", value);
    }

    #[test]
    fn test_lncc_offset() {
        let fixed = create_test_image([10, 10, 10]);
        let moving = fixed.clone();

        let transform = LinearTransform::from_translation(Vector3::new(0.5, 0.0, 0.0));
        let metric = LocalNormalizedCrossCorrelation::<B>::new(5);
        let value = metric.forward(&fixed, &moving, &transform).into_scalar();

        assert!(value > -1.0);
    }

    #[test]
    fn test_sum_normalization_scales_with_voxels() {
        let fixed = create_test_image([6, 7, 8]);
        let moving = create_test_image([6, 7, 8]);
        let identity = LinearTransform::identity();

        let mean = LocalNormalizedCrossCorrelation::<B>::new(3)
            .forward(&fixed, &moving, &identity)
            .into_scalar();
        let sum = LocalNormalizedCrossCorrelation::<B>::new(3)
            .with_normalization(NormalizationMode::None)
            .forward(&fixed, &moving, &identity)
            .into_scalar();

        let n = (6 * 7 * 8) as f32;
        assert!((sum - mean * n).abs() < 1e-3 * n.abs(), "sum {} vs mean {}", sum, mean);
    }

    #[test]
    fn test_intensity_scale_invariance() {
        let fixed = create_test_image([8, 8, 8]);
        let brighter = fixed.with_data(fixed.data().clone() * 3.0 + 0.5);

        let metric = LocalNormalizedCrossCorrelation::<B>::new(5);
        let value = metric.forward(&fixed, &brighter, &LinearTransform::identity()).into_scalar();
        assert!((value + 1.0).abs() < 1e-3);
    }
}
