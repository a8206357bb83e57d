//! Closed-form rigid initialization from intensity moments.

use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use nalgebra::SymmetricEigen;
use rayon::prelude::*;
use ravens_core::spatial::{Direction3, Point3, Vector3};
use ravens_core::{Image, LinearTransform};

use crate::error::{RegistrationError, Result};
use crate::metric::{LocalNormalizedCrossCorrelation, Metric};
use crate::profile::{MomentsConfig, OrientationMode};
use crate::progress::Stage;
use crate::pyramid::ResolutionPyramid;

/// Relative eigenvalue gap below which principal axes are not identifiable.
const DEGENERATE_GAP: f64 = 1e-3;

/// Intensity-weighted zeroth, first and second moments of a volume.
#[derive(Debug, Clone, Copy)]
pub struct ImageMoments {
    pub mass: f64,
    /// Physical centre of mass.
    pub centroid: Point3,
    /// Intensity-weighted covariance of physical positions (mm²).
    pub covariance: Direction3,
}

#[derive(Clone, Copy)]
struct Accumulator {
    mass: f64,
    first: Vector3,
    second: Direction3,
}

impl Accumulator {
    fn zero() -> Self {
        Self {
            mass: 0.0,
            first: Vector3::zeros(),
            second: Direction3::zeros(),
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            mass: self.mass + other.mass,
            first: self.first + other.first,
            second: self.second + other.second,
        }
    }
}

impl ImageMoments {
    /// Accumulate moments over all voxels, one z-slice per rayon task.
    ///
    /// Negative intensities are treated as zero mass.
    pub fn compute<B: Backend>(image: &Image<B>) -> Option<Self> {
        let [_, ny, nx] = image.shape();
        let geometry = *image.geometry();
        let values = image.to_vec();

        let total = values
            .par_chunks(ny * nx)
            .enumerate()
            .map(|(z, slice)| {
                let mut acc = Accumulator::zero();
                for (i, &value) in slice.iter().enumerate() {
                    let weight = f64::from(value.max(0.0));
                    if weight == 0.0 {
                        continue;
                    }
                    let index = Point3::new((i % nx) as f64, (i / nx) as f64, z as f64);
                    let p = geometry.index_to_physical(&index).coords;
                    acc.mass += weight;
                    acc.first += p * weight;
                    acc.second += p * p.transpose() * weight;
                }
                acc
            })
            .reduce(Accumulator::zero, Accumulator::merge);

        if !(total.mass.is_finite() && total.mass > 0.0) {
            return None;
        }
        let centroid = total.first / total.mass;
        let covariance = total.second / total.mass - centroid * centroid.transpose();
        if !centroid.iter().chain(covariance.iter()).all(|v| v.is_finite()) {
            return None;
        }
        Some(Self {
            mass: total.mass,
            centroid: Point3::from(centroid),
            covariance,
        })
    }

    /// Eigenvectors of the covariance as columns, largest eigenvalue first,
    /// or `None` when two eigenvalues are too close to order the axes.
    pub fn principal_axes(&self) -> Option<Direction3> {
        let eigen = SymmetricEigen::new(self.covariance);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let values = order.map(|i| eigen.eigenvalues[i]);

        let scale = values[0];
        if !(scale > 0.0) {
            return None;
        }
        if (values[0] - values[1]) / scale < DEGENERATE_GAP || (values[1] - values[2]) / scale < DEGENERATE_GAP {
            return None;
        }

        let mut axes = Direction3::zeros();
        for (column, &i) in order.iter().enumerate() {
            axes.set_column(column, &eigen.eigenvectors.column(i));
        }
        Some(axes)
    }
}

/// Rigid seed that matches centroids and, at order 2, principal axes.
///
/// The returned transform maps fixed points to moving points:
/// `T(x) = R (x - c_fixed) + c_moving`.
#[derive(Debug, Clone)]
pub struct MomentsInitializer {
    config: MomentsConfig,
    window: usize,
}

impl MomentsInitializer {
    /// `window` is the LNCC window used to rank axis sign candidates.
    pub fn new(config: MomentsConfig, window: usize) -> Self {
        Self { config, window }
    }

    pub fn config(&self) -> &MomentsConfig {
        &self.config
    }

    /// Estimate from the coarsest level of `pyramid`.
    pub fn run<B: Backend>(&self, pyramid: &ResolutionPyramid<B>) -> Result<LinearTransform> {
        let (fixed, moving) = pyramid
            .level(0)
            .ok_or_else(|| RegistrationError::input_geometry("resolution pyramid has no levels"))?;
        self.estimate(fixed, moving)
    }

    pub fn estimate<B: Backend>(&self, fixed: &Image<B>, moving: &Image<B>) -> Result<LinearTransform> {
        let fixed_moments = ImageMoments::compute(fixed)
            .ok_or_else(|| RegistrationError::degenerate(Stage::Moments, 0, "fixed volume has no mass"))?;
        let moving_moments = ImageMoments::compute(moving)
            .ok_or_else(|| RegistrationError::degenerate(Stage::Moments, 0, "moving volume has no mass"))?;
        tracing::debug!(
            "Centroids: fixed {:?}, moving {:?}",
            fixed_moments.centroid,
            moving_moments.centroid
        );

        let translation_only = LinearTransform::centered(
            Direction3::identity(),
            &fixed_moments.centroid,
            moving_moments.centroid - fixed_moments.centroid,
        );
        if self.config.order < 2 {
            return Ok(translation_only);
        }

        let (fixed_axes, moving_axes) = match (fixed_moments.principal_axes(), moving_moments.principal_axes()) {
            (Some(f), Some(m)) => (f, m),
            _ => {
                tracing::info!("Principal axes are degenerate, using centroid alignment only");
                return Ok(translation_only);
            }
        };

        let metric = LocalNormalizedCrossCorrelation::<B>::new(self.window);
        let mut best: Option<(f64, LinearTransform)> = None;
        for signs in self.sign_candidates(&fixed_axes, &moving_axes) {
            let rotation = moving_axes * Direction3::from_diagonal(&signs) * fixed_axes.transpose();
            let candidate = LinearTransform::from_parts(
                rotation,
                moving_moments.centroid.coords - rotation * fixed_moments.centroid.coords,
            );
            let loss = metric.forward(fixed, moving, &candidate).into_scalar().elem::<f64>();
            tracing::debug!("Axis signs {:?}: loss {:.6}", signs.as_slice(), loss);
            if loss.is_finite() && best.as_ref().map_or(true, |(b, _)| loss < *b) {
                best = Some((loss, candidate));
            }
        }

        best.map(|(_, transform)| transform)
            .ok_or_else(|| RegistrationError::degenerate(Stage::Moments, 0, "no axis candidate had a finite score"))
    }

    /// Axis sign patterns allowed by the orientation mode.
    fn sign_candidates(&self, fixed_axes: &Direction3, moving_axes: &Direction3) -> Vec<Vector3> {
        let handedness = (fixed_axes.determinant() * moving_axes.determinant()).signum();
        (0..8u8)
            .map(|bits| {
                Vector3::new(
                    if bits & 1 == 0 { 1.0 } else { -1.0 },
                    if bits & 2 == 0 { 1.0 } else { -1.0 },
                    if bits & 4 == 0 { 1.0 } else { -1.0 },
                )
            })
            .filter(|signs| match self.config.orientation {
                OrientationMode::Rotation => signs.product() * handedness > 0.0,
                OrientationMode::RotationAndReflection => true,
            })
            .collect()
    }
}
