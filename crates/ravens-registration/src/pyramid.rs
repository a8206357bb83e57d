//! Paired coarse-to-fine views of the fixed and moving volumes.

use burn::tensor::backend::Backend;
use ravens_core::filter::MultiResolutionPyramid;
use ravens_core::{Geometry, Image};

use crate::error::{RegistrationError, Result};

/// Smallest extent, in voxels, of any axis at any level.
pub const MIN_LEVEL_EXTENT: usize = 2;

/// One pyramid per registration: the fixed and moving volumes reduced by the
/// same schedule of shrink factors, coarsest level first.
///
/// The schedule and the level extents are validated before anything is
/// filtered, so a bad schedule fails before any optimization runs.
pub struct ResolutionPyramid<B: Backend> {
    factors: Vec<usize>,
    fixed: MultiResolutionPyramid<B>,
    moving: MultiResolutionPyramid<B>,
    reference_geometry: Geometry,
    reference_shape: [usize; 3],
}

impl<B: Backend> ResolutionPyramid<B> {
    pub fn new(fixed: &Image<B>, moving: &Image<B>, scales: &[usize]) -> Result<Self> {
        validate_schedule(scales)?;
        for factor in scales {
            check_extent("fixed", fixed.shape(), *factor)?;
            check_extent("moving", moving.shape(), *factor)?;
        }

        tracing::debug!("Building resolution pyramid with shrink factors {:?}", scales);
        Ok(Self {
            factors: scales.to_vec(),
            fixed: MultiResolutionPyramid::new(fixed, scales),
            moving: MultiResolutionPyramid::new(moving, scales),
            reference_geometry: *fixed.geometry(),
            reference_shape: fixed.shape(),
        })
    }

    pub fn levels(&self) -> usize {
        self.factors.len()
    }

    pub fn factors(&self) -> &[usize] {
        &self.factors
    }

    pub fn factor(&self, level: usize) -> Option<usize> {
        self.factors.get(level).copied()
    }

    pub fn fixed(&self, level: usize) -> Option<&Image<B>> {
        self.fixed.get_level(level)
    }

    pub fn moving(&self, level: usize) -> Option<&Image<B>> {
        self.moving.get_level(level)
    }

    /// `(fixed, moving)` views of one level.
    pub fn level(&self, level: usize) -> Option<(&Image<B>, &Image<B>)> {
        Some((self.fixed(level)?, self.moving(level)?))
    }

    /// Geometry of the full-resolution fixed grid.
    pub fn reference_geometry(&self) -> &Geometry {
        &self.reference_geometry
    }

    /// Shape `[nz, ny, nx]` of the full-resolution fixed grid.
    pub fn reference_shape(&self) -> [usize; 3] {
        self.reference_shape
    }
}

fn validate_schedule(scales: &[usize]) -> Result<()> {
    if scales.is_empty() {
        return Err(RegistrationError::input_geometry("resolution schedule is empty"));
    }
    if scales.contains(&0) {
        return Err(RegistrationError::input_geometry(format!(
            "shrink factors must be positive, got {:?}",
            scales
        )));
    }
    if scales.windows(2).any(|pair| pair[1] > pair[0]) {
        return Err(RegistrationError::input_geometry(format!(
            "shrink factors must be ordered coarse to fine, got {:?}",
            scales
        )));
    }
    Ok(())
}

fn check_extent(name: &str, shape: [usize; 3], factor: usize) -> Result<()> {
    let level_shape = shape.map(|n| n.div_ceil(factor));
    if level_shape.iter().any(|&n| n < MIN_LEVEL_EXTENT) {
        return Err(RegistrationError::input_geometry(format!(
            "{} volume {:?} is too small for shrink factor {} (level shape {:?})",
            name, shape, factor, level_shape
        )));
    }
    Ok(())
}
