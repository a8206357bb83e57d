//! NIfTI-1 volumes and displacement fields.
//!
//! Voxel data is `[X, Y, Z]` on disk and `[Z, Y, X]` in memory. The sform
//! (falling back to the qform, then pixdim) gives the RAS geometry.
//! Displacement fields follow the ANTs layout: `(X, Y, Z, 1, 3)` vectors in
//! LPS millimetres with intent code 1007.

use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::{Rotation3, UnitQuaternion};
use ndarray::{Array, ArrayD, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use ravens_core::{Affine4, DeformationField, Direction3, Geometry, Image};

/// `NIFTI_INTENT_VECTOR`.
pub const INTENT_VECTOR: i16 = 1007;

/// `NIFTI_XFORM_SCANNER_ANAT`.
const XFORM_SCANNER_ANAT: i16 = 1;

/// `NIFTI_UNITS_MM`.
const UNITS_MM: u8 = 2;

/// Read a 3D scalar volume.
///
/// Trailing singleton dimensions (e.g. a single time point) are accepted.
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let geometry = header_geometry(obj.header()).with_context(|| format!("Invalid geometry in {}", path.display()))?;

    let volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    let dims = volume.shape().to_vec();
    if dims.len() < 3 || dims[3..].iter().any(|&n| n != 1) {
        bail!("Expected a 3D NIfTI volume in {}, found dimensions {:?}", path.display(), dims);
    }
    let [nx, ny, nz] = [dims[0], dims[1], dims[2]];

    // Logical [X, Y, Z] -> row-major [Z, Y, X], independent of memory layout.
    let volume = volume
        .into_shape(IxDyn(&[nx, ny, nz]))
        .context("Failed to drop singleton dimensions")?;
    let values: Vec<f32> = volume.reversed_axes().iter().copied().collect();
    if values.iter().any(|v| !v.is_finite()) {
        tracing::warn!("{} contains NaN or infinite voxels", path.display());
    }

    let tensor = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new([nz, ny, nx])), device);
    let image = Image::new(tensor, geometry).with_context(|| format!("Empty volume in {}", path.display()))?;
    tracing::debug!("Read {} with shape {:?}", path.display(), image.shape());
    Ok(image)
}

/// Write a scalar volume as float32 with its geometry in sform and qform.
///
/// A `.gz` extension selects gzip compression.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B>) -> Result<()> {
    let path = path.as_ref();
    let [nz, ny, nx] = image.shape();
    let array = Array::from_shape_vec((nz, ny, nx), image.to_vec())
        .context("Failed to create ndarray")?
        .reversed_axes();

    let header = geometry_header(image.geometry());
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Write a displacement field in the ANTs warp layout.
pub fn write_displacement_field<B: Backend, P: AsRef<Path>>(path: P, field: &DeformationField<B>) -> Result<()> {
    let path = path.as_ref();
    let [nz, ny, nx] = field.shape();

    let mut values: Vec<f32> = field.displacement().clone().into_data().iter::<f32>().collect();
    // RAS -> LPS: negate the x and y components (the first two [Z, Y, X] blocks).
    let block = nz * ny * nx;
    for v in &mut values[..2 * block] {
        *v = -*v;
    }

    // [3, 1, Z, Y, X] reversed is the on-disk (X, Y, Z, 1, 3).
    let array = Array::from_shape_vec((3, 1, nz, ny, nx), values)
        .context("Failed to create ndarray")?
        .reversed_axes();

    let mut header = geometry_header(field.geometry());
    header.intent_code = INTENT_VECTOR;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write displacement field {}", path.display()))?;
    tracing::debug!("Wrote displacement field {}", path.display());
    Ok(())
}

/// Read an ANTs warp back into RAS displacements.
pub fn read_displacement_field<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<DeformationField<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read displacement field {}", path.display()))?;
    let header = obj.header();
    if header.intent_code != INTENT_VECTOR {
        tracing::warn!(
            "{} has intent code {}, expected {}",
            path.display(),
            header.intent_code,
            INTENT_VECTOR
        );
    }
    let geometry = header_geometry(header).with_context(|| format!("Invalid geometry in {}", path.display()))?;

    let volume: ArrayD<f32> = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert field to ndarray")?;
    let dims = volume.shape().to_vec();
    if dims.len() != 5 || dims[3] != 1 || dims[4] != 3 {
        bail!("Expected field dimensions (X, Y, Z, 1, 3) in {}, found {:?}", path.display(), dims);
    }
    let [nx, ny, nz] = [dims[0], dims[1], dims[2]];

    let mut values: Vec<f32> = volume.reversed_axes().iter().copied().collect();
    let block = nz * ny * nx;
    for v in &mut values[..2 * block] {
        *v = -*v;
    }

    let tensor = Tensor::<B, 4>::from_data(TensorData::new(values, Shape::new([3, nz, ny, nx])), device);
    DeformationField::new(tensor, geometry).with_context(|| format!("Invalid displacement field {}", path.display()))
}

/// Geometry from the header: sform, then qform, then pixdim only.
pub fn header_geometry(header: &NiftiHeader) -> Result<Geometry> {
    let affine = if header.sform_code > 0 {
        let mut affine = Affine4::identity();
        for (r, row) in [header.srow_x, header.srow_y, header.srow_z].iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                affine[(r, c)] = f64::from(v);
            }
        }
        affine
    } else if header.qform_code > 0 {
        qform_affine(header)
    } else {
        let mut affine = Affine4::identity();
        for axis in 0..3 {
            affine[(axis, axis)] = pixdim_spacing(header.pixdim[axis + 1]);
        }
        affine
    };
    Ok(Geometry::from_affine(&affine)?)
}

fn qform_affine(header: &NiftiHeader) -> Affine4 {
    let b = f64::from(header.quatern_b);
    let c = f64::from(header.quatern_c);
    let d = f64::from(header.quatern_d);
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

    let rotation = Direction3::new(
        a * a + b * b - c * c - d * d,
        2.0 * (b * c - a * d),
        2.0 * (b * d + a * c),
        2.0 * (b * c + a * d),
        a * a + c * c - b * b - d * d,
        2.0 * (c * d - a * b),
        2.0 * (b * d - a * c),
        2.0 * (c * d + a * b),
        a * a + d * d - b * b - c * c,
    );
    let scale = Direction3::from_diagonal(&nalgebra::Vector3::new(
        pixdim_spacing(header.pixdim[1]),
        pixdim_spacing(header.pixdim[2]),
        pixdim_spacing(header.pixdim[3]) * qfac,
    ));

    let mut affine = Affine4::identity();
    affine.fixed_view_mut::<3, 3>(0, 0).copy_from(&(rotation * scale));
    affine[(0, 3)] = f64::from(header.quatern_x);
    affine[(1, 3)] = f64::from(header.quatern_y);
    affine[(2, 3)] = f64::from(header.quatern_z);
    affine
}

/// Unset or invalid pixdim entries read as 1mm.
fn pixdim_spacing(value: f32) -> f64 {
    if value.is_finite() && value > 0.0 {
        f64::from(value)
    } else {
        1.0
    }
}

/// Header carrying `geometry` in both sform and qform (millimetre units).
pub fn geometry_header(geometry: &Geometry) -> NiftiHeader {
    let affine = geometry.to_affine();
    let spacing = geometry.spacing();

    let mut header = NiftiHeader::default();
    header.sform_code = XFORM_SCANNER_ANAT;
    header.qform_code = XFORM_SCANNER_ANAT;
    header.xyzt_units = UNITS_MM;
    for (r, row) in [&mut header.srow_x, &mut header.srow_y, &mut header.srow_z].into_iter().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = affine[(r, c)] as f32;
        }
    }

    // qform holds a proper rotation; a reflection goes into qfac on z.
    let mut rotation = *geometry.direction();
    let qfac = if rotation.determinant() < 0.0 {
        let flipped = -rotation.column(2);
        rotation.set_column(2, &flipped);
        -1.0
    } else {
        1.0
    };
    let quaternion = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&rotation));
    let q = quaternion.quaternion();
    // a = w must be non-negative; q and -q encode the same rotation.
    let sign = if q.w < 0.0 { -1.0 } else { 1.0 };

    header.pixdim[0] = qfac as f32;
    header.pixdim[1] = spacing[0] as f32;
    header.pixdim[2] = spacing[1] as f32;
    header.pixdim[3] = spacing[2] as f32;
    header.quatern_b = (sign * q.i) as f32;
    header.quatern_c = (sign * q.j) as f32;
    header.quatern_d = (sign * q.k) as f32;
    header.quatern_x = affine[(0, 3)] as f32;
    header.quatern_y = affine[(1, 3)] as f32;
    header.quatern_z = affine[(2, 3)] as f32;
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use ravens_core::{Point3, Spacing3};
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn oblique_geometry() -> Geometry {
        let angle = 0.3f64;
        let direction = Direction3::new(
            angle.cos(), -angle.sin(), 0.0,
            angle.sin(), angle.cos(), 0.0,
            0.0, 0.0, 1.0,
        );
        Geometry::new(Point3::new(-90.0, 12.5, 40.0), Spacing3::new(1.0, 1.2, 2.5), direction).unwrap()
    }

    #[test]
    fn test_read_nifti_basic() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");

        // Logical (X, Y, Z) = (3, 4, 5) with value x + 3y + 12z
        let array = Array::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 3 * y + 12 * z) as f32);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        let image = read_nifti::<TestBackend, _>(&file_path, &device)?;
        assert_eq!(image.shape(), [5, 4, 3]);

        let values = image.to_vec();
        assert_eq!(values.len(), 60);
        // row-major [Z, Y, X] walks x fastest
        for (i, v) in values.iter().enumerate() {
            assert_eq!(*v, i as f32);
        }
        Ok(())
    }

    #[test]
    fn test_geometry_survives_header() {
        let geometry = oblique_geometry();
        let header = geometry_header(&geometry);
        assert!(header_geometry(&header).unwrap().approx_eq(&geometry, 1e-4));

        // The qform alone encodes the same grid.
        let mut qform_only = header.clone();
        qform_only.sform_code = 0;
        assert!(header_geometry(&qform_only).unwrap().approx_eq(&geometry, 1e-4));
    }

    #[test]
    fn test_reflected_direction_uses_qfac() {
        let geometry = Geometry::new(
            Point3::new(10.0, 20.0, 30.0),
            Spacing3::new(2.0, 2.0, 3.0),
            Direction3::from_diagonal(&nalgebra::Vector3::new(1.0, 1.0, -1.0)),
        )
        .unwrap();
        let mut header = geometry_header(&geometry);
        assert_eq!(header.pixdim[0], -1.0);
        header.sform_code = 0;
        assert!(header_geometry(&header).unwrap().approx_eq(&geometry, 1e-5));
    }
}
