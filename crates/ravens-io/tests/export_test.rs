use std::fs;

use burn::backend::Autodiff;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use nifti::{NiftiObject, ReaderOptions};
use ravens_core::{DeformationField, Direction3, Geometry, Image, Point3, Spacing3};
use ravens_io::nifti_io::INTENT_VECTOR;
use ravens_io::{
    read_ants_affine, read_displacement_field, read_nifti, write_displacement_field, write_nifti, ArtifactPaths,
    TransformExporter,
};
use ravens_registration::{
    DeformableConfig, Profile, ProgressTracker, RegistrationError, RegistrationOrchestrator, RegistrationState,
};
use tempfile::tempdir;

type B = Autodiff<NdArray<f32>>;

fn oblique_geometry() -> Geometry {
    let angle = -0.4f64;
    let direction = Direction3::new(
        1.0, 0.0, 0.0,
        0.0, angle.cos(), -angle.sin(),
        0.0, angle.sin(), angle.cos(),
    );
    Geometry::new(Point3::new(12.0, -30.0, 5.5), Spacing3::new(1.5, 1.0, 2.0), direction).unwrap()
}

/// Smooth blob so a short registration has something to work with.
fn blob(shape: [usize; 3], center: [f64; 3], geometry: Geometry) -> Image<B> {
    let [nz, ny, nx] = shape;
    let mut data = Vec::with_capacity(nz * ny * nx);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let d2 = (x as f64 - center[0]).powi(2) + (y as f64 - center[1]).powi(2) + (z as f64 - center[2]).powi(2);
                data.push((200.0 * (-d2 / 18.0).exp()) as f32);
            }
        }
    }
    let tensor = Tensor::<B, 3>::from_data(TensorData::new(data, shape), &Default::default());
    Image::new(tensor, geometry).unwrap()
}

fn quick_orchestrator() -> RegistrationOrchestrator {
    let config = Profile::Test
        .config()
        .with_scales(vec![2, 1], vec![5, 5])
        .with_deformable(DeformableConfig::new().with_iterations(vec![2, 2]));
    RegistrationOrchestrator::new(config).with_progress(ProgressTracker::new())
}

#[test]
fn test_volume_roundtrip_keeps_geometry() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("volume.nii.gz");
    let image = blob([6, 7, 8], [3.0, 3.0, 2.0], oblique_geometry());

    write_nifti(&path, &image)?;
    let back = read_nifti::<B, _>(&path, &Default::default())?;

    assert_eq!(back.shape(), image.shape());
    assert!(back.geometry().approx_eq(image.geometry(), 1e-4));
    assert_eq!(back.to_vec(), image.to_vec());
    Ok(())
}

#[test]
fn test_field_uses_ants_layout() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("Def.nii.gz");
    let [nz, ny, nx] = [3usize, 4, 5];
    let values: Vec<f32> = (0..3 * nz * ny * nx).map(|i| i as f32 * 0.1 - 2.0).collect();
    let tensor = Tensor::<B, 4>::from_data(TensorData::new(values.clone(), [3, nz, ny, nx]), &Default::default());
    let field = DeformationField::new(tensor, oblique_geometry())?;

    write_displacement_field(&path, &field)?;

    let obj = ReaderOptions::new().read_file(&path)?;
    let header = obj.header();
    assert_eq!(header.intent_code, INTENT_VECTOR);
    assert_eq!(&header.dim[..6], &[5, nx as u16, ny as u16, nz as u16, 1, 3]);

    let back = read_displacement_field::<B, _>(&path, &Default::default())?;
    let restored: Vec<f32> = back.displacement().clone().into_data().iter::<f32>().collect();
    assert_eq!(restored, values);
    assert!(back.geometry().approx_eq(field.geometry(), 1e-4));
    Ok(())
}

#[test]
fn test_export_writes_every_artifact() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let prefix = dir.path().join("subj_");
    let fixed = blob([16, 16, 16], [7.5, 7.5, 7.5], Geometry::isotropic(2.0));
    let moving = blob([16, 16, 16], [8.5, 7.5, 7.0], Geometry::isotropic(2.0));

    let mut orchestrator = quick_orchestrator();
    let mut exporter = TransformExporter::new(&prefix);
    let result = orchestrator.run_and_export(&fixed, &moving, &mut exporter)?;
    assert_eq!(orchestrator.state(), Some(RegistrationState::Complete));

    let paths = ArtifactPaths::from_prefix(&prefix);
    for path in paths.expected(true) {
        assert!(path.is_file(), "missing {}", path.display());
    }
    // Nothing else, in particular no staging leftovers.
    assert_eq!(fs::read_dir(dir.path())?.count(), 6);

    let affine = read_ants_affine(&paths.affine)?;
    assert!(affine.max_abs_diff(result.linear_transform()) < 1e-9);
    let moments = read_ants_affine(&paths.moments_transform)?;
    assert!(moments.max_abs_diff(result.moments_transform().unwrap()) < 1e-9);

    let warped = read_nifti::<B, _>(&paths.warped, &Default::default())?;
    assert_eq!(warped.to_vec(), result.warped().to_vec());
    assert!(warped.geometry().approx_eq(fixed.geometry(), 1e-6));

    let forward = read_displacement_field::<B, _>(&paths.forward_field, &Default::default())?;
    assert_eq!(forward.shape(), fixed.shape());
    let written: Vec<f32> = forward.displacement().clone().into_data().iter::<f32>().collect();
    let expected: Vec<f32> = result.forward_field().displacement().clone().into_data().iter::<f32>().collect();
    assert_eq!(written, expected);
    Ok(())
}

#[test]
fn test_no_moments_files_without_moments() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let prefix = dir.path().join("out").join("run_");
    let fixed = blob([16, 16, 16], [7.5, 7.5, 7.5], Geometry::identity());

    let mut exporter = TransformExporter::new(&prefix);
    quick_orchestrator()
        .with_moments(false)
        .run_and_export(&fixed, &fixed, &mut exporter)?;

    let paths = exporter.paths();
    for path in paths.expected(false) {
        assert!(path.is_file(), "missing {}", path.display());
    }
    assert!(!paths.moments_transform.exists());
    assert!(!paths.moments_warped.exists());
    Ok(())
}

#[test]
fn test_unwritable_prefix_is_io_error() -> anyhow::Result<()> {
    let dir = tempdir()?;
    // A regular file where the output directory should be.
    let blocker = dir.path().join("not_a_dir");
    fs::write(&blocker, b"")?;
    let fixed = blob([16, 16, 16], [7.5, 7.5, 7.5], Geometry::identity());

    let mut orchestrator = quick_orchestrator().with_moments(false);
    let mut exporter = TransformExporter::new(blocker.join("subj_"));
    let result = orchestrator.run_and_export(&fixed, &fixed, &mut exporter);

    assert!(matches!(result, Err(RegistrationError::Io(_))));
    assert_eq!(orchestrator.state(), Some(RegistrationState::Failed));
    assert_eq!(fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}
