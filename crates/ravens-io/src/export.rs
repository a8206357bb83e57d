//! All-or-nothing publishing of registration artifacts.
//!
//! Every file is staged as a temporary file next to its destination and only
//! renamed into place once all of them were written. A failed rename removes
//! the files already published in the same batch.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use ravens_registration::{ArtifactSink, RegistrationResult};
use tempfile::{Builder, NamedTempFile};

use crate::ants::write_ants_affine;
use crate::nifti_io::{write_displacement_field, write_nifti};

/// Output locations derived from a prefix such as `/out/subj_`.
///
/// Names are appended to the prefix verbatim, so `/out/subj_` yields
/// `/out/subj_Warped.nii.gz` and `/out/` yields `/out/Warped.nii.gz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub warped: PathBuf,
    pub affine: PathBuf,
    pub forward_field: PathBuf,
    pub inverse_field: PathBuf,
    pub moments_transform: PathBuf,
    pub moments_warped: PathBuf,
}

impl ArtifactPaths {
    pub fn from_prefix<P: AsRef<Path>>(prefix: P) -> Self {
        let prefix = prefix.as_ref().as_os_str();
        let join = |name: &str| {
            let mut path = OsString::from(prefix);
            path.push(name);
            PathBuf::from(path)
        };
        Self {
            warped: join("Warped.nii.gz"),
            affine: join("0GenericAffine.mat"),
            forward_field: join("Def.nii.gz"),
            inverse_field: join("InvDef.nii.gz"),
            moments_transform: join("MomentsInit.mat"),
            moments_warped: join("MomentsWarped.nii.gz"),
        }
    }

    /// Paths written for a run, moments files only when `with_moments`.
    pub fn expected(&self, with_moments: bool) -> Vec<&Path> {
        let mut paths = vec![
            self.warped.as_path(),
            self.affine.as_path(),
            self.forward_field.as_path(),
            self.inverse_field.as_path(),
        ];
        if with_moments {
            paths.push(self.moments_transform.as_path());
            paths.push(self.moments_warped.as_path());
        }
        paths
    }
}

/// Writes registration results in the ANTs file layout.
#[derive(Debug, Clone)]
pub struct TransformExporter {
    paths: ArtifactPaths,
}

impl TransformExporter {
    pub fn new<P: AsRef<Path>>(prefix: P) -> Self {
        Self {
            paths: ArtifactPaths::from_prefix(prefix),
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Write every artifact of `result`, publishing all of them or none.
    pub fn export<B: Backend>(&self, result: &RegistrationResult<B>) -> Result<Vec<PathBuf>> {
        // Transforms are centred on the fixed grid, which the warped output shares.
        let center = result.warped().center();

        let mut staged = Vec::new();
        staged.push(stage(&self.paths.warped, |tmp| write_nifti(tmp, result.warped()))?);
        staged.push(stage(&self.paths.affine, |tmp| {
            write_ants_affine(tmp, result.linear_transform(), &center)
        })?);
        staged.push(stage(&self.paths.forward_field, |tmp| {
            write_displacement_field(tmp, result.forward_field())
        })?);
        staged.push(stage(&self.paths.inverse_field, |tmp| {
            write_displacement_field(tmp, result.inverse_field())
        })?);
        if let Some(moments) = result.moments() {
            staged.push(stage(&self.paths.moments_transform, |tmp| {
                write_ants_affine(tmp, &moments.transform, &center)
            })?);
            staged.push(stage(&self.paths.moments_warped, |tmp| write_nifti(tmp, &moments.warped))?);
        }

        publish(staged)
    }
}

impl<B: Backend> ArtifactSink<B> for TransformExporter {
    type Error = anyhow::Error;

    fn publish(&mut self, result: &RegistrationResult<B>) -> Result<Vec<PathBuf>> {
        self.export(result)
    }
}

struct Staged {
    file: NamedTempFile,
    destination: PathBuf,
}

/// Write `destination` into a temporary sibling with the same extension.
fn stage<F>(destination: &Path, write: F) -> Result<Staged>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    // The writers pick compression from the suffix.
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = if name.ends_with(".nii.gz") {
        ".nii.gz".to_string()
    } else {
        destination
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
    };

    let file = Builder::new()
        .prefix(".ravens-")
        .suffix(&suffix)
        .tempfile_in(&dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;
    write(file.path()).with_context(|| format!("Failed to stage {}", destination.display()))?;

    Ok(Staged {
        file,
        destination: destination.to_path_buf(),
    })
}

/// Rename every staged file into place, undoing earlier renames on failure.
fn publish(staged: Vec<Staged>) -> Result<Vec<PathBuf>> {
    let mut published: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for Staged { file, destination } in staged {
        if let Err(err) = file.persist(&destination) {
            for path in &published {
                if let Err(remove_err) = fs::remove_file(path) {
                    tracing::warn!("Failed to roll back {}: {}", path.display(), remove_err);
                }
            }
            // Remaining temporaries are removed when dropped.
            return Err(err.error).with_context(|| format!("Failed to publish {}", destination.display()));
        }
        tracing::info!("Wrote {}", destination.display());
        published.push(destination);
    }
    Ok(published)
}
