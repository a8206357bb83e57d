//! ANTs / ITK linear transform files.
//!
//! `antsRegistration` stores affine transforms as MATLAB v4 `.mat` files
//! holding two column vectors:
//!
//! * `AffineTransform_double_3_3`: the 3×3 matrix in row-major order followed
//!   by the translation (12 values)
//! * `fixed`: the centre of rotation (3 values)
//!
//! ITK works in LPS physical space, so matrices are conjugated with
//! `diag(-1, -1, 1)` on the way in and out.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use ravens_core::{Direction3, LinearTransform, Point3, Vector3};

pub const AFFINE_VARIABLE: &str = "AffineTransform_double_3_3";
pub const FIXED_VARIABLE: &str = "fixed";

/// RAS <-> LPS, its own inverse.
fn ras_to_lps() -> Direction3 {
    Direction3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0))
}

/// ITK parameters of `transform` about `center`, both RAS.
///
/// Returns the 12 LPS parameters and the LPS centre.
pub fn itk_parameters(transform: &LinearTransform, center: &Point3) -> ([f64; 12], [f64; 3]) {
    let flip = ras_to_lps();
    let matrix = flip * transform.linear() * flip;
    let translation = flip * transform.translation_about(center);
    let fixed = flip * center.coords;

    let mut parameters = [0.0; 12];
    for r in 0..3 {
        for c in 0..3 {
            parameters[3 * r + c] = matrix[(r, c)];
        }
        parameters[9 + r] = translation[r];
    }
    (parameters, [fixed[0], fixed[1], fixed[2]])
}

/// RAS transform from ITK parameters and LPS centre.
pub fn from_itk_parameters(parameters: &[f64], fixed: &[f64]) -> Result<LinearTransform> {
    ensure!(parameters.len() == 12, "expected 12 affine parameters, found {}", parameters.len());
    ensure!(fixed.len() == 3, "expected a 3-element centre, found {}", fixed.len());

    let flip = ras_to_lps();
    let matrix = flip * Direction3::from_row_slice(&parameters[..9]) * flip;
    let translation = flip * Vector3::new(parameters[9], parameters[10], parameters[11]);
    let center = Point3::from(flip * Vector3::new(fixed[0], fixed[1], fixed[2]));
    let transform = LinearTransform::centered(matrix, &center, translation);
    transform.validate().context("transform file holds an invalid affine")?;
    Ok(transform)
}

/// Write `transform` (RAS, pull-back) as an ANTs `.mat` file centred on `center`.
pub fn write_ants_affine<P: AsRef<Path>>(path: P, transform: &LinearTransform, center: &Point3) -> Result<()> {
    let path = path.as_ref();
    let (parameters, fixed) = itk_parameters(transform, center);

    let mut bytes = Vec::with_capacity(256);
    write_variable(&mut bytes, AFFINE_VARIABLE, &parameters);
    write_variable(&mut bytes, FIXED_VARIABLE, &fixed);

    let mut file = fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(&bytes)
        .and_then(|_| file.sync_all())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!("Wrote affine transform {}", path.display());
    Ok(())
}

/// Read an ANTs `.mat` affine back into a RAS [`LinearTransform`].
pub fn read_ants_affine<P: AsRef<Path>>(path: P) -> Result<LinearTransform> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let variables = parse_variables(&bytes).with_context(|| format!("Malformed MATLAB v4 file {}", path.display()))?;

    let find = |name: &str| {
        variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.values.as_slice())
            .ok_or_else(|| anyhow!("{} has no variable '{}'", path.display(), name))
    };
    let parameters = find(AFFINE_VARIABLE)?;
    // ITK defaults the centre to the origin when it is absent.
    let fixed = find(FIXED_VARIABLE).unwrap_or(&[0.0, 0.0, 0.0][..]);
    from_itk_parameters(parameters, fixed).with_context(|| format!("Invalid transform in {}", path.display()))
}

struct MatVariable {
    name: String,
    values: Vec<f64>,
}

/// Append a real double column vector, little-endian.
fn write_variable(out: &mut Vec<u8>, name: &str, values: &[f64]) {
    // type 0000: little-endian IEEE, double precision, full numeric matrix
    let header: [i32; 5] = [0, values.len() as i32, 1, 0, name.len() as i32 + 1];
    for field in header {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn parse_variables(bytes: &[u8]) -> Result<Vec<MatVariable>> {
    let mut variables = Vec::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        let (variable, next) = parse_variable(bytes, cursor)?;
        variables.push(variable);
        cursor = next;
    }
    Ok(variables)
}

fn take<'a>(bytes: &'a [u8], cursor: usize, len: usize) -> Result<&'a [u8]> {
    bytes
        .get(cursor..cursor + len)
        .ok_or_else(|| anyhow!("truncated at byte {} (need {} more)", cursor, len))
}

fn parse_variable(bytes: &[u8], cursor: usize) -> Result<(MatVariable, usize)> {
    let raw_type = take(bytes, cursor, 4)?;
    // The type word is small and positive, so its byte order follows from
    // which end holds the non-zero bytes.
    let little_endian = (0..10_000).contains(&i32::from_le_bytes([raw_type[0], raw_type[1], raw_type[2], raw_type[3]]));
    let read_i32 = |offset: usize| -> Result<i32> {
        let b = take(bytes, offset, 4)?;
        let b = [b[0], b[1], b[2], b[3]];
        Ok(if little_endian { i32::from_le_bytes(b) } else { i32::from_be_bytes(b) })
    };

    let type_code = read_i32(cursor)?;
    let rows = read_i32(cursor + 4)?;
    let cols = read_i32(cursor + 8)?;
    let imaginary = read_i32(cursor + 12)?;
    let name_len = read_i32(cursor + 16)?;
    ensure!(rows >= 0 && cols >= 0 && name_len > 0, "invalid variable header");

    let machine = type_code / 1000;
    let precision = (type_code / 10) % 10;
    let matrix_kind = type_code % 10;
    ensure!(machine <= 1, "unsupported machine format {}", machine);
    ensure!(matrix_kind == 0, "only full numeric matrices are supported");
    ensure!(imaginary == 0, "complex matrices are not supported");

    let mut offset = cursor + 20;
    let name_bytes = take(bytes, offset, name_len as usize)?;
    let name = String::from_utf8_lossy(name_bytes.split(|&b| b == 0).next().unwrap_or_default()).into_owned();
    offset += name_len as usize;

    let count = rows as usize * cols as usize;
    let width = match precision {
        0 => 8,
        1 => 4,
        other => bail!("unsupported precision code {} for '{}'", other, name),
    };
    let data = take(bytes, offset, count * width)?;
    let values = data
        .chunks_exact(width)
        .map(|chunk| match (width, little_endian) {
            (8, true) => f64::from_le_bytes(chunk.try_into().unwrap_or([0; 8])),
            (8, false) => f64::from_be_bytes(chunk.try_into().unwrap_or([0; 8])),
            (_, true) => f64::from(f32::from_le_bytes(chunk.try_into().unwrap_or([0; 4]))),
            (_, false) => f64::from(f32::from_be_bytes(chunk.try_into().unwrap_or([0; 4]))),
        })
        .collect();

    Ok((MatVariable { name, values }, offset + count * width))
}
