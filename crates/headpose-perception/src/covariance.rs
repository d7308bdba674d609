//! Cross-covariance of two paired, centered point sets.

use headpose_types::PoseError;
use nalgebra::{Matrix3, Vector3};

/// Build Σ = (1/N) · Σᵢ referenceᵢ · currentᵢᵀ.
///
/// Points are paired by index: marker `i` of the reference is marker `i` of
/// the current set.  No matching is attempted, so a tracker that swaps marker
/// labels produces a wrong (but finite) matrix.
///
/// # Errors
///
/// Returns [`PoseError::InvalidInput`] when the sets are empty or differ in
/// length.
pub fn cross_covariance(
    reference: &[Vector3<f64>],
    current: &[Vector3<f64>],
) -> Result<Matrix3<f64>, PoseError> {
    if reference.len() != current.len() {
        return Err(PoseError::InvalidInput(format!(
            "reference has {} markers but current batch has {}",
            reference.len(),
            current.len()
        )));
    }
    if reference.is_empty() {
        return Err(PoseError::InvalidInput(
            "cannot correlate empty point sets".to_string(),
        ));
    }

    let sum = reference
        .iter()
        .zip(current)
        .fold(Matrix3::zeros(), |acc, (p, x)| acc + p * x.transpose());
    Ok(sum / reference.len() as f64)
}
