//! Rotation extraction from the quaternion matrix Q.
//!
//! Q is real and symmetric, so its eigenvalues are real.  The eigenvector of
//! the largest eigenvalue is the optimal rotation quaternion, with component 0
//! as the scalar part.
//!
//! # Selection
//!
//! Eigenvalues are scanned in index order and an index replaces the current
//! best only when its value is *strictly* greater, so on exact ties the lowest
//! index wins.  Before the winner is accepted two checks run:
//!
//! - **Separation**: the winner must exceed the runner-up by at least
//!   `min_eigen_gap` relative to the largest eigenvalue magnitude.  A repeated
//!   top eigenvalue means a family of rotations fits equally well (collinear
//!   markers, collapsed cluster) and the cycle reports
//!   [`PoseError::DegeneratePose`].
//! - **Normalization**: the eigenvector norm may deviate from 1 by at most
//!   `normalization_tolerance` (default `1e-6`).  Within tolerance it is
//!   renormalized; beyond it the cycle reports [`PoseError::NumericalAnomaly`].
//!
//! Accepted quaternions are returned with a non-negative scalar part; `q` and
//! `−q` encode the same rotation.

use headpose_types::PoseError;
use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3, Vector4};
use tracing::debug;

use crate::transform::RigidTransform;

/// Largest tolerated `| |q| − 1 |` before an eigenvector is rejected.
pub const DEFAULT_NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Smallest tolerated relative gap between the two largest eigenvalues.
pub const DEFAULT_MIN_EIGEN_GAP: f64 = 1e-9;

/// Index of the largest value, lowest index on exact ties.
///
/// Returns `None` for an empty slice.
pub fn dominant_index(eigenvalues: &[f64]) -> Option<usize> {
    let (&first, rest) = eigenvalues.split_first()?;
    let mut max = first;
    let mut best = 0;
    for (i, &value) in rest.iter().enumerate() {
        if value > max {
            max = value;
            best = i + 1;
        }
    }
    Some(best)
}

/// Turns Q into a rotation and, given the current centroid, a full transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationExtractor {
    pub normalization_tolerance: f64,
    pub min_eigen_gap: f64,
}

impl Default for RotationExtractor {
    fn default() -> Self {
        Self {
            normalization_tolerance: DEFAULT_NORMALIZATION_TOLERANCE,
            min_eigen_gap: DEFAULT_MIN_EIGEN_GAP,
        }
    }
}

impl RotationExtractor {
    pub fn new(normalization_tolerance: f64, min_eigen_gap: f64) -> Self {
        Self {
            normalization_tolerance,
            min_eigen_gap,
        }
    }

    /// Build the transform whose rotation is Q's dominant quaternion and
    /// whose translation is `centroid` (the current batch's absolute centre).
    ///
    /// # Errors
    ///
    /// [`PoseError::DegeneratePose`] when the dominant eigenvalue is not
    /// separated, [`PoseError::NumericalAnomaly`] for non-finite input or an
    /// eigenvector that is too far from unit length.
    pub fn extract(
        &self,
        q: &Matrix4<f64>,
        centroid: &Vector3<f64>,
    ) -> Result<RigidTransform, PoseError> {
        let rotation = self.dominant_quaternion(q)?;
        Ok(RigidTransform::new(*centroid, rotation))
    }

    /// The unit quaternion of Q's dominant eigenvector.
    pub fn dominant_quaternion(&self, q: &Matrix4<f64>) -> Result<UnitQuaternion<f64>, PoseError> {
        if q.iter().any(|v| !v.is_finite()) {
            return Err(PoseError::NumericalAnomaly(
                "quaternion matrix has non-finite entries".to_string(),
            ));
        }

        let eigen = q.symmetric_eigen();
        let values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PoseError::NumericalAnomaly(
                "eigen-decomposition produced non-finite eigenvalues".to_string(),
            ));
        }

        let idx = dominant_index(&values).ok_or_else(|| {
            PoseError::NumericalAnomaly("eigen-decomposition returned no eigenvalues".to_string())
        })?;
        self.check_separation(&values, idx)?;

        let column: Vector4<f64> = eigen.eigenvectors.column(idx).into_owned();
        debug!(
            index = idx,
            eigenvalue = values[idx],
            "selected dominant eigenvector"
        );
        self.quaternion_from_eigenvector(&column)
    }

    /// Interpret `v = (w, x, y, z)` as a rotation quaternion.
    pub fn quaternion_from_eigenvector(
        &self,
        v: &Vector4<f64>,
    ) -> Result<UnitQuaternion<f64>, PoseError> {
        let raw = Quaternion::new(v[0], v[1], v[2], v[3]);
        let norm = raw.norm();
        if !norm.is_finite() || (norm - 1.0).abs() > self.normalization_tolerance {
            return Err(PoseError::NumericalAnomaly(format!(
                "eigenvector norm {norm:.9} deviates from 1 by more than {:e}",
                self.normalization_tolerance
            )));
        }

        let unit = UnitQuaternion::new_normalize(raw);
        if unit.scalar() < 0.0 {
            Ok(UnitQuaternion::new_unchecked(-unit.into_inner()))
        } else {
            Ok(unit)
        }
    }

    fn check_separation(&self, values: &[f64], idx: usize) -> Result<(), PoseError> {
        let scale = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if scale < f64::MIN_POSITIVE {
            return Err(PoseError::DegeneratePose(
                "quaternion matrix vanishes".to_string(),
            ));
        }

        let largest = values[idx];
        let runner_up = values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, v)| *v)
            .fold(f64::NEG_INFINITY, f64::max);
        if largest - runner_up < self.min_eigen_gap * scale {
            return Err(PoseError::DegeneratePose(format!(
                "largest eigenvalues {largest:.6e} and {runner_up:.6e} are not separated"
            )));
        }
        Ok(())
    }
}
