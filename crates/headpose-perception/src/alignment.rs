//! Absolute orientation between a calibration cluster and a live cluster.
//!
//! [`Aligner::align`] runs the whole chain for one cycle:
//! centroid removal → cross-covariance → quaternion matrix → rotation
//! extraction.  The reference side is passed already centered because it is
//! captured once and reused for every cycle.

use headpose_types::PoseError;
use nalgebra::Vector3;

use crate::centroid::{remove_mean, CenteredCloud};
use crate::covariance::cross_covariance;
use crate::quaternion_matrix::quaternion_matrix;
use crate::rotation::RotationExtractor;
use crate::transform::RigidTransform;

/// Default minimum mean squared distance from the centroid.
pub const DEFAULT_MIN_SPREAD: f64 = 1e-12;

/// Solver for one reference/current pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aligner {
    pub extractor: RotationExtractor,
    /// Clusters whose [`CenteredCloud::spread`] falls below this are rejected
    /// as degenerate before any matrix is built.
    pub min_spread: f64,
}

impl Default for Aligner {
    fn default() -> Self {
        Self {
            extractor: RotationExtractor::default(),
            min_spread: DEFAULT_MIN_SPREAD,
        }
    }
}

impl Aligner {
    pub fn new(extractor: RotationExtractor, min_spread: f64) -> Self {
        Self {
            extractor,
            min_spread,
        }
    }

    /// Estimate the transform of `current` relative to `reference`.
    ///
    /// The returned translation is the absolute centroid of `current`; the
    /// rotation carries the centered reference onto the centered current set.
    pub fn align(
        &self,
        reference: &CenteredCloud,
        current: &[Vector3<f64>],
    ) -> Result<RigidTransform, PoseError> {
        let current = remove_mean(current);
        self.align_centered(reference, &current)
    }

    /// [`Aligner::align`] for a current set that is already centered.
    pub fn align_centered(
        &self,
        reference: &CenteredCloud,
        current: &CenteredCloud,
    ) -> Result<RigidTransform, PoseError> {
        self.check_spread("reference", reference)?;
        self.check_spread("current", current)?;

        let sigma = cross_covariance(&reference.points, &current.points)?;
        let q = quaternion_matrix(&sigma);
        self.extractor.extract(&q, &current.centroid)
    }

    fn check_spread(&self, which: &str, cloud: &CenteredCloud) -> Result<(), PoseError> {
        let spread = cloud.spread();
        if !spread.is_finite() {
            return Err(PoseError::NumericalAnomaly(format!(
                "{which} cluster spread is not finite"
            )));
        }
        if spread < self.min_spread {
            return Err(PoseError::DegeneratePose(format!(
                "{which} cluster has collapsed (spread {spread:.3e})"
            )));
        }
        Ok(())
    }
}

/// Root-mean-square distance between the rotated reference and the current
/// centered points.
///
/// Zero for a perfectly rigid motion; grows with marker noise or label swaps.
pub fn rms_residual(
    transform: &RigidTransform,
    reference: &CenteredCloud,
    current: &CenteredCloud,
) -> f64 {
    if reference.is_empty() {
        return 0.0;
    }
    let sum: f64 = reference
        .points
        .iter()
        .zip(&current.points)
        .map(|(p, x)| (transform.rotation * p - x).norm_squared())
        .sum();
    (sum / reference.len() as f64).sqrt()
}
