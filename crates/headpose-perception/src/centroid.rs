//! Centroid removal.
//!
//! Splits a marker cluster into *where* it is (the centroid) and *what shape*
//! it has (the mean-centered points).  The rotation solver only ever sees the
//! centered shape; the centroid becomes the emitted translation.

use headpose_types::MarkerBatch;
use nalgebra::Vector3;

/// A point set translated so that its mean is the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct CenteredCloud {
    /// Mean of the original points.
    pub centroid: Vector3<f64>,
    /// Original points minus `centroid`, in the original order.
    pub points: Vec<Vector3<f64>>,
}

impl CenteredCloud {
    /// Mean squared distance of the points from their centroid.
    ///
    /// Zero for a cluster that has collapsed onto a single point.
    pub fn spread(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(|p| p.norm_squared()).sum::<f64>() / self.points.len() as f64
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Arithmetic mean of `points`, each axis accumulated independently.
///
/// Returns the zero vector for an empty slice.
pub fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    let sum: Vector3<f64> = points.iter().sum();
    sum / points.len() as f64
}

/// Compute the centroid of `points` and return it together with the
/// mean-centered copy.
pub fn remove_mean(points: &[Vector3<f64>]) -> CenteredCloud {
    let centroid = centroid(points);
    CenteredCloud {
        centroid,
        points: points.iter().map(|p| p - centroid).collect(),
    }
}

/// [`remove_mean`] over the markers of a validated batch.
pub fn remove_batch_mean(batch: &MarkerBatch) -> CenteredCloud {
    remove_mean(&batch.vectors())
}
