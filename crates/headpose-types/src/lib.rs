use std::fmt;

use chrono::{DateTime, Utc};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Number of markers on the default head cluster (fore, left, chin, right).
pub const DEFAULT_MARKER_COUNT: usize = 4;

/// A single 3-D marker position reported by the motion-capture rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MarkerPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl From<Vector3<f64>> for MarkerPoint {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Everything the capture source saw in one instant, before the tracked
/// cluster is selected out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub markers: Vec<MarkerPoint>,
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

impl RawFrame {
    pub fn new(markers: Vec<MarkerPoint>) -> Self {
        Self {
            markers,
            captured_at: Utc::now(),
        }
    }
}

/// An ordered set of exactly N marker positions sampled at the same instant.
///
/// Marker `i` in one batch is the same physical marker as marker `i` in every
/// other batch; the estimator pairs points by index.  Construction through
/// [`MarkerBatch::new`] is the only way to obtain a batch, so every batch in
/// circulation has the expected length and finite coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerBatch {
    points: Vec<MarkerPoint>,
    sequence: u64,
    captured_at: DateTime<Utc>,
}

impl MarkerBatch {
    /// Validate `points` against the expected marker count.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::InvalidInput`] when the count differs from
    /// `expected` or any coordinate is NaN or infinite.
    pub fn new(points: Vec<MarkerPoint>, expected: usize) -> Result<Self, PoseError> {
        if expected == 0 {
            return Err(PoseError::InvalidInput(
                "marker count must be at least 1".to_string(),
            ));
        }
        if points.len() != expected {
            return Err(PoseError::InvalidInput(format!(
                "expected {expected} markers, got {}",
                points.len()
            )));
        }
        if let Some(idx) = points.iter().position(|p| !p.is_finite()) {
            return Err(PoseError::InvalidInput(format!(
                "marker {idx} has a non-finite coordinate"
            )));
        }
        Ok(Self {
            points,
            sequence: 0,
            captured_at: Utc::now(),
        })
    }

    /// Stamp the batch with an ingestion sequence number and capture time.
    pub fn stamped(mut self, sequence: u64, captured_at: DateTime<Utc>) -> Self {
        self.sequence = sequence;
        self.captured_at = captured_at;
        self
    }

    pub fn points(&self) -> &[MarkerPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn vectors(&self) -> Vec<Vector3<f64>> {
        self.points.iter().map(|p| p.to_vector()).collect()
    }
}

/// The triple consumed by the downstream head controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadState {
    pub z: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// One pose computed from one marker batch.
///
/// `translation` is the absolute centroid of the batch; `rotation` is the
/// rotation that carries the calibration cluster onto the current one.  The
/// Euler angles are derived from `rotation` for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl PoseEstimate {
    pub fn head_state(&self) -> HeadState {
        HeadState {
            z: self.translation.z,
            pitch: self.pitch,
            yaw: self.yaw,
        }
    }
}

impl fmt::Display for PoseEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x: {:.3} | y: {:.3} | z: {:.3} | roll: {:.3} | pitch: {:.3} | yaw: {:.3}",
            self.translation.x,
            self.translation.y,
            self.translation.z,
            self.roll,
            self.pitch,
            self.yaw
        )
    }
}

/// Unified event wrapper for the pose bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "headpose-runtime::worker"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: &str, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.to_string(),
            payload,
        }
    }
}

/// Variants of data routed over the pose bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Pose(PoseEstimate),
    /// The zero pose was captured from batch `sequence`.
    Calibrated {
        sequence: u64,
        centroid: Vector3<f64>,
    },
    /// No pose was emitted for batch `sequence`.
    CycleSkipped { sequence: u64, reason: PoseError },
}

/// Error taxonomy shared by every headpose crate.
///
/// Only [`PoseError::WorkerFailed`] ends a worker; everything else skips a
/// single cycle or rejects a single submission.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoseError {
    #[error("Invalid marker input: {0}")]
    InvalidInput(String),

    #[error("No calibration pose has been captured yet")]
    NotCalibrated,

    #[error("Degenerate pose: {0}")]
    DegeneratePose(String),

    #[error("Numerical anomaly: {0}")]
    NumericalAnomaly(String),

    #[error("Ingestion is closed")]
    IngestionClosed,

    #[error("Pose worker failed: {0}")]
    WorkerFailed(String),
}

impl PoseError {
    /// `true` for conditions that skip one cycle but leave the pipeline
    /// running.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PoseError::DegeneratePose(_) | PoseError::NumericalAnomaly(_)
        )
    }
}
