//! [`PoseEstimator`] – the calibration/run state machine.
//!
//! ```text
//!  AwaitingFirstSample ──first batch──▶ Calibrated ──every later batch──▶ pose
//! ```
//!
//! The first batch ever processed is mean-centered and kept as the reference
//! (zero) pose; no pose is produced for it.  Every later batch is aligned
//! against that reference.  The reference is never replaced, and no state
//! carries over between later cycles: each pose depends only on the reference
//! and the batch it was computed from.
//!
//! # Example
//!
//! ```rust
//! use headpose_runtime::estimator::{CycleOutcome, EstimatorConfig, PoseEstimator};
//! use headpose_types::{MarkerBatch, MarkerPoint};
//!
//! let square = vec![
//!     MarkerPoint::new(0.0, 0.0, 0.0),
//!     MarkerPoint::new(1.0, 0.0, 0.0),
//!     MarkerPoint::new(1.0, 1.0, 0.0),
//!     MarkerPoint::new(0.0, 1.0, 0.0),
//! ];
//! let mut estimator = PoseEstimator::new(&EstimatorConfig::default()).unwrap();
//!
//! let batch = MarkerBatch::new(square, 4).unwrap();
//! assert!(matches!(estimator.process(&batch), Ok(CycleOutcome::Calibrated { .. })));
//! assert!(matches!(estimator.process(&batch), Ok(CycleOutcome::Pose(_))));
//! ```

use std::time::Duration;

use headpose_perception::alignment::DEFAULT_MIN_SPREAD;
use headpose_perception::rotation::{DEFAULT_MIN_EIGEN_GAP, DEFAULT_NORMALIZATION_TOLERANCE};
use headpose_perception::{Aligner, CenteredCloud, RotationExtractor, remove_batch_mean};
use headpose_types::{DEFAULT_MARKER_COUNT, MarkerBatch, PoseError, PoseEstimate};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Fewest markers that can pin down a 3-D rotation.
pub const MIN_MARKER_COUNT: usize = 3;

/// Default worker poll interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for the estimator and its worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Markers per batch (N).
    pub marker_count: usize,
    /// Longest the worker waits for a fresh batch before re-checking its stop
    /// flag.
    pub poll_interval_ms: u64,
    /// Largest tolerated deviation of the eigenvector norm from 1.
    pub normalization_tolerance: f64,
    /// Smallest mean squared distance from the centroid for a usable cluster.
    pub min_spread: f64,
    /// Smallest relative gap between the two largest eigenvalues of Q.
    pub min_eigen_gap: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            marker_count: DEFAULT_MARKER_COUNT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            normalization_tolerance: DEFAULT_NORMALIZATION_TOLERANCE,
            min_spread: DEFAULT_MIN_SPREAD,
            min_eigen_gap: DEFAULT_MIN_EIGEN_GAP,
        }
    }
}

impl EstimatorConfig {
    /// Reject settings the estimator cannot run with.
    pub fn validate(&self) -> Result<(), PoseError> {
        if self.marker_count < MIN_MARKER_COUNT {
            return Err(PoseError::InvalidInput(format!(
                "marker_count must be at least {MIN_MARKER_COUNT}, got {}",
                self.marker_count
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(PoseError::InvalidInput(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("normalization_tolerance", self.normalization_tolerance),
            ("min_spread", self.min_spread),
            ("min_eigen_gap", self.min_eigen_gap),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PoseError::InvalidInput(format!(
                    "{name} must be a non-negative finite number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn aligner(&self) -> Aligner {
        Aligner::new(
            RotationExtractor::new(self.normalization_tolerance, self.min_eigen_gap),
            self.min_spread,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Where the estimator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    AwaitingFirstSample,
    Calibrated,
}

/// The mean-centered calibration batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFrame {
    pub sequence: u64,
    pub cloud: CenteredCloud,
}

/// Result of feeding one batch to [`PoseEstimator::process`].
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The batch became the reference; nothing to emit.
    Calibrated {
        sequence: u64,
        centroid: Vector3<f64>,
    },
    /// A pose relative to the reference.
    Pose(PoseEstimate),
}

// ─────────────────────────────────────────────────────────────────────────────
// PoseEstimator
// ─────────────────────────────────────────────────────────────────────────────

/// One-shot calibration followed by per-batch pose estimation.
#[derive(Debug)]
pub struct PoseEstimator {
    marker_count: usize,
    aligner: Aligner,
    reference: Option<ReferenceFrame>,
}

impl PoseEstimator {
    /// # Errors
    ///
    /// [`PoseError::InvalidInput`] when `config` fails validation.
    pub fn new(config: &EstimatorConfig) -> Result<Self, PoseError> {
        config.validate()?;
        Ok(Self {
            marker_count: config.marker_count,
            aligner: config.aligner(),
            reference: None,
        })
    }

    pub fn state(&self) -> EstimatorState {
        match self.reference {
            None => EstimatorState::AwaitingFirstSample,
            Some(_) => EstimatorState::Calibrated,
        }
    }

    pub fn reference(&self) -> Option<&ReferenceFrame> {
        self.reference.as_ref()
    }

    /// Advance the state machine by one batch.
    ///
    /// The first call captures the reference.  Later calls return a pose or
    /// the reason none could be computed; a failed cycle leaves the estimator
    /// calibrated and ready for the next batch.
    pub fn process(&mut self, batch: &MarkerBatch) -> Result<CycleOutcome, PoseError> {
        self.check_marker_count(batch)?;
        if self.reference.is_none() {
            return Ok(self.capture_reference(batch));
        }
        self.estimate(batch).map(CycleOutcome::Pose)
    }

    /// Pose of `batch` relative to the reference.
    ///
    /// # Errors
    ///
    /// - [`PoseError::NotCalibrated`] before the reference exists.
    /// - [`PoseError::DegeneratePose`] for collapsed or collinear clusters.
    /// - [`PoseError::NumericalAnomaly`] when the eigen-solution is unusable.
    pub fn estimate(&self, batch: &MarkerBatch) -> Result<PoseEstimate, PoseError> {
        let reference = self.reference.as_ref().ok_or(PoseError::NotCalibrated)?;
        self.check_marker_count(batch)?;

        let current = remove_batch_mean(batch);
        let transform = self.aligner.align_centered(&reference.cloud, &current)?;
        let pose = transform.to_pose(batch.sequence(), batch.captured_at());
        debug!(sequence = pose.sequence, "{pose}");
        Ok(pose)
    }

    fn capture_reference(&mut self, batch: &MarkerBatch) -> CycleOutcome {
        let cloud = remove_batch_mean(batch);
        let centroid = cloud.centroid;
        if cloud.spread() < self.aligner.min_spread {
            warn!(
                sequence = batch.sequence(),
                spread = cloud.spread(),
                "calibration cluster has collapsed; every pose will be degenerate"
            );
        }
        info!(
            sequence = batch.sequence(),
            centroid_x = centroid.x,
            centroid_y = centroid.y,
            centroid_z = centroid.z,
            "captured calibration pose"
        );
        self.reference = Some(ReferenceFrame {
            sequence: batch.sequence(),
            cloud,
        });
        CycleOutcome::Calibrated {
            sequence: batch.sequence(),
            centroid,
        }
    }

    fn check_marker_count(&self, batch: &MarkerBatch) -> Result<(), PoseError> {
        if batch.len() != self.marker_count {
            return Err(PoseError::InvalidInput(format!(
                "estimator expects {} markers, batch has {}",
                self.marker_count,
                batch.len()
            )));
        }
        Ok(())
    }
}
