//! Emission side of the pipeline.
//!
//! The pose worker never knows who consumes its output.  It hands every pose
//! to a [`PoseSink`]; the bus, a controller bridge or a test collector all
//! implement the same trait.

use headpose_types::{PoseError, PoseEstimate};
use nalgebra::Vector3;

/// Receiver of computed poses.
///
/// `emit` is called once per successfully processed batch, from the worker
/// thread.  The diagnostic hooks default to no-ops.
pub trait PoseSink: Send {
    /// Accept one pose.
    ///
    /// # Errors
    ///
    /// An error is logged by the worker and the pose is dropped; the worker
    /// keeps running.
    fn emit(&mut self, pose: &PoseEstimate) -> Result<(), PoseError>;

    /// The calibration pose was captured from batch `sequence`.
    fn calibrated(&mut self, _sequence: u64, _centroid: &Vector3<f64>) {}

    /// Batch `sequence` produced no pose.
    fn skipped(&mut self, _sequence: u64, _reason: &PoseError) {}
}

/// Adapts a closure into a [`PoseSink`].
pub struct FnSink<F>(pub F);

impl<F> PoseSink for FnSink<F>
where
    F: FnMut(&PoseEstimate) + Send,
{
    fn emit(&mut self, pose: &PoseEstimate) -> Result<(), PoseError> {
        (self.0)(pose);
        Ok(())
    }
}

impl<S: PoseSink + ?Sized> PoseSink for Box<S> {
    fn emit(&mut self, pose: &PoseEstimate) -> Result<(), PoseError> {
        (**self).emit(pose)
    }

    fn calibrated(&mut self, sequence: u64, centroid: &Vector3<f64>) {
        (**self).calibrated(sequence, centroid)
    }

    fn skipped(&mut self, sequence: u64, reason: &PoseError) {
        (**self).skipped(sequence, reason)
    }
}

/// Sends every pose to several sinks in turn.
///
/// The first sink error is returned after all sinks have been offered the
/// pose.
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn PoseSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl PoseSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl PoseSink for FanOut {
    fn emit(&mut self, pose: &PoseEstimate) -> Result<(), PoseError> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.emit(pose) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn calibrated(&mut self, sequence: u64, centroid: &Vector3<f64>) {
        for sink in &mut self.sinks {
            sink.calibrated(sequence, centroid);
        }
    }

    fn skipped(&mut self, sequence: u64, reason: &PoseError) {
        for sink in &mut self.sinks {
            sink.skipped(sequence, reason);
        }
    }
}
