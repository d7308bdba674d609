//! [`PoseWorker`] – the dedicated estimation thread.
//!
//! The worker owns the [`PoseEstimator`] and the output [`PoseSink`].  It
//! sleeps on the shared [`PointBuffer`] until a fresh batch arrives (or the
//! poll interval elapses), runs one cycle, and hands the result to the sink.
//! Capture threads never wait on it: they only ever touch the buffer.
//!
//! A cycle that cannot produce a pose (degenerate cluster, numerical anomaly)
//! is logged, reported through [`PoseSink::skipped`], and the worker moves on
//! to the next batch.
//!
//! One [`StopHandle::stop`] closes ingestion and ends the loop; it is safe to
//! call from a signal handler thread.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use headpose_middleware::{Ingestor, PointBuffer, PoseSink};
use headpose_types::{MarkerBatch, PoseError};
use tracing::{debug, info, info_span, warn};

use crate::estimator::{CycleOutcome, EstimatorConfig, PoseEstimator};

const THREAD_NAME: &str = "headpose-worker";

/// Snapshot of the worker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStats {
    /// Batches taken from the buffer, including the calibration batch.
    pub processed: u64,
    /// Poses accepted by the sink.
    pub emitted: u64,
    /// Cycles that produced no pose.
    pub skipped: u64,
    /// Whether the calibration pose has been captured.
    pub calibrated: bool,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    emitted: AtomicU64,
    skipped: AtomicU64,
    calibrated: AtomicBool,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            processed: self.processed.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            calibrated: self.calibrated.load(Ordering::Relaxed),
        }
    }
}

/// Clonable shutdown signal for a running [`PoseWorker`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    ingestor: Ingestor,
}

impl StopHandle {
    /// Close ingestion and ask the worker loop to exit.  Idempotent.
    pub fn stop(&self) {
        self.ingestor.close();
        self.stop.store(true, Ordering::SeqCst);
        self.ingestor.buffer().wake_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Handle to the estimation thread.
///
/// Dropping a running worker stops and joins it; prefer
/// [`PoseWorker::shutdown`] to observe the final counters and any failure.
#[derive(Debug)]
pub struct PoseWorker {
    handle: Option<JoinHandle<()>>,
    stopper: StopHandle,
    counters: Arc<Counters>,
}

impl PoseWorker {
    /// Start the worker thread, consuming batches submitted through
    /// `ingestor`.
    ///
    /// # Errors
    ///
    /// - [`PoseError::InvalidInput`] when `config` is invalid or disagrees
    ///   with the ingestor's marker selection.
    /// - [`PoseError::IngestionClosed`] when `ingestor` was already closed.
    /// - [`PoseError::WorkerFailed`] when the OS refuses to spawn the thread.
    pub fn spawn<S>(config: EstimatorConfig, ingestor: Ingestor, sink: S) -> Result<Self, PoseError>
    where
        S: PoseSink + 'static,
    {
        let estimator = PoseEstimator::new(&config)?;
        let selected = ingestor.selection().len();
        if selected != config.marker_count {
            return Err(PoseError::InvalidInput(format!(
                "estimator expects {} markers but ingestion selects {selected}",
                config.marker_count
            )));
        }
        if !ingestor.is_open() {
            return Err(PoseError::IngestionClosed);
        }

        let stopper = StopHandle {
            stop: Arc::new(AtomicBool::new(false)),
            ingestor: ingestor.clone(),
        };
        let counters = Arc::new(Counters::default());

        let cycle = Cycle {
            estimator,
            sink,
            counters: Arc::clone(&counters),
        };
        let buffer = Arc::clone(ingestor.buffer());
        let stop = Arc::clone(&stopper.stop);
        let poll = config.poll_interval();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(cycle, &buffer, &stop, poll))
            .map_err(|e| PoseError::WorkerFailed(format!("could not spawn worker thread: {e}")))?;

        info!(
            marker_count = config.marker_count,
            poll_interval_ms = config.poll_interval_ms,
            "pose worker started"
        );
        Ok(Self {
            handle: Some(handle),
            stopper,
            counters,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stopper.clone()
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// `true` while the thread has not exited.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Close ingestion, stop the loop and join the thread.
    ///
    /// # Errors
    ///
    /// [`PoseError::WorkerFailed`] when the worker thread panicked.
    pub fn shutdown(mut self) -> Result<WorkerStats, PoseError> {
        self.stop_and_join()?;
        let stats = self.counters.snapshot();
        info!(
            processed = stats.processed,
            emitted = stats.emitted,
            skipped = stats.skipped,
            "pose worker stopped"
        );
        Ok(stats)
    }

    fn stop_and_join(&mut self) -> Result<(), PoseError> {
        self.stopper.stop();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|payload| PoseError::WorkerFailed(panic_message(&*payload))),
            None => Ok(()),
        }
    }
}

impl Drop for PoseWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            warn!(error = %e, "pose worker ended abnormally");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker thread
// ─────────────────────────────────────────────────────────────────────────────

struct Cycle<S> {
    estimator: PoseEstimator,
    sink: S,
    counters: Arc<Counters>,
}

impl<S: PoseSink> Cycle<S> {
    fn handle(&mut self, batch: &MarkerBatch) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        let sequence = batch.sequence();

        match self.estimator.process(batch) {
            Ok(CycleOutcome::Calibrated { sequence, centroid }) => {
                self.counters.calibrated.store(true, Ordering::Relaxed);
                self.sink.calibrated(sequence, &centroid);
            }
            Ok(CycleOutcome::Pose(pose)) => match self.sink.emit(&pose) {
                Ok(()) => {
                    self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!(sequence, error = %e, "sink rejected pose"),
            },
            Err(e) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                if e.is_transient() {
                    debug!(sequence, error = %e, "no pose for this cycle");
                } else {
                    warn!(sequence, error = %e, "no pose for this cycle");
                }
                self.sink.skipped(sequence, &e);
            }
        }
    }
}

fn run<S: PoseSink>(mut cycle: Cycle<S>, buffer: &PointBuffer, stop: &AtomicBool, poll: Duration) {
    let span = info_span!("pose_worker");
    let _enter = span.enter();

    while !stop.load(Ordering::SeqCst) {
        if let Some(batch) = buffer.wait_take(poll) {
            cycle.handle(&batch);
        }
    }
    debug!("stop flag observed; leaving worker loop");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker thread panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker thread panicked: {s}")
    } else {
        "worker thread panicked".to_string()
    }
}
