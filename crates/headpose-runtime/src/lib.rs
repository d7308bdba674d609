//! `headpose-runtime` – runs the estimator.
//!
//! # Modules
//!
//! - [`estimator`] – [`PoseEstimator`]: captures the calibration pose from the
//!   first batch, then turns every later batch into a [`PoseEstimate`]
//!   relative to it.  [`EstimatorConfig`] holds the tunables.
//! - [`worker`] – [`PoseWorker`]: the dedicated thread that drains the
//!   latest-wins buffer, runs the estimator and feeds a
//!   [`PoseSink`][headpose_middleware::PoseSink].
//! - [`telemetry`] – [`init_tracing`]: console logging plus optional OTLP span
//!   export.
//!
//! # Wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use headpose_middleware::{Ingestor, MarkerSelection, PointBuffer, PoseBus};
//! use headpose_runtime::{EstimatorConfig, PoseWorker};
//!
//! let ingestor = Ingestor::new(Arc::new(PointBuffer::new()), MarkerSelection::default());
//! let bus = PoseBus::default();
//! let worker = PoseWorker::spawn(EstimatorConfig::default(), ingestor.clone(), bus.clone())?;
//!
//! // Capture callbacks call `ingestor.submit_frame(..)` from any thread.
//!
//! let stats = worker.shutdown()?;
//! println!("{} poses", stats.emitted);
//! # Ok::<(), headpose_types::PoseError>(())
//! ```
//!
//! [`PoseEstimate`]: headpose_types::PoseEstimate

pub mod estimator;
pub mod telemetry;
pub mod worker;

pub use estimator::{CycleOutcome, EstimatorConfig, EstimatorState, PoseEstimator};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
pub use worker::{PoseWorker, StopHandle, WorkerStats};
