//! `headpose-middleware` – the plumbing between capture and computation.
//!
//! Moves marker batches in and poses out without caring what they mean.
//!
//! # Modules
//!
//! - [`point_buffer`] – [`PointBuffer`]: the single latest-wins slot shared by
//!   the capture threads and the pose worker.
//! - [`ingest`] – [`Ingestor`]: validates raw capture frames, selects the
//!   tracked cluster and submits it to the buffer.
//! - [`sink`] – [`PoseSink`]: the emission trait the worker writes to.
//! - [`bus`] – [`PoseBus`]: topic-based broadcast of poses and diagnostics
//!   built on Tokio broadcast channels.

pub mod bus;
pub mod ingest;
pub mod point_buffer;
pub mod sink;

pub use bus::{PoseBus, Topic, TopicReceiver};
pub use ingest::{DEFAULT_MARKER_LABELS, Ingestor, MarkerSelection};
pub use point_buffer::{BufferStats, PointBuffer};
pub use sink::{FanOut, FnSink, PoseSink};
