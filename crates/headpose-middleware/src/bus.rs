//! Headless, topic-based publish/subscribe bus for pose output.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the worker.  Publishing is synchronous and never waits, so the bus can be
//! fed straight from the pose worker thread.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Pose`] | One [`EventPayload::Pose`] per processed batch |
//! | [`Topic::Diagnostics`] | Calibration capture and skipped cycles |

use headpose_types::{Event, EventPayload, PoseError, PoseEstimate};
use nalgebra::Vector3;
use tokio::sync::broadcast;
use tracing::trace;

use crate::sink::PoseSink;

pub use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

const SOURCE: &str = "headpose-middleware::bus";

/// Routing lanes on the pose bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Pose,
    Diagnostics,
}

/// Shared pose bus.  Clone it cheaply; all clones share the same channels.
#[derive(Clone, Debug)]
pub struct PoseBus {
    pose: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
}

impl PoseBus {
    /// Create a new bus with the given per-topic channel capacity.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (pose, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        Self { pose, diagnostics }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of subscribers that were handed the event; `0`
    /// when nobody is listening, which is a normal condition for a real-time
    /// estimator.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(_)) => {
                trace!(?topic, "no subscribers; event dropped");
                0
            }
        }
    }

    /// Subscribe to a single topic.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Pose => &self.pose,
            Topic::Diagnostics => &self.diagnostics,
        }
    }
}

impl Default for PoseBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PoseSink for PoseBus {
    fn emit(&mut self, pose: &PoseEstimate) -> Result<(), PoseError> {
        self.publish_to(Topic::Pose, Event::new(SOURCE, EventPayload::Pose(*pose)));
        Ok(())
    }

    fn calibrated(&mut self, sequence: u64, centroid: &Vector3<f64>) {
        self.publish_to(
            Topic::Diagnostics,
            Event::new(
                SOURCE,
                EventPayload::Calibrated {
                    sequence,
                    centroid: *centroid,
                },
            ),
        );
    }

    fn skipped(&mut self, sequence: u64, reason: &PoseError) {
        self.publish_to(
            Topic::Diagnostics,
            Event::new(
                SOURCE,
                EventPayload::CycleSkipped {
                    sequence,
                    reason: reason.clone(),
                },
            ),
        );
    }
}

/// A receiver bound to a single [`Topic`].
///
/// Obtained via [`PoseBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// `Err(RecvError::Lagged(n))` means the subscriber fell behind and `n`
    /// events were dropped; `Err(RecvError::Closed)` means every bus handle
    /// is gone.
    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        self.receiver.recv().await
    }

    /// Blocking variant for plain threads.  Must not be called from inside
    /// an async runtime.
    pub fn blocking_recv(&mut self) -> Result<Event, RecvError> {
        self.receiver.blocking_recv()
    }

    /// Non-blocking variant for consumers outside an async runtime.
    pub fn try_recv(&mut self) -> Result<Event, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
