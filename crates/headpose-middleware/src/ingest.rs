//! Ingestion boundary.
//!
//! Capture callbacks hand raw frames to an [`Ingestor`].  The ingestor picks
//! the tracked cluster out of each frame ([`MarkerSelection`]), validates it,
//! stamps it with a sequence number and drops it into the shared
//! [`PointBuffer`].  Malformed frames are rejected here and never reach the
//! buffer.
//!
//! [`Ingestor`] is cheap to clone; every clone feeds the same buffer and
//! shares the same open/closed state, so several capture threads may submit
//! concurrently.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use headpose_types::{DEFAULT_MARKER_COUNT, MarkerBatch, MarkerPoint, PoseError, RawFrame};
use tracing::{debug, warn};

use crate::point_buffer::PointBuffer;

/// Labels of the default head cluster, in marker-index order.
pub const DEFAULT_MARKER_LABELS: [&str; DEFAULT_MARKER_COUNT] = ["fore", "left", "chin", "right"];

/// Which raw markers form the tracked cluster, and what to call them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSelection {
    indices: Vec<usize>,
    labels: Vec<String>,
}

impl MarkerSelection {
    /// Select raw markers `indices`, in that order.
    ///
    /// `labels` may be empty (markers are then named by position) or must name
    /// every selected marker.
    ///
    /// # Errors
    ///
    /// [`PoseError::InvalidInput`] for an empty selection or a label count
    /// that does not match.
    pub fn new(indices: Vec<usize>, labels: Vec<String>) -> Result<Self, PoseError> {
        if indices.is_empty() {
            return Err(PoseError::InvalidInput(
                "marker selection is empty".to_string(),
            ));
        }
        if !labels.is_empty() && labels.len() != indices.len() {
            return Err(PoseError::InvalidInput(format!(
                "{} labels given for {} markers",
                labels.len(),
                indices.len()
            )));
        }
        Ok(Self { indices, labels })
    }

    /// The first `count` raw markers, unlabeled.
    pub fn first(count: usize) -> Result<Self, PoseError> {
        Self::new((0..count).collect(), Vec::new())
    }

    /// Number of markers in the tracked cluster.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Human-readable name of tracked marker `i`.
    pub fn label(&self, i: usize) -> String {
        match self.labels.get(i) {
            Some(label) => label.clone(),
            None => format!("marker {i}"),
        }
    }

    /// Build the tracked batch from `frame`.
    pub fn select(&self, frame: &RawFrame) -> Result<MarkerBatch, PoseError> {
        let mut points = Vec::with_capacity(self.indices.len());
        for (i, &raw) in self.indices.iter().enumerate() {
            let point: MarkerPoint = *frame.markers.get(raw).ok_or_else(|| {
                PoseError::InvalidInput(format!(
                    "frame has {} markers; {} (raw index {raw}) is missing",
                    frame.markers.len(),
                    self.label(i)
                ))
            })?;
            if !point.is_finite() {
                return Err(PoseError::InvalidInput(format!(
                    "{} (raw index {raw}) has a non-finite coordinate",
                    self.label(i)
                )));
            }
            points.push(point);
        }
        let batch = MarkerBatch::new(points, self.indices.len())?;
        Ok(batch.stamped(0, frame.captured_at))
    }
}

impl Default for MarkerSelection {
    fn default() -> Self {
        Self {
            indices: (0..DEFAULT_MARKER_COUNT).collect(),
            labels: DEFAULT_MARKER_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Clonable submission handle in front of a [`PointBuffer`].
#[derive(Debug, Clone)]
pub struct Ingestor {
    buffer: Arc<PointBuffer>,
    selection: Arc<MarkerSelection>,
    open: Arc<AtomicBool>,
    next_sequence: Arc<AtomicU64>,
}

impl Ingestor {
    pub fn new(buffer: Arc<PointBuffer>, selection: MarkerSelection) -> Self {
        Self {
            buffer,
            selection: Arc::new(selection),
            open: Arc::new(AtomicBool::new(true)),
            next_sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Validate `frame` and make it the latest sample.
    ///
    /// Returns the sequence number assigned to the batch.
    ///
    /// # Errors
    ///
    /// [`PoseError::IngestionClosed`] after [`Ingestor::close`];
    /// [`PoseError::InvalidInput`] when the frame lacks a tracked marker or
    /// carries a non-finite coordinate.
    pub fn submit_frame(&self, frame: &RawFrame) -> Result<u64, PoseError> {
        self.ensure_open()?;
        let batch = self.selection.select(frame).inspect_err(|e| {
            warn!(error = %e, "rejected marker frame");
        })?;
        Ok(self.push(batch))
    }

    /// Submit an already-selected cluster (exactly one point per tracked
    /// marker, in marker order).
    pub fn submit_points(&self, points: Vec<MarkerPoint>) -> Result<u64, PoseError> {
        self.ensure_open()?;
        let batch = MarkerBatch::new(points, self.selection.len()).inspect_err(|e| {
            warn!(error = %e, "rejected marker batch");
        })?;
        Ok(self.push(batch))
    }

    /// Stop accepting submissions.  Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!("ingestion closed");
        }
        self.buffer.wake_all();
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn selection(&self) -> &MarkerSelection {
        &self.selection
    }

    pub fn buffer(&self) -> &Arc<PointBuffer> {
        &self.buffer
    }

    fn ensure_open(&self) -> Result<(), PoseError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(PoseError::IngestionClosed)
        }
    }

    fn push(&self, batch: MarkerBatch) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let captured_at = batch.captured_at();
        if self.buffer.submit(batch.stamped(sequence, captured_at)) {
            debug!(sequence, "overwrote unconsumed marker batch");
        }
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(n: usize) -> RawFrame {
        RawFrame::new(
            (0..n)
                .map(|i| MarkerPoint::new(i as f64, (i * i) as f64, 1.0))
                .collect(),
        )
    }

    fn ingestor() -> Ingestor {
        Ingestor::new(Arc::new(PointBuffer::new()), MarkerSelection::default())
    }

    #[test]
    fn default_selection_is_labelled_head_cluster() {
        let sel = MarkerSelection::default();
        assert_eq!(sel.len(), 4);
        assert_eq!(sel.label(0), "fore");
        assert_eq!(sel.label(2), "chin");
    }

    #[test]
    fn unlabeled_selection_names_by_position() {
        let sel = MarkerSelection::first(3).unwrap();
        assert_eq!(sel.label(1), "marker 1");
    }

    #[test]
    fn selection_rejects_label_mismatch() {
        let err = MarkerSelection::new(vec![0, 1], vec!["a".to_string()]).unwrap_err();
        assert!(matches!(err, PoseError::InvalidInput(_)));
        assert!(MarkerSelection::new(Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn select_picks_configured_indices_in_order() {
        let sel = MarkerSelection::new(vec![5, 1, 3, 0], Vec::new()).unwrap();
        let batch = sel.select(&frame(6)).unwrap();
        let xs: Vec<f64> = batch.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![5.0, 1.0, 3.0, 0.0]);
    }

    #[test]
    fn select_ignores_extra_markers() {
        let batch = MarkerSelection::default().select(&frame(10)).unwrap();
        assert_eq!(batch.len(), 4);
    }

    #[test]
    fn select_reports_missing_marker_by_label() {
        let err = MarkerSelection::default().select(&frame(3)).unwrap_err();
        assert!(err.to_string().contains("right"), "got: {err}");
    }

    #[test]
    fn select_rejects_non_finite_marker() {
        let mut f = frame(4);
        f.markers[1].x = f64::NAN;
        let err = MarkerSelection::default().select(&f).unwrap_err();
        assert!(err.to_string().contains("left"), "got: {err}");
    }

    #[test]
    fn submit_assigns_increasing_sequence_numbers() {
        let ing = ingestor();
        assert_eq!(ing.submit_frame(&frame(4)).unwrap(), 1);
        assert_eq!(ing.submit_frame(&frame(4)).unwrap(), 2);
        let taken = ing.buffer().take_if_dirty().unwrap();
        assert_eq!(taken.sequence(), 2);
    }

    #[test]
    fn malformed_frame_never_reaches_buffer() {
        let ing = ingestor();
        assert!(ing.submit_frame(&frame(2)).is_err());
        assert!(ing.submit_points(vec![MarkerPoint::new(0.0, 0.0, 0.0)]).is_err());
        assert!(!ing.buffer().is_dirty());
        assert_eq!(ing.buffer().stats().submitted, 0);
    }

    #[test]
    fn closed_ingestor_rejects_submissions() {
        let ing = ingestor();
        let clone = ing.clone();
        ing.close();
        assert!(!clone.is_open());
        assert_eq!(clone.submit_frame(&frame(4)), Err(PoseError::IngestionClosed));
        assert!(!ing.buffer().is_dirty());
    }

    #[test]
    fn clones_submit_from_many_threads() {
        let ing = ingestor();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let ing = ing.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        ing.submit_frame(&frame(4)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ing.buffer().stats().submitted, 150);
        assert_eq!(ing.buffer().take_if_dirty().map(|b| b.sequence() <= 150), Some(true));
    }
}
