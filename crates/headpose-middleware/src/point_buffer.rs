//! Latest-wins marker buffer.
//!
//! A single guarded slot shared by the ingestion side (any number of threads
//! calling [`PointBuffer::submit`]) and the one pose worker (calling
//! [`PointBuffer::take_if_dirty`] or [`PointBuffer::wait_take`]).  The slot
//! being occupied *is* the dirty flag, so the batch and its freshness can
//! never be observed out of step.
//!
//! A submission overwrites any batch the worker has not yet taken.  The worker
//! therefore sees a subsequence of the submissions, in submission order, and
//! always the most recent one.

use std::time::Duration;

use headpose_types::MarkerBatch;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Slot {
    latest: Option<MarkerBatch>,
    submitted: u64,
    coalesced: u64,
}

/// Counters describing buffer traffic since creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    /// Batches accepted by [`PointBuffer::submit`].
    pub submitted: u64,
    /// Batches overwritten before the worker took them.
    pub coalesced: u64,
}

/// Single-slot shared cell with a wake-up signal.
#[derive(Debug, Default)]
pub struct PointBuffer {
    slot: Mutex<Slot>,
    fresh: Condvar,
}

impl PointBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `batch` as the latest sample and wake the worker.
    ///
    /// Returns `true` when an unconsumed batch was dropped to make room.
    pub fn submit(&self, batch: MarkerBatch) -> bool {
        let replaced = {
            let mut slot = self.slot.lock();
            slot.submitted += 1;
            let replaced = slot.latest.replace(batch).is_some();
            if replaced {
                slot.coalesced += 1;
            }
            replaced
        };
        self.fresh.notify_one();
        replaced
    }

    /// Take the latest batch if one arrived since the last take.
    pub fn take_if_dirty(&self) -> Option<MarkerBatch> {
        self.slot.lock().latest.take()
    }

    /// Like [`PointBuffer::take_if_dirty`], but waits up to `timeout` for a
    /// submission when the slot is empty.
    pub fn wait_take(&self, timeout: Duration) -> Option<MarkerBatch> {
        let mut slot = self.slot.lock();
        if slot.latest.is_none() {
            // Spurious wake-ups are fine: the caller polls again.
            let _ = self.fresh.wait_for(&mut slot, timeout);
        }
        slot.latest.take()
    }

    /// `true` when a batch is waiting to be taken.
    pub fn is_dirty(&self) -> bool {
        self.slot.lock().latest.is_some()
    }

    /// Wake every waiter without submitting anything (used on shutdown).
    pub fn wake_all(&self) {
        self.fresh.notify_all();
    }

    pub fn stats(&self) -> BufferStats {
        let slot = self.slot.lock();
        BufferStats {
            submitted: slot.submitted,
            coalesced: slot.coalesced,
        }
    }
}
