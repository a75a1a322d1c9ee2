//! Frame-in-flight ring
//!
//! Backend-independent bookkeeping for N pipelined frames. Each slot walks
//! `Idle -> Recording -> Submitted -> Presented` and returns to `Idle` only
//! once the CPU has waited on the fence of its previous submission. The
//! native fence itself belongs to the backend; the ring only decides *when*
//! to wait and which deletion queue a destruction lands in.

use crate::render::api::deletion_queue::DeletionQueue;
use crate::render::error::{RalError, RalResult};

/// Lifecycle state of one frame-in-flight slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Free for recording; no GPU work outstanding
    Idle,
    /// Commands are being recorded
    Recording,
    /// Submitted to the queue; the fence has not been waited on yet
    Submitted,
    /// Presented after submission; the fence has not been waited on yet
    Presented,
}

impl FrameState {
    /// Whether GPU work from this slot may still be executing
    pub fn in_flight(self) -> bool {
        matches!(self, Self::Submitted | Self::Presented)
    }
}

#[derive(Debug)]
struct FrameSlot {
    state: FrameState,
    deletion_queue: DeletionQueue,
}

/// Ring of frame slots with per-slot deletion queues
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    current: usize,
    last_submitted: Option<usize>,
}

impl FrameRing {
    /// Create a ring with `frames_in_flight` idle slots (at least one)
    pub fn new(frames_in_flight: usize) -> Self {
        let slots = (0..frames_in_flight.max(1))
            .map(|_| FrameSlot {
                state: FrameState::Idle,
                deletion_queue: DeletionQueue::new(),
            })
            .collect();

        Self {
            slots,
            current: 0,
            last_submitted: None,
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a ring has at least one slot
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the slot the next (or current) frame uses
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// State of the slot at `index`
    pub fn state(&self, index: usize) -> FrameState {
        self.slots[index % self.slots.len()].state
    }

    /// State of the current slot
    pub fn current_state(&self) -> FrameState {
        self.slots[self.current].state
    }

    /// Whether a frame is currently being recorded
    pub fn is_recording(&self) -> bool {
        self.current_state() == FrameState::Recording
    }

    /// Start a frame in the current slot
    ///
    /// If the slot's previous submission has not been waited on, `wait` is
    /// called with the slot index and must block until that submission has
    /// retired. The slot's deletion queue is flushed afterwards.
    pub fn begin_frame<F>(&mut self, wait: F) -> RalResult<usize>
    where
        F: FnOnce(usize) -> RalResult<()>,
    {
        let index = self.current;
        let slot = &mut self.slots[index];

        match slot.state {
            FrameState::Recording => {
                return Err(RalError::invalid_operation(format!(
                    "begin_frame called while frame slot {index} is still recording"
                )));
            }
            FrameState::Submitted | FrameState::Presented => {
                wait(index)?;
                slot.state = FrameState::Idle;
            }
            FrameState::Idle => {}
        }

        slot.deletion_queue.flush();
        slot.state = FrameState::Recording;
        Ok(index)
    }

    /// Give up on the frame being recorded without submitting it
    pub fn abort_frame(&mut self) {
        let slot = &mut self.slots[self.current];
        if slot.state == FrameState::Recording {
            slot.state = FrameState::Idle;
        }
    }

    /// Record that the current frame was submitted
    pub fn mark_submitted(&mut self) -> RalResult<()> {
        let index = self.current;
        let slot = &mut self.slots[index];
        if slot.state != FrameState::Recording {
            return Err(RalError::invalid_operation(format!(
                "end_frame called for frame slot {index} which is not recording"
            )));
        }
        slot.state = FrameState::Submitted;
        self.last_submitted = Some(index);
        Ok(())
    }

    /// Record that the current frame's image was handed to presentation
    pub fn mark_presented(&mut self) {
        let slot = &mut self.slots[self.current];
        if slot.state == FrameState::Submitted {
            slot.state = FrameState::Presented;
        }
    }

    /// Move to the next slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    /// Slot whose deletion queue receives a destruction issued right now
    ///
    /// While recording, that is the current slot. Between frames it is the
    /// slot submitted last, whose fence also covers every earlier submission;
    /// the next slot's fence may belong to older work.
    pub fn deletion_target(&self) -> usize {
        if self.is_recording() {
            self.current
        } else {
            self.last_submitted.unwrap_or(self.current)
        }
    }

    /// Defer a native destruction until it is safe
    pub fn defer(&mut self, label: &'static str, deletion: impl FnOnce() + 'static) {
        let target = self.deletion_target();
        self.slots[target].deletion_queue.push(label, deletion);
    }

    /// Pending deletions in slot `index`
    pub fn pending_deletions(&self, index: usize) -> usize {
        self.slots[index % self.slots.len()].deletion_queue.len()
    }

    /// Flush every queue, oldest frame first
    ///
    /// Only valid once the device is idle; every slot becomes `Idle`.
    pub fn flush_all(&mut self) {
        let len = self.slots.len();
        for offset in 1..=len {
            let slot = &mut self.slots[(self.current + offset) % len];
            slot.deletion_queue.flush();
            slot.state = FrameState::Idle;
        }
        self.last_submitted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn run_frame(ring: &mut FrameRing, waits: &Cell<usize>) {
        ring.begin_frame(|_| {
            waits.set(waits.get() + 1);
            Ok(())
        })
        .unwrap();
        ring.mark_submitted().unwrap();
        ring.mark_presented();
        ring.advance();
    }

    #[test]
    fn test_third_frame_waits_with_two_in_flight() {
        let mut ring = FrameRing::new(2);
        let waits = Cell::new(0);

        run_frame(&mut ring, &waits);
        run_frame(&mut ring, &waits);
        assert_eq!(waits.get(), 0);

        run_frame(&mut ring, &waits);
        assert_eq!(waits.get(), 1);
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let mut ring = FrameRing::new(2);
        ring.begin_frame(|_| Ok(())).unwrap();
        let err = ring.begin_frame(|_| Ok(())).unwrap_err();
        assert!(matches!(err, RalError::InvalidOperation { .. }));
    }

    #[test]
    fn test_submit_without_begin_is_rejected() {
        let mut ring = FrameRing::new(2);
        assert!(ring.mark_submitted().is_err());
    }

    #[test]
    fn test_state_walk() {
        let mut ring = FrameRing::new(2);
        assert_eq!(ring.current_state(), FrameState::Idle);
        ring.begin_frame(|_| Ok(())).unwrap();
        assert_eq!(ring.current_state(), FrameState::Recording);
        ring.mark_submitted().unwrap();
        assert_eq!(ring.current_state(), FrameState::Submitted);
        ring.mark_presented();
        assert_eq!(ring.state(0), FrameState::Presented);
        ring.advance();
        assert_eq!(ring.current_index(), 1);
    }

    #[test]
    fn test_abort_returns_slot_to_idle_without_wait() {
        let mut ring = FrameRing::new(1);
        let waits = Cell::new(0);
        ring.begin_frame(|_| Ok(())).unwrap();
        ring.abort_frame();
        assert_eq!(ring.current_state(), FrameState::Idle);
        run_frame(&mut ring, &waits);
        assert_eq!(waits.get(), 0);
    }

    #[test]
    fn test_deletion_between_frames_targets_last_submitted_slot() {
        let mut ring = FrameRing::new(2);
        ring.begin_frame(|_| Ok(())).unwrap();
        ring.mark_submitted().unwrap();
        ring.advance();

        ring.defer("buffer", || {});
        assert_eq!(ring.pending_deletions(0), 1);
        assert_eq!(ring.pending_deletions(1), 0);
    }

    #[test]
    fn test_deletion_while_recording_targets_current_slot() {
        let mut ring = FrameRing::new(2);
        let waits = Cell::new(0);
        run_frame(&mut ring, &waits);
        ring.begin_frame(|_| Ok(())).unwrap();
        ring.defer("texture", || {});
        assert_eq!(ring.pending_deletions(1), 1);
    }

    #[test]
    fn test_deferred_deletion_runs_only_after_slot_wait() {
        let freed = Rc::new(Cell::new(false));
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut ring = FrameRing::new(2);

        ring.begin_frame(|_| Ok(())).unwrap();
        ring.mark_submitted().unwrap();
        ring.advance();

        let f = Rc::clone(&freed);
        let e = Rc::clone(&events);
        ring.defer("buffer", move || {
            f.set(true);
            e.borrow_mut().push("free");
        });

        // Slot 1 has no history; its flush must not touch slot 0's queue.
        ring.begin_frame(|_| Ok(())).unwrap();
        assert!(!freed.get());
        ring.mark_submitted().unwrap();
        ring.advance();

        let e = Rc::clone(&events);
        ring.begin_frame(move |index| {
            assert_eq!(index, 0);
            e.borrow_mut().push("wait");
            Ok(())
        })
        .unwrap();
        assert!(freed.get());
        assert_eq!(*events.borrow(), vec!["wait", "free"]);
    }

    #[test]
    fn test_flush_all_drains_every_slot() {
        let count = Rc::new(Cell::new(0));
        let mut ring = FrameRing::new(3);
        let waits = Cell::new(0);
        for _ in 0..3 {
            run_frame(&mut ring, &waits);
            let c = Rc::clone(&count);
            ring.defer("buffer", move || c.set(c.get() + 1));
        }
        ring.flush_all();
        assert_eq!(count.get(), 3);
        for index in 0..3 {
            assert_eq!(ring.state(index), FrameState::Idle);
            assert_eq!(ring.pending_deletions(index), 0);
        }
    }
}
