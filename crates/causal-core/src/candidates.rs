//! Bounded candidate-frame buffer filled from signal context
//!
//! Pre-allocated once; each warm-up signal claims a slot with an atomic
//! index bump under a short spinlock. Once the buffer is full further
//! frames are dropped, never queued. The scheduler drains it between
//! sampling rounds.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::frame::CallFrame;
use crate::spinlock::SpinLock;

/// What happened to a pushed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Recorded,
    /// Buffer full; frame dropped
    Overflowed,
    /// The calling thread already holds the buffer lock; frame dropped
    Reentered,
}

pub struct CandidateBuffer {
    slots: SpinLock<Box<[CallFrame]>>,
    next: AtomicUsize,
    capacity: usize,
}

impl CandidateBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: SpinLock::new(vec![CallFrame::EMPTY; capacity].into_boxed_slice()),
            next: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently held (never more than capacity).
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Relaxed).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record one frame. Allocation-free; safe from the sampler.
    pub fn push(&self, frame: CallFrame) -> PushOutcome {
        let Some(mut slots) = self.slots.lock_unless_owned() else {
            return PushOutcome::Reentered;
        };
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        if index < self.capacity {
            slots[index] = frame;
            PushOutcome::Recorded
        } else {
            // Keep the index pinned so it cannot creep towards overflow.
            self.next.store(self.capacity, Ordering::Relaxed);
            PushOutcome::Overflowed
        }
    }

    /// Copy out everything recorded so far and reset the buffer.
    pub fn drain(&self) -> Vec<CallFrame> {
        let mut slots = self.slots.lock();
        let count = self.next.load(Ordering::Relaxed).min(self.capacity);
        let taken = slots[..count].to_vec();
        slots[..count].fill(CallFrame::EMPTY);
        self.next.store(0, Ordering::Relaxed);
        taken
    }

    /// Discard everything recorded so far.
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.fill(CallFrame::EMPTY);
        self.next.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MethodId;
    use std::sync::Arc;
    use std::thread;

    fn frame(m: usize, o: i32) -> CallFrame {
        CallFrame::new(MethodId::new(m), o)
    }

    #[test]
    fn test_push_and_drain() {
        let buf = CandidateBuffer::new(4);
        assert_eq!(buf.push(frame(1, 1)), PushOutcome::Recorded);
        assert_eq!(buf.push(frame(2, 2)), PushOutcome::Recorded);
        assert_eq!(buf.len(), 2);

        assert_eq!(buf.drain(), vec![frame(1, 1), frame(2, 2)]);
        assert!(buf.is_empty());
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn test_overflow_drops() {
        let buf = CandidateBuffer::new(2);
        buf.push(frame(1, 0));
        buf.push(frame(2, 0));
        assert_eq!(buf.push(frame(3, 0)), PushOutcome::Overflowed);
        assert_eq!(buf.push(frame(4, 0)), PushOutcome::Overflowed);
        assert_eq!(buf.drain(), vec![frame(1, 0), frame(2, 0)]);

        // Usable again after the drain.
        assert_eq!(buf.push(frame(5, 0)), PushOutcome::Recorded);
    }

    #[test]
    fn test_push_while_owner_holds_lock() {
        let buf = CandidateBuffer::new(2);
        let _held = buf.slots.lock();
        assert_eq!(buf.push(frame(1, 0)), PushOutcome::Reentered);
    }

    #[test]
    fn test_concurrent_pushes_respect_capacity() {
        let buf = Arc::new(CandidateBuffer::new(100));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let buf = Arc::clone(&buf);
                thread::spawn(move || {
                    for i in 0..50 {
                        buf.push(frame(t + 1, i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let drained = buf.drain();
        assert_eq!(drained.len(), 100);
        assert!(drained.iter().all(|f| !f.method.is_none()));
    }
}
