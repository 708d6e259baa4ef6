//! The experiment slot the sampler consults
//!
//! The scheduler loads an [`Experiment`] into pre-allocated atomics before
//! activating it, so the SIGPROF handler can test frames against it without
//! locks or allocation. Activation and deactivation are bracketed by
//! full fences; the scheduler's drain sleeps make them visible before the
//! next signal round.

use std::sync::atomic::{fence, AtomicBool, AtomicI32, AtomicI64, AtomicUsize, Ordering};

use causal_core::constants::MAX_RANGES;
use causal_core::{CallFrame, Experiment};

struct RangeSlot {
    start: AtomicI32,
    end: AtomicI32,
}

impl RangeSlot {
    const fn new() -> Self {
        Self {
            start: AtomicI32::new(0),
            end: AtomicI32::new(0),
        }
    }
}

pub struct ActiveExperiment {
    active: AtomicBool,
    method: AtomicUsize,
    delay_per_hit_ns: AtomicI64,
    range_count: AtomicUsize,
    ranges: Box<[RangeSlot]>,
}

impl ActiveExperiment {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            method: AtomicUsize::new(0),
            delay_per_hit_ns: AtomicI64::new(0),
            range_count: AtomicUsize::new(0),
            ranges: (0..MAX_RANGES).map(|_| RangeSlot::new()).collect(),
        }
    }

    /// Copy `experiment` into the slot. Call only while inactive.
    ///
    /// Returns how many ranges were loaded; ranges past capacity are dropped.
    pub fn load(&self, experiment: &Experiment) -> usize {
        debug_assert!(!self.is_active(), "experiment loaded while active");
        let count = experiment.ranges.len().min(self.ranges.len());
        for (slot, range) in self.ranges.iter().zip(&experiment.ranges) {
            slot.start.store(range.start, Ordering::Relaxed);
            slot.end.store(range.end, Ordering::Relaxed);
        }
        self.method
            .store(experiment.method.as_usize(), Ordering::Relaxed);
        self.delay_per_hit_ns
            .store(experiment.delay_per_hit_ns, Ordering::Relaxed);
        self.range_count.store(count, Ordering::Release);
        count
    }

    pub fn activate(&self) {
        fence(Ordering::SeqCst);
        self.active.store(true, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        fence(Ordering::SeqCst);
        self.active.store(false, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn delay_per_hit_ns(&self) -> i64 {
        self.delay_per_hit_ns.load(Ordering::Relaxed)
    }

    /// Whether `frame` executes inside the loaded line.
    #[inline]
    pub fn matches(&self, frame: &CallFrame) -> bool {
        if frame.method.as_usize() != self.method.load(Ordering::Relaxed) {
            return false;
        }
        let count = self.range_count.load(Ordering::Acquire);
        self.ranges[..count].iter().any(|slot| {
            frame.offset >= slot.start.load(Ordering::Relaxed)
                && frame.offset < slot.end.load(Ordering::Relaxed)
        })
    }
}

impl Default for ActiveExperiment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causal_core::{LineTable, MethodId};
    use proptest::prelude::*;
    use std::time::Duration;

    fn experiment() -> Experiment {
        let table = LineTable::from_pairs(&[(0, 10), (5, 11), (9, 12), (14, 11)]);
        let frame = CallFrame::new(MethodId::new(3), 6);
        let mut exp = Experiment::new(frame, table.locate(6).unwrap());
        exp.set_speedup(0.5, Duration::from_micros(1000));
        exp
    }

    #[test]
    fn test_load_and_match() {
        let slot = ActiveExperiment::new();
        assert_eq!(slot.load(&experiment()), 2);
        assert_eq!(slot.delay_per_hit_ns(), 500_000);

        let m = MethodId::new(3);
        assert!(slot.matches(&CallFrame::new(m, 5)));
        assert!(slot.matches(&CallFrame::new(m, 8)));
        assert!(!slot.matches(&CallFrame::new(m, 9)));
        assert!(slot.matches(&CallFrame::new(m, 14)));
        assert!(slot.matches(&CallFrame::new(m, 65535)));
        assert!(!slot.matches(&CallFrame::new(MethodId::new(4), 6)));
    }

    #[test]
    fn test_activation_flag() {
        let slot = ActiveExperiment::new();
        assert!(!slot.is_active());
        slot.load(&experiment());
        slot.activate();
        assert!(slot.is_active());
        slot.deactivate();
        assert!(!slot.is_active());
    }

    #[test]
    fn test_reload_shrinks_ranges() {
        let slot = ActiveExperiment::new();
        slot.load(&experiment());
        let table = LineTable::from_pairs(&[(0, 1), (4, 2)]);
        let exp = Experiment::new(
            CallFrame::new(MethodId::new(3), 0),
            table.locate(0).unwrap(),
        );
        assert_eq!(slot.load(&exp), 1);
        assert!(!slot.matches(&CallFrame::new(MethodId::new(3), 14)));
        assert!(slot.matches(&CallFrame::new(MethodId::new(3), 2)));
    }

    proptest! {
        #[test]
        fn prop_slot_agrees_with_experiment(
            starts in prop::collection::btree_set(0i32..200, 1..12),
            lines in prop::collection::vec(1i32..5, 12),
            pick in 0i32..220,
            probe in 0i32..260,
        ) {
            let pairs: Vec<(i32, i32)> = starts.iter().copied().zip(lines).collect();
            let table = LineTable::from_pairs(&pairs);
            let Some(selection) = table.locate(pick) else {
                return Ok(());
            };
            let exp = Experiment::new(CallFrame::new(MethodId::new(1), pick), selection);
            let slot = ActiveExperiment::new();
            slot.load(&exp);

            let frame = CallFrame::new(MethodId::new(1), probe);
            prop_assert_eq!(slot.matches(&frame), exp.contains(&frame));
        }
    }
}
