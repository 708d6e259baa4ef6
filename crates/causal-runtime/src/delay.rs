//! Global delay ledger
//!
//! The global counter approximates the delay every thread owes; each
//! [`UserThread`] tracks the delay it has already paid. Reconciliation
//! either sleeps the shortfall or donates the surplus, so threads outside
//! the selected line fall behind by exactly what that line would have
//! saved. Reads and writes of the two counters are not paired atomically.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::threads::UserThread;
use crate::timer;

/// Outcome of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Thread was behind and slept this many nanoseconds
    Slept(i64),
    /// Thread was ahead (or even) and raised the global delay by this much
    Donated(i64),
}

pub struct DelayLedger {
    global: AtomicI64,
}

impl DelayLedger {
    pub const fn new() -> Self {
        Self {
            global: AtomicI64::new(0),
        }
    }

    /// Current global delay, nanoseconds
    #[inline]
    pub fn snapshot(&self) -> i64 {
        self.global.load(Ordering::Acquire)
    }

    #[inline]
    pub fn donate(&self, ns: i64) {
        self.global.fetch_add(ns, Ordering::AcqRel);
    }

    /// Read the global delay and reset it to zero.
    pub fn take(&self) -> i64 {
        self.global.swap(0, Ordering::AcqRel)
    }

    pub fn reset(&self) {
        self.global.store(0, Ordering::Release);
    }

    /// Bring `thread` level with the global delay.
    ///
    /// May sleep; never call with a spinlock held.
    pub fn reconcile(&self, thread: &UserThread) -> Reconciliation {
        let shortfall = self.snapshot() - thread.local_delay();
        if shortfall > 0 {
            let slept = timer::sleep_ns(shortfall);
            thread.add_local_delay(slept);
            Reconciliation::Slept(slept)
        } else {
            let surplus = shortfall.abs();
            self.donate(surplus);
            Reconciliation::Donated(surplus)
        }
    }

    /// Settle an exiting thread: sleep any shortfall, donate any surplus.
    /// The record is about to be dropped, so the slept time is not credited.
    pub fn settle_exit(&self, thread: &UserThread) -> Reconciliation {
        let shortfall = self.snapshot() - thread.local_delay();
        if shortfall > 0 {
            Reconciliation::Slept(timer::sleep_ns(shortfall))
        } else {
            let surplus = shortfall.abs();
            self.donate(surplus);
            Reconciliation::Donated(surplus)
        }
    }
}

impl Default for DelayLedger {
    fn default() -> Self {
        Self::new()
    }
}
