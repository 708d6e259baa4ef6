//! Application threads eligible for sampling
//!
//! Each tracked thread owns a [`UserThread`] record: the registry holds one
//! reference (for signal delivery), the thread's TLS slot the other (for
//! the sampler and breakpoint hook).

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use causal_core::{kdebug, ManagedThread, SpinLock};

use crate::signal;

/// Per-thread delay and hit bookkeeping
#[derive(Debug)]
pub struct UserThread {
    native: u64,
    managed: ManagedThread,
    /// Delay this thread has paid or been credited, nanoseconds
    local_delay: AtomicI64,
    /// Progress hits not yet flushed to the global counter
    points_hit: AtomicU64,
    /// Experiment-mode signals since the last reconciliation
    signals_received: AtomicU32,
}

impl UserThread {
    pub fn new(native: u64, managed: ManagedThread, initial_delay: i64) -> Self {
        Self {
            native,
            managed,
            local_delay: AtomicI64::new(initial_delay),
            points_hit: AtomicU64::new(0),
            signals_received: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn native(&self) -> u64 {
        self.native
    }

    #[inline]
    pub fn managed(&self) -> ManagedThread {
        self.managed
    }

    #[inline]
    pub fn local_delay(&self) -> i64 {
        self.local_delay.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn add_local_delay(&self, ns: i64) {
        self.local_delay.fetch_add(ns, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_local_delay(&self, ns: i64) {
        self.local_delay.store(ns, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_points_hit(&self, n: u64) {
        self.points_hit.fetch_add(n, Ordering::Relaxed);
    }

    /// Take the unflushed hit count, leaving zero behind.
    #[inline]
    pub fn take_points_hit(&self) -> u64 {
        self.points_hit.swap(0, Ordering::Relaxed)
    }

    /// Count one experiment-mode signal; returns the count so far.
    #[inline]
    pub fn record_signal(&self) -> u32 {
        self.signals_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn reset_signals(&self) {
        self.signals_received.store(0, Ordering::Relaxed);
    }

    pub fn signals_received(&self) -> u32 {
        self.signals_received.load(Ordering::Relaxed)
    }
}

/// Live application threads, guarded by a spinlock
pub struct ThreadRegistry {
    threads: SpinLock<Vec<Arc<UserThread>>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            threads: SpinLock::new(Vec::with_capacity(64)),
        }
    }

    pub fn register(&self, thread: Arc<UserThread>) {
        self.threads.lock().push(thread);
    }

    /// Remove a specific record. Returns false if it was not registered.
    pub fn unregister(&self, thread: &UserThread) -> bool {
        let mut threads = self.threads.lock();
        match threads.iter().position(|t| ptr_eq(t, thread)) {
            Some(idx) => {
                threads.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Remove whatever record belongs to a native thread id.
    pub fn unregister_native(&self, native: u64) -> Option<Arc<UserThread>> {
        let mut threads = self.threads.lock();
        let idx = threads.iter().position(|t| t.native() == native)?;
        Some(threads.swap_remove(idx))
    }

    /// Deliver SIGPROF to every registered thread.
    ///
    /// Threads that exited since registering are skipped silently.
    /// Returns how many signals were delivered.
    pub fn signal_all(&self) -> usize {
        let mut delivered = 0;
        let mut failed = 0;
        {
            let threads = self.threads.lock();
            for thread in threads.iter() {
                match signal::send_sigprof(thread.native()) {
                    Ok(true) => delivered += 1,
                    Ok(false) => {}
                    Err(_) => failed += 1,
                }
            }
        }
        if failed > 0 {
            kdebug!("SIGPROF delivery failed for {} threads", failed);
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.threads.lock().clear();
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn ptr_eq(a: &Arc<UserThread>, b: &UserThread) -> bool {
    std::ptr::eq(Arc::as_ptr(a), b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_thread_counters() {
        let t = UserThread::new(1, ManagedThread(1), 250);
        assert_eq!(t.local_delay(), 250);
        t.add_local_delay(50);
        assert_eq!(t.local_delay(), 300);
        t.set_local_delay(0);
        assert_eq!(t.local_delay(), 0);

        t.add_points_hit(3);
        assert_eq!(t.take_points_hit(), 3);
        assert_eq!(t.take_points_hit(), 0);

        assert_eq!(t.record_signal(), 1);
        assert_eq!(t.record_signal(), 2);
        t.reset_signals();
        assert_eq!(t.signals_received(), 0);
    }

    #[test]
    fn test_register_unregister() {
        let registry = ThreadRegistry::new();
        let a = Arc::new(UserThread::new(10, ManagedThread(1), 0));
        let b = Arc::new(UserThread::new(20, ManagedThread(2), 0));
        registry.register(Arc::clone(&a));
        registry.register(Arc::clone(&b));
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(&a));
        assert!(!registry.unregister(&a));
        assert_eq!(registry.len(), 1);

        let removed = registry.unregister_native(20).unwrap();
        assert!(Arc::ptr_eq(&removed, &b));
        assert!(registry.is_empty());
        assert!(registry.unregister_native(20).is_none());
    }

    #[test]
    fn test_signal_all_empty() {
        let registry = ThreadRegistry::new();
        assert_eq!(registry.signal_all(), 0);
    }
}
