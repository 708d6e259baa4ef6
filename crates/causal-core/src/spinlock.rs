//! Owner-tracking spinlock for profiler-internal shared state
//!
//! Every shared structure the sampler touches from signal context (in-scope
//! method set, candidate buffer, thread registry) sits behind this lock.
//! Blocking mutexes are unusable there: the holder may be the very thread
//! the signal interrupted.
//!
//! The lock word stores the owning thread's `pthread_t` instead of a bool,
//! so code that may run nested inside an interrupted critical section can
//! ask [`SpinLock::lock_unless_owned`] and back out instead of spinning
//! against itself forever.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU64, Ordering};

/// Lock word value meaning "nobody holds the lock".
const UNLOCKED: u64 = 0;

/// Identity of the calling thread as stored in the lock word.
///
/// `pthread_self` is async-signal-safe and never returns 0 for a live
/// thread, so 0 can serve as the unlocked marker.
#[inline]
pub fn current_owner_id() -> u64 {
    // Safety: pthread_self has no preconditions.
    unsafe { libc::pthread_self() as usize as u64 }
}

/// A spinlock that remembers which thread holds it.
pub struct SpinLock<T> {
    owner: AtomicU64,
    data: UnsafeCell<T>,
}

// Safety: SpinLock provides exclusive access to T
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create a new spinlock containing the given value
    #[inline]
    pub const fn new(value: T) -> Self {
        SpinLock {
            owner: AtomicU64::new(UNLOCKED),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, spinning until it's available.
    ///
    /// Must not be called by a thread that already holds the lock; code
    /// reachable from a signal handler uses [`lock_unless_owned`] instead.
    ///
    /// [`lock_unless_owned`]: SpinLock::lock_unless_owned
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let me = current_owner_id();
        debug_assert_ne!(
            self.owner.load(Ordering::Relaxed),
            me,
            "spinlock re-acquired by its owner"
        );
        self.acquire_as(me)
    }

    /// Acquire the lock unless the calling thread already holds it.
    ///
    /// Returns `None` when the caller interrupted its own critical section
    /// (a signal delivered while the lock was held). The caller must then
    /// skip whatever it wanted to do with the protected data.
    #[inline]
    pub fn lock_unless_owned(&self) -> Option<SpinLockGuard<'_, T>> {
        let me = current_owner_id();
        // Only this thread can have stored `me`, so a relaxed load is enough
        // to observe our own write.
        if self.owner.load(Ordering::Relaxed) == me {
            return None;
        }
        Some(self.acquire_as(me))
    }

    /// Try to acquire the lock without spinning
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let me = current_owner_id();
        self.owner
            .compare_exchange(UNLOCKED, me, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }

    /// Whether the calling thread currently holds the lock.
    #[inline]
    pub fn is_held_by_current(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == current_owner_id()
    }

    /// Check if the lock is currently held by anyone
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Relaxed) != UNLOCKED
    }

    #[inline]
    fn acquire_as(&self, me: u64) -> SpinLockGuard<'_, T> {
        loop {
            if self
                .owner
                .compare_exchange_weak(UNLOCKED, me, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinLockGuard { lock: self };
            }

            let mut spin_count = 0u32;
            while self.owner.load(Ordering::Relaxed) != UNLOCKED {
                spin_count = spin_count.wrapping_add(1);
                for _ in 0..spin_count.min(64) {
                    core::hint::spin_loop();
                }
            }
        }
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        SpinLock::new(T::default())
    }
}

/// Guard that releases the spinlock when dropped
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: We hold the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: We hold the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.owner.store(UNLOCKED, Ordering::Release);
    }
}
