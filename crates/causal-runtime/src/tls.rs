//! Thread-local storage for the current thread's profiler record
//!
//! The slot holds one strong reference to the thread's [`UserThread`],
//! leaked into a raw pointer so the SIGPROF handler can read it without
//! touching a refcount. [`take_current`] turns it back into an `Arc`.

use std::cell::Cell;
use std::ptr;
use std::sync::Arc;

use crate::threads::UserThread;

thread_local! {
    /// Record of the current OS thread (null when untracked)
    static CURRENT_THREAD: Cell<*const UserThread> = const { Cell::new(ptr::null()) };
}

/// Install `thread` as the current thread's record, releasing any previous one.
pub fn set_current(thread: Arc<UserThread>) {
    let raw = Arc::into_raw(thread);
    let prev = CURRENT_THREAD.with(|cell| cell.replace(raw));
    if !prev.is_null() {
        // SAFETY: `prev` came from Arc::into_raw in an earlier call.
        drop(unsafe { Arc::from_raw(prev) });
    }
}

/// Remove and return the current thread's record.
pub fn take_current() -> Option<Arc<UserThread>> {
    let raw = CURRENT_THREAD
        .try_with(|cell| cell.replace(ptr::null()))
        .unwrap_or(ptr::null());
    if raw.is_null() {
        None
    } else {
        // SAFETY: the slot was nulled first, so no later reader sees `raw`.
        Some(unsafe { Arc::from_raw(raw) })
    }
}

/// Run `f` against the current thread's record.
///
/// Async-signal-safe: a const-initialised `Cell` needs no lazy init and
/// `try_with` cannot panic during thread teardown.
#[inline]
pub fn with_current<R>(f: impl FnOnce(&UserThread) -> R) -> Option<R> {
    let raw = CURRENT_THREAD.try_with(|cell| cell.get()).ok()?;
    if raw.is_null() {
        return None;
    }
    // SAFETY: the slot owns a strong reference until `take_current` nulls
    // it on this same thread.
    Some(f(unsafe { &*raw }))
}

/// Check if the current thread is tracked
#[inline]
pub fn has_current() -> bool {
    CURRENT_THREAD
        .try_with(|cell| !cell.get().is_null())
        .unwrap_or(false)
}
