//! Unix signal handling for SIGPROF sampling

use causal_core::error::{ProfilerError, ProfilerResult};
use nix::errno::Errno;
use nix::sys::pthread::{pthread_kill, Pthread};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// Raw `sa_sigaction` entry point
pub type SigprofAction = extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void);

/// Install `action` as the process-wide SIGPROF handler.
///
/// `SA_RESTART` keeps interrupted syscalls in the host program transparent;
/// `SA_SIGINFO` hands the interrupted context to the handler.
pub fn install_sigprof_handler(action: SigprofAction) -> ProfilerResult<()> {
    let sa = SigAction::new(
        SigHandler::SigAction(action),
        SaFlags::SA_RESTART | SaFlags::SA_SIGINFO,
        SigSet::empty(),
    );
    // SAFETY: the handler only touches atomics, thread-locals and
    // pre-allocated buffers.
    unsafe { sigaction(Signal::SIGPROF, &sa) }
        .map(|_| ())
        .map_err(|e| ProfilerError::SignalSetup(e as i32))
}

/// Restore SIGPROF to "ignore" so late deliveries are harmless.
pub fn ignore_sigprof() -> ProfilerResult<()> {
    let sa = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: SIG_IGN runs no code.
    unsafe { sigaction(Signal::SIGPROF, &sa) }
        .map(|_| ())
        .map_err(|e| ProfilerError::SignalSetup(e as i32))
}

/// Send SIGPROF to a native thread.
///
/// Returns `Ok(false)` when the thread has already exited.
pub fn send_sigprof(thread: u64) -> Result<bool, Errno> {
    match pthread_kill(thread as Pthread, Signal::SIGPROF) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Native id of the calling thread, as used by [`send_sigprof`]
#[inline]
pub fn current_native_thread() -> u64 {
    // SAFETY: pthread_self cannot fail.
    unsafe { libc::pthread_self() as usize as u64 }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        unsafe fn errno_location() -> *mut libc::c_int {
            libc::__errno_location()
        }
    } else if #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))] {
        unsafe fn errno_location() -> *mut libc::c_int {
            libc::__error()
        }
    } else {
        unsafe fn errno_location() -> *mut libc::c_int {
            libc::__errno()
        }
    }
}

/// Preserves the interrupted code's `errno` across a signal handler body.
pub struct ErrnoGuard(libc::c_int);

impl ErrnoGuard {
    #[inline]
    pub fn save() -> Self {
        // SAFETY: errno location is valid for the current thread.
        ErrnoGuard(unsafe { *errno_location() })
    }
}

impl Drop for ErrnoGuard {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: errno location is valid for the current thread.
        unsafe { *errno_location() = self.0 };
    }
}
