//! Host instrumentation substrate
//!
//! The profiler runs inside a managed runtime that owns the real stack
//! walker, class metadata and breakpoint machinery. [`Host`] is the seam:
//! the runtime crate calls into it, and the host calls back into the
//! profiler's lifecycle hooks (thread start/end, class prepare, breakpoint).

use core::ffi::c_void;

use crate::error::{CaptureError, HostError, ProfilerError};
use crate::frame::{CallFrame, MethodId};
use crate::line_table::LineTable;

/// Opaque handle of a managed (host-level) thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagedThread(pub usize);

/// Interrupted machine context handed to the signal handler
#[derive(Debug, Clone, Copy)]
pub struct SignalContext(*mut c_void);

impl SignalContext {
    pub const fn new(raw: *mut c_void) -> Self {
        SignalContext(raw)
    }

    pub const fn null() -> Self {
        SignalContext(core::ptr::null_mut())
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

/// A class known to the host, with its method ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedClass {
    /// Type signature, e.g. `Lcom/acme/Foo;`
    pub signature: String,
    pub methods: Vec<MethodId>,
}

pub trait Host: Send + Sync + 'static {
    /// Capture the call stack of the current (interrupted) thread into
    /// `frames`, top of stack first, returning how many were written.
    ///
    /// Runs inside the SIGPROF handler: it must be async-signal-safe and
    /// must not allocate.
    fn capture_frames(
        &self,
        context: SignalContext,
        frames: &mut [CallFrame],
    ) -> Result<usize, CaptureError>;

    /// Every class loaded so far.
    fn loaded_classes(&self) -> Result<Vec<LoadedClass>, HostError>;

    /// Line-number table of `method`, in host order.
    fn line_number_table(&self, method: MethodId) -> Result<LineTable, HostError>;

    /// Signature of the class declaring `method`.
    fn declaring_class_signature(&self, method: MethodId) -> Result<String, HostError>;

    fn set_breakpoint(&self, method: MethodId, offset: i32) -> Result<(), HostError>;

    fn clear_breakpoint(&self, method: MethodId, offset: i32) -> Result<(), HostError>;

    /// Whether `thread` belongs to the application's main thread group.
    /// `Err(HostError::WrongPhase)` is read as "not an application thread".
    fn is_application_thread(&self, thread: ManagedThread) -> Result<bool, HostError>;

    /// Terminate after a fatal error. No experiment can run without a valid
    /// configuration or progress signal.
    fn abort(&self, error: &ProfilerError) -> ! {
        crate::kerror!("{}. Exiting program.", error);
        crate::kprint::flush();
        std::process::exit(1)
    }
}
