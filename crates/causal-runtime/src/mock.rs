//! Scripted host for tests

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use causal_core::error::{CaptureError, HostError, ProfilerError};
use causal_core::{CallFrame, Host, LineTable, LoadedClass, ManagedThread, MethodId, SignalContext, SpinLock};

/// Serialises tests that install or rely on the process-wide SIGPROF handler.
pub(crate) fn sigprof_test_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct MethodInfo {
    signature: Option<String>,
    table: Option<LineTable>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Serves the same frames to every capture; records breakpoint traffic.
#[derive(Default)]
pub(crate) struct MockHost {
    frames: SpinLock<Vec<CallFrame>>,
    capture_error: SpinLock<Option<CaptureError>>,
    methods: Mutex<HashMap<MethodId, MethodInfo>>,
    classes: Mutex<Vec<LoadedClass>>,
    internal_threads: Mutex<HashSet<ManagedThread>>,
    breakpoints_set: Mutex<Vec<(MethodId, i32)>>,
    breakpoints_cleared: Mutex<Vec<(MethodId, i32)>>,
    aborted: Mutex<Option<ProfilerError>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loaded method with a declaring class and a line table.
    pub fn with_method(self, method: MethodId, signature: &str, table: LineTable) -> Self {
        lock(&self.methods).insert(
            method,
            MethodInfo {
                signature: Some(signature.to_string()),
                table: Some(table),
            },
        );
        {
            let mut classes = lock(&self.classes);
            match classes.iter_mut().find(|c| c.signature == signature) {
                Some(class) => class.methods.push(method),
                None => classes.push(LoadedClass {
                    signature: signature.to_string(),
                    methods: vec![method],
                }),
            }
        }
        self
    }

    /// A method whose declaring class cannot be looked up.
    pub fn with_table_only(self, method: MethodId, table: LineTable) -> Self {
        lock(&self.methods).insert(
            method,
            MethodInfo {
                signature: None,
                table: Some(table),
            },
        );
        self
    }

    pub fn with_internal_thread(self, thread: ManagedThread) -> Self {
        lock(&self.internal_threads).insert(thread);
        self
    }

    pub fn set_frames(&self, frames: &[CallFrame]) {
        let mut current = self.frames.lock();
        current.clear();
        current.extend_from_slice(frames);
    }

    pub fn fail_capture(&self, error: Option<CaptureError>) {
        *self.capture_error.lock() = error;
    }

    pub fn breakpoints_set(&self) -> Vec<(MethodId, i32)> {
        lock(&self.breakpoints_set).clone()
    }

    pub fn breakpoints_cleared(&self) -> Vec<(MethodId, i32)> {
        lock(&self.breakpoints_cleared).clone()
    }

    pub fn aborted(&self) -> Option<ProfilerError> {
        lock(&self.aborted).clone()
    }
}

impl Host for MockHost {
    fn capture_frames(
        &self,
        _context: SignalContext,
        out: &mut [CallFrame],
    ) -> Result<usize, CaptureError> {
        if let Some(error) = *self
            .capture_error
            .lock_unless_owned()
            .ok_or(CaptureError::Unavailable)?
        {
            return Err(error);
        }
        let frames = self
            .frames
            .lock_unless_owned()
            .ok_or(CaptureError::Unavailable)?;
        let n = frames.len().min(out.len());
        out[..n].copy_from_slice(&frames[..n]);
        Ok(n)
    }

    fn loaded_classes(&self) -> Result<Vec<LoadedClass>, HostError> {
        Ok(lock(&self.classes).clone())
    }

    fn line_number_table(&self, method: MethodId) -> Result<LineTable, HostError> {
        let methods = lock(&self.methods);
        let info = methods.get(&method).ok_or(HostError::InvalidMethod)?;
        info.table.clone().ok_or(HostError::Absent)
    }

    fn declaring_class_signature(&self, method: MethodId) -> Result<String, HostError> {
        let methods = lock(&self.methods);
        let info = methods.get(&method).ok_or(HostError::InvalidMethod)?;
        info.signature.clone().ok_or(HostError::Absent)
    }

    fn set_breakpoint(&self, method: MethodId, offset: i32) -> Result<(), HostError> {
        lock(&self.breakpoints_set).push((method, offset));
        Ok(())
    }

    fn clear_breakpoint(&self, method: MethodId, offset: i32) -> Result<(), HostError> {
        lock(&self.breakpoints_cleared).push((method, offset));
        Ok(())
    }

    fn is_application_thread(&self, thread: ManagedThread) -> Result<bool, HostError> {
        Ok(!lock(&self.internal_threads).contains(&thread))
    }

    fn abort(&self, error: &ProfilerError) -> ! {
        *lock(&self.aborted) = Some(error.clone());
        panic!("profiler aborted: {}", error);
    }
}
