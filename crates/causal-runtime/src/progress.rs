//! Progress point registry
//!
//! Exactly one code location counts as progress. It is resolved the first
//! time a matching class offers a method whose line table has the target
//! line, armed with a host breakpoint, and never re-resolved afterwards.
//! Hits only count while an experiment is active.

use std::sync::atomic::{AtomicU64, Ordering};

use causal_core::scope::internal_class_name;
use causal_core::{kdebug, kinfo, kwarn};
use causal_core::{CallFrame, Host, HostError, MethodId, SpinLock};

use crate::config::ProgressPointSpec;
use crate::tls;

#[derive(Debug, Default)]
struct ProgressState {
    location: Option<CallFrame>,
    armed: bool,
}

pub struct ProgressPointRegistry {
    /// `None` in end-to-end mode
    target: Option<ProgressPointSpec>,
    state: SpinLock<ProgressState>,
    /// Every breakpoint trap, attributable or not
    traps: AtomicU64,
}

impl ProgressPointRegistry {
    pub fn new(target: Option<ProgressPointSpec>) -> Self {
        Self {
            target,
            state: SpinLock::new(ProgressState::default()),
            traps: AtomicU64::new(0),
        }
    }

    pub fn target(&self) -> Option<&ProgressPointSpec> {
        self.target.as_ref()
    }

    /// Whether a class (signature or plain name) is the progress class.
    pub fn matches_class(&self, signature: &str) -> bool {
        self.target
            .as_ref()
            .map_or(false, |t| internal_class_name(signature) == t.class.as_str())
    }

    /// Try to arm the progress point in one of `methods`.
    ///
    /// The first line-table entry carrying the target line wins. Methods
    /// without a line table are skipped. Returns `Ok(true)` only on the call
    /// that armed the breakpoint; every later call is a no-op.
    pub fn try_resolve(&self, host: &dyn Host, methods: &[MethodId]) -> Result<bool, HostError> {
        let Some(target) = self.target.as_ref() else {
            return Ok(false);
        };
        let mut state = self.state.lock();
        if state.location.is_some() {
            kdebug!("Progress point already set");
            return Ok(false);
        }

        for &method in methods {
            let table = match host.line_number_table(method) {
                Ok(table) => table,
                Err(e) => {
                    kdebug!("No line table for {:?} while placing progress point: {}", method, e);
                    continue;
                }
            };
            if let Some(offset) = table.first_offset_of_line(target.line) {
                host.set_breakpoint(method, offset)?;
                state.location = Some(CallFrame::new(method, offset));
                state.armed = true;
                kinfo!("Progress point set at {}:{}", target.class, target.line);
                return Ok(true);
            }
        }

        kwarn!(
            "Class {} has no line {} - progress point not set",
            target.class,
            target.line
        );
        Ok(false)
    }

    pub fn is_resolved(&self) -> bool {
        self.state.lock().location.is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    /// Resolved method and offset
    pub fn location(&self) -> Option<CallFrame> {
        self.state.lock().location
    }

    /// Remove the breakpoint. Only the first call after arming does anything.
    pub fn disarm(&self, host: &dyn Host) -> bool {
        let mut state = self.state.lock();
        if !state.armed {
            return false;
        }
        state.armed = false;
        if let Some(loc) = state.location {
            if let Err(e) = host.clear_breakpoint(loc.method, loc.offset) {
                kwarn!("Failed to clear progress point breakpoint: {}", e);
            }
        }
        true
    }

    /// Breakpoint trap on the calling thread.
    ///
    /// Credits the thread one hit while an experiment runs; traps outside
    /// an experiment, or on untracked threads, are dropped.
    pub fn on_hit(&self, in_experiment: bool) {
        self.traps.fetch_add(1, Ordering::Relaxed);
        tls::with_current(|thread| thread.add_points_hit(in_experiment as u64));
    }

    pub fn traps(&self) -> u64 {
        self.traps.load(Ordering::Relaxed)
    }
}
