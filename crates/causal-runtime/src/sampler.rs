//! SIGPROF sampler
//!
//! Runs inside the signal handler on an interrupted application thread.
//! Everything reachable from [`sample`] is allocation-free and lock-free
//! apart from the short owner-checked spinlocks; the one blocking call is
//! the reconciliation sleep, taken with no lock held.
//!
//! Two modes, decided by the active-experiment flag:
//! - warm-up: record the first in-scope frame as an experiment candidate,
//! - experiment: charge the per-hit delay when the thread is inside the
//!   selected line, reconcile every few signals, flush progress hits.

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use causal_core::constants::{MAX_FRAMES, SIGNALS_PER_RECONCILE};
use causal_core::{kdebug, CallFrame, CaptureError, PushOutcome, SignalContext};

use crate::context::ProfilerContext;
use crate::delay::Reconciliation;
use crate::signal::ErrnoGuard;
use crate::threads::UserThread;
use crate::tls;

// ============================================================================
// Statistics
// ============================================================================

/// Counters the handler bumps instead of logging
#[derive(Default)]
pub struct SamplerStats {
    signals: AtomicU64,
    dropped: AtomicU64,
    candidates_recorded: AtomicU64,
    candidates_overflowed: AtomicU64,
    in_range_hits: AtomicU64,
    reconciliations: AtomicU64,
    reconcile_sleeps: AtomicU64,
    reconcile_sleep_ns: AtomicU64,
}

/// Point-in-time copy of [`SamplerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerSnapshot {
    pub signals: u64,
    pub dropped: u64,
    pub candidates_recorded: u64,
    pub candidates_overflowed: u64,
    pub in_range_hits: u64,
    pub reconciliations: u64,
    pub reconcile_sleeps: u64,
    pub reconcile_sleep_ns: u64,
}

impl SamplerStats {
    pub const fn new() -> Self {
        Self {
            signals: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            candidates_recorded: AtomicU64::new(0),
            candidates_overflowed: AtomicU64::new(0),
            in_range_hits: AtomicU64::new(0),
            reconciliations: AtomicU64::new(0),
            reconcile_sleeps: AtomicU64::new(0),
            reconcile_sleep_ns: AtomicU64::new(0),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SamplerSnapshot {
        SamplerSnapshot {
            signals: self.signals.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            candidates_recorded: self.candidates_recorded.load(Ordering::Relaxed),
            candidates_overflowed: self.candidates_overflowed.load(Ordering::Relaxed),
            in_range_hits: self.in_range_hits.load(Ordering::Relaxed),
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
            reconcile_sleeps: self.reconcile_sleeps.load(Ordering::Relaxed),
            reconcile_sleep_ns: self.reconcile_sleep_ns.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for SamplerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signals={} dropped={} candidates={} overflowed={} in_range={} reconciles={} sleeps={} ({}ns)",
            self.signals,
            self.dropped,
            self.candidates_recorded,
            self.candidates_overflowed,
            self.in_range_hits,
            self.reconciliations,
            self.reconcile_sleeps,
            self.reconcile_sleep_ns
        )
    }
}

// ============================================================================
// Process-wide handler binding
// ============================================================================

/// Context the installed handler samples into (null when none)
static ACTIVE: AtomicPtr<ProfilerContext> = AtomicPtr::new(ptr::null_mut());

/// Handlers currently between loading `ACTIVE` and returning
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

/// Bind the handler to `ctx`. Fails if another context is bound.
pub(crate) fn bind(ctx: &ProfilerContext) -> bool {
    let raw = ctx as *const ProfilerContext as *mut ProfilerContext;
    ACTIVE
        .compare_exchange(ptr::null_mut(), raw, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Unbind `ctx` and wait for handlers still using it to return.
pub(crate) fn unbind(ctx: &ProfilerContext) {
    let raw = ctx as *const ProfilerContext as *mut ProfilerContext;
    if ACTIVE
        .compare_exchange(raw, ptr::null_mut(), Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }
    let mut spins = 0u32;
    while IN_FLIGHT.load(Ordering::SeqCst) != 0 {
        spins = spins.wrapping_add(1);
        if spins % 64 == 0 {
            std::thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }
}

/// `sa_sigaction` entry point for SIGPROF
pub(crate) extern "C" fn sigprof_handler(
    _signum: libc::c_int,
    _info: *mut libc::siginfo_t,
    ucontext: *mut libc::c_void,
) {
    let _errno = ErrnoGuard::save();
    IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
    let raw = ACTIVE.load(Ordering::SeqCst);
    if !raw.is_null() {
        // SAFETY: `unbind` waits for IN_FLIGHT to drain before the context
        // can be dropped.
        let ctx = unsafe { &*raw };
        sample(ctx, SignalContext::new(ucontext));
    }
    IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
}

// ============================================================================
// Sampling
// ============================================================================

/// Handle one SIGPROF on the current thread.
pub fn sample(ctx: &ProfilerContext, signal_ctx: SignalContext) {
    ctx.stats.signals.fetch_add(1, Ordering::Relaxed);
    if !ctx.is_ready() {
        SamplerStats::bump(&ctx.stats.dropped);
        return;
    }
    if tls::with_current(|thread| sample_thread(ctx, thread, signal_ctx)).is_none() {
        SamplerStats::bump(&ctx.stats.dropped);
    }
}

/// Sampling body for a tracked thread.
pub fn sample_thread(ctx: &ProfilerContext, thread: &UserThread, signal_ctx: SignalContext) {
    let mut frames = [CallFrame::EMPTY; MAX_FRAMES];
    let captured = match ctx.host.capture_frames(signal_ctx, &mut frames) {
        Ok(n) => n.min(MAX_FRAMES),
        Err(CaptureError::Unavailable) => {
            SamplerStats::bump(&ctx.stats.dropped);
            return;
        }
        Err(CaptureError::NotWalkable(_)) => 0,
    };
    let frames = &frames[..captured];

    if ctx.experiment.is_active() {
        sample_experiment(ctx, thread, frames);
    } else {
        sample_warmup(ctx, thread, frames);
    }
}

fn sample_warmup(ctx: &ProfilerContext, thread: &UserThread, frames: &[CallFrame]) {
    thread.set_local_delay(0);
    let Some(frame) = ctx.in_scope.first_match(frames) else {
        return;
    };
    let counter = match ctx.candidates.push(frame) {
        PushOutcome::Recorded => &ctx.stats.candidates_recorded,
        PushOutcome::Overflowed => &ctx.stats.candidates_overflowed,
        PushOutcome::Reentered => &ctx.stats.dropped,
    };
    SamplerStats::bump(counter);
}

fn sample_experiment(ctx: &ProfilerContext, thread: &UserThread, frames: &[CallFrame]) {
    let signals = thread.record_signal();
    if frames.iter().any(|f| ctx.experiment.matches(f)) {
        thread.add_local_delay(ctx.experiment.delay_per_hit_ns());
        SamplerStats::bump(&ctx.stats.in_range_hits);
    }

    if signals >= SIGNALS_PER_RECONCILE {
        if let Reconciliation::Slept(ns) = ctx.delay.reconcile(thread) {
            SamplerStats::bump(&ctx.stats.reconcile_sleeps);
            ctx.stats
                .reconcile_sleep_ns
                .fetch_add(ns.max(0) as u64, Ordering::Relaxed);
        }
        thread.reset_signals();
        SamplerStats::bump(&ctx.stats.reconciliations);
    }

    let hits = thread.take_points_hit();
    if hits > 0 {
        ctx.points_hit.fetch_add(hits, Ordering::AcqRel);
    }
}

/// Log sampler counters at debug level.
pub(crate) fn log_stats(ctx: &ProfilerContext, label: &str) {
    kdebug!("{} sampler stats: {}", label, ctx.stats.snapshot());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfilerConfig;
    use crate::mock::MockHost;
    use crate::output::MemorySink;
    use causal_core::{Experiment, LineTable, ManagedThread, MethodId};
    use std::sync::Arc;
    use std::time::Duration;

    const HOT: MethodId = MethodId::new(7);
    const COLD: MethodId = MethodId::new(8);

    fn context(host: Arc<MockHost>) -> ProfilerContext {
        let config = ProfilerConfig::new()
            .search_scope("com.acme")
            .end_to_end(true)
            .candidate_capacity(4);
        let ctx = ProfilerContext::new(config, host, Arc::new(MemorySink::new()));
        ctx.in_scope.register(&[HOT, COLD]);
        ctx.ready.store(true, Ordering::Release);
        ctx
    }

    fn load_experiment(ctx: &ProfilerContext, speedup: f32) {
        let table = LineTable::from_pairs(&[(0, 10), (5, 11), (9, 12)]);
        let mut exp = Experiment::new(CallFrame::new(HOT, 6), table.locate(6).unwrap());
        exp.set_speedup(speedup, Duration::from_micros(100));
        ctx.experiment.load(&exp);
        ctx.experiment.activate();
    }

    #[test]
    fn test_not_ready_drops() {
        let host = Arc::new(MockHost::new());
        let ctx = context(Arc::clone(&host));
        ctx.ready.store(false, Ordering::Release);
        host.set_frames(&[CallFrame::new(HOT, 1)]);
        let thread = Arc::new(UserThread::new(1, ManagedThread(1), 0));
        tls::set_current(Arc::clone(&thread));

        sample(&ctx, SignalContext::null());
        assert!(ctx.candidates.is_empty());
        assert_eq!(ctx.stats.snapshot().dropped, 1);
        drop(tls::take_current());
    }

    #[test]
    fn test_untracked_thread_drops() {
        let host = Arc::new(MockHost::new());
        let ctx = context(Arc::clone(&host));
        host.set_frames(&[CallFrame::new(HOT, 1)]);
        sample(&ctx, SignalContext::null());
        assert!(ctx.candidates.is_empty());
        assert_eq!(ctx.stats.snapshot().dropped, 1);
    }

    #[test]
    fn test_warmup_records_first_in_scope_frame() {
        let host = Arc::new(MockHost::new());
        let ctx = context(Arc::clone(&host));
        let thread = UserThread::new(1, ManagedThread(1), 900);
        host.set_frames(&[
            CallFrame::new(MethodId::new(99), 3),
            CallFrame::new(COLD, 4),
            CallFrame::new(HOT, 5),
        ]);

        sample_thread(&ctx, &thread, SignalContext::null());
        assert_eq!(ctx.candidates.drain(), vec![CallFrame::new(COLD, 4)]);
        assert_eq!(thread.local_delay(), 0);
        assert_eq!(ctx.stats.snapshot().candidates_recorded, 1);
    }

    #[test]
    fn test_warmup_overflow_is_counted() {
        let host = Arc::new(MockHost::new());
        let ctx = context(Arc::clone(&host));
        let thread = UserThread::new(1, ManagedThread(1), 0);
        host.set_frames(&[CallFrame::new(HOT, 1)]);
        for _ in 0..6 {
            sample_thread(&ctx, &thread, SignalContext::null());
        }
        assert_eq!(ctx.candidates.len(), 4);
        assert_eq!(ctx.stats.snapshot().candidates_overflowed, 2);
    }

    #[test]
    fn test_capture_errors() {
        let host = Arc::new(MockHost::new());
        let ctx = context(Arc::clone(&host));
        let thread = UserThread::new(1, ManagedThread(1), 0);
        host.set_frames(&[CallFrame::new(HOT, 1)]);

        host.fail_capture(Some(CaptureError::Unavailable));
        sample_thread(&ctx, &thread, SignalContext::null());
        assert_eq!(ctx.stats.snapshot().dropped, 1);

        host.fail_capture(Some(CaptureError::NotWalkable(-2)));
        load_experiment(&ctx, 1.0);
        sample_thread(&ctx, &thread, SignalContext::null());
        // Counted as a signal with no frames.
        assert_eq!(thread.signals_received(), 1);
        assert_eq!(thread.local_delay(), 0);
        assert!(ctx.candidates.is_empty());
    }

    #[test]
    fn test_experiment_charges_in_range_frames() {
        let host = Arc::new(MockHost::new());
        let ctx = context(Arc::clone(&host));
        load_experiment(&ctx, 0.5);
        let thread = UserThread::new(1, ManagedThread(1), 0);

        host.set_frames(&[CallFrame::new(COLD, 6), CallFrame::new(HOT, 7)]);
        sample_thread(&ctx, &thread, SignalContext::null());
        assert_eq!(thread.local_delay(), 50_000);

        host.set_frames(&[CallFrame::new(HOT, 9)]);
        sample_thread(&ctx, &thread, SignalContext::null());
        assert_eq!(thread.local_delay(), 50_000);
        assert_eq!(thread.signals_received(), 2);
        assert!(ctx.candidates.is_empty());
    }

    #[test]
    fn test_reconcile_every_tenth_signal() {
        let host = Arc::new(MockHost::new());
        let ctx = context(Arc::clone(&host));
        load_experiment(&ctx, 1.0);
        let thread = UserThread::new(1, ManagedThread(1), 0);
        host.set_frames(&[CallFrame::new(HOT, 6)]);

        for _ in 0..SIGNALS_PER_RECONCILE - 1 {
            sample_thread(&ctx, &thread, SignalContext::null());
        }
        assert_eq!(ctx.delay.snapshot(), 0);

        sample_thread(&ctx, &thread, SignalContext::null());
        // Ten in-range hits at 100us each, donated as surplus.
        assert_eq!(ctx.delay.snapshot(), 1_000_000);
        assert_eq!(thread.signals_received(), 0);
        assert_eq!(ctx.stats.snapshot().reconciliations, 1);
    }

    #[test]
    fn test_hits_flushed_on_experiment_signal() {
        let host = Arc::new(MockHost::new());
        let ctx = context(Arc::clone(&host));
        load_experiment(&ctx, 0.0);
        let thread = UserThread::new(1, ManagedThread(1), 0);
        thread.add_points_hit(3);

        sample_thread(&ctx, &thread, SignalContext::null());
        assert_eq!(ctx.points_hit(), 3);
        assert_eq!(thread.take_points_hit(), 0);
    }
}
