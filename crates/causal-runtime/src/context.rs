//! Profiler context shared by the scheduler, the sampler and the host hooks

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use causal_core::{CandidateBuffer, Host, InScopeMethods, SpinLock};

use crate::active::ActiveExperiment;
use crate::config::ProfilerConfig;
use crate::delay::DelayLedger;
use crate::line_hits::LineHits;
use crate::output::ResultSink;
use crate::progress::ProgressPointRegistry;
use crate::sampler::SamplerStats;
use crate::threads::ThreadRegistry;

/// Everything one profiler run shares across threads.
///
/// Sized once at construction; nothing reachable from the sampler grows
/// afterwards.
pub struct ProfilerContext {
    pub(crate) config: ProfilerConfig,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) sink: Arc<dyn ResultSink>,

    pub(crate) in_scope: InScopeMethods,
    pub(crate) candidates: CandidateBuffer,
    pub(crate) threads: ThreadRegistry,
    pub(crate) delay: DelayLedger,
    pub(crate) experiment: ActiveExperiment,
    pub(crate) progress: ProgressPointRegistry,
    pub(crate) line_hits: LineHits,
    pub(crate) stats: SamplerStats,

    /// Progress hits flushed from threads during the current experiment
    pub(crate) points_hit: AtomicU64,
    pub(crate) running: AtomicBool,
    /// Warm-up over; signals before this are dropped
    pub(crate) ready: AtomicBool,
    /// Scheduler thread has left its loop
    pub(crate) profile_done: AtomicBool,

    /// Serialises class-prepare callbacks
    pub(crate) class_prepare: SpinLock<()>,
}

impl ProfilerContext {
    pub fn new(config: ProfilerConfig, host: Arc<dyn Host>, sink: Arc<dyn ResultSink>) -> Self {
        let target = if config.end_to_end {
            None
        } else {
            config.progress_point.clone()
        };
        Self {
            candidates: CandidateBuffer::new(config.candidate_capacity),
            progress: ProgressPointRegistry::new(target),
            config,
            host,
            sink,
            in_scope: InScopeMethods::new(),
            threads: ThreadRegistry::new(),
            delay: DelayLedger::new(),
            experiment: ActiveExperiment::new(),
            line_hits: LineHits::new(),
            stats: SamplerStats::new(),
            points_hit: AtomicU64::new(0),
            running: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            profile_done: AtomicBool::new(false),
            class_prepare: SpinLock::new(()),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn points_hit(&self) -> u64 {
        self.points_hit.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }
}
