//! Experiment scheduler thread
//!
//! One dedicated OS thread drives the experiment loop:
//!
//! ```text
//!   SAMPLING ──► dedup ──► SELECT_LINE ──► RUNNING ──► RECORDING ─┐
//!      ▲                       │ (nothing resolvable)             │
//!      └───────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Clearing the running flag ends the loop; an experiment in flight at that
//! point is abandoned without a record.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use causal_core::error::{ProfilerError, ProfilerResult};
use causal_core::{
    calculate_random_speedup, clean_signature, dedup_frames, CallFrame, Experiment,
    ExperimentLength, ExperimentRecord,
};
use causal_core::{kdebug, kinfo, ktrace, kwarn};

use crate::context::ProfilerContext;
use crate::sampler;
use crate::signal;
use crate::timer::{self, duration_ns};
use crate::tls;

/// How one experiment ended
#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentOutcome {
    /// Completed and persisted
    Recorded(ExperimentRecord),
    /// Profiler stopped while it ran
    Aborted,
    /// Completed but its class could not be resolved
    Discarded,
}

pub struct Scheduler {
    ctx: Arc<ProfilerContext>,
    rng: StdRng,
    length: ExperimentLength,
}

impl Scheduler {
    pub fn new(ctx: Arc<ProfilerContext>) -> Self {
        Self::with_rng(ctx, StdRng::from_entropy())
    }

    pub fn with_rng(ctx: Arc<ProfilerContext>, rng: StdRng) -> Self {
        let length = ctx.config.experiment_length();
        Self { ctx, rng, length }
    }

    /// Length the next experiment will run for
    pub fn experiment_length(&self) -> Duration {
        self.length.current()
    }

    /// Scheduler thread body.
    ///
    /// Returns an error only for conditions under which no experiment can
    /// ever produce a result.
    pub fn run(&mut self) -> ProfilerResult<()> {
        self.deregister_self();
        self.ctx.delay.reset();

        if !self.ctx.config.warmup.is_zero() {
            kdebug!("Warming up for {:?}", self.ctx.config.warmup);
            timer::sleep(self.ctx.config.warmup);
        }
        self.ctx.ready.store(true, Ordering::Release);
        self.check_progress_point()?;

        while self.ctx.is_running() {
            kdebug!("Starting new sampling round");
            let frames = self.sample_round();
            if frames.is_empty() {
                kdebug!("No frames found - sampling again");
                continue;
            }

            ktrace!("Found {} call frames", frames.len());
            let frames = dedup_frames(frames, &mut self.rng);
            ktrace!("Found {} unique call frames", frames.len());

            let Some(experiment) = self.select_line(&frames) else {
                kinfo!("No in scope frames found. Clearing call frames and then trying again.");
                continue;
            };

            let outcome = self.run_experiment(experiment);
            self.ctx.candidates.clear();
            sampler::log_stats(&self.ctx, "experiment");
            if outcome == ExperimentOutcome::Aborted {
                break;
            }
        }

        kinfo!("Profiler done running");
        Ok(())
    }

    /// The scheduler thread is never sampled.
    fn deregister_self(&self) {
        if let Some(record) = tls::take_current() {
            self.ctx.threads.unregister(&record);
        }
        self.ctx
            .threads
            .unregister_native(signal::current_native_thread());
    }

    fn check_progress_point(&self) -> ProfilerResult<()> {
        if self.ctx.config.end_to_end || self.ctx.progress.is_resolved() {
            return Ok(());
        }
        let (class, line) = self
            .ctx
            .progress
            .target()
            .map(|t| (t.class.clone(), t.line))
            .unwrap_or_default();
        Err(ProfilerError::ProgressPointUnresolved { class, line })
    }

    /// Signal every thread at randomised intervals for about
    /// `sampling_rounds` base intervals, then take the candidates.
    pub fn sample_round(&mut self) -> Vec<CallFrame> {
        let base = self.ctx.config.signal_interval;
        let needed = base
            .checked_mul(self.ctx.config.sampling_rounds)
            .unwrap_or(Duration::MAX);
        let mut accrued = Duration::ZERO;

        while accrued < needed && self.ctx.is_running() {
            let nap = timer::randomized_round(base, &mut self.rng);
            timer::sleep(nap);
            self.ctx.threads.signal_all();
            accrued = accrued.saturating_add(nap);
            ktrace!("Slept for {:?}. {:?} remaining.", nap, needed.saturating_sub(accrued));
        }

        self.ctx.candidates.drain()
    }

    /// First candidate whose method has a usable line table, as an
    /// experiment on the source line owning the sampled offset.
    pub fn select_line(&self, frames: &[CallFrame]) -> Option<Experiment> {
        frames.iter().find_map(|frame| {
            match self.ctx.host.line_number_table(frame.method) {
                Ok(table) => table
                    .locate(frame.offset)
                    .map(|selection| Experiment::new(*frame, selection)),
                Err(e) => {
                    ktrace!("Skipping {:?}: {}", frame.method, e);
                    None
                }
            }
        })
    }

    /// Run one experiment to completion (or abandonment).
    pub fn run_experiment(&mut self, mut experiment: Experiment) -> ExperimentOutcome {
        let ctx = Arc::clone(&self.ctx);
        let base = ctx.config.signal_interval;

        kinfo!("Running experiment");
        experiment.set_speedup(calculate_random_speedup(&mut self.rng), base);
        let loaded = ctx.experiment.load(&experiment);
        if loaded < experiment.ranges.len() {
            kwarn!(
                "Line {} has {} ranges, only {} tracked",
                experiment.line,
                experiment.ranges.len(),
                loaded
            );
        }

        ctx.points_hit.store(0, Ordering::Release);
        ctx.experiment.activate();

        let start = Instant::now();
        let deadline = start.checked_add(self.length.current());
        let end_to_end = ctx.config.end_to_end;
        while ctx.is_running()
            && ((end_to_end && ctx.points_hit() == 0)
                || deadline.map_or(true, |deadline| Instant::now() < deadline))
        {
            timer::sleep(base);
            ctx.threads.signal_all();
        }

        // Drain: let every thread see the deactivation before reconciling.
        timer::sleep(base);
        ctx.experiment.deactivate();
        ctx.threads.signal_all();
        timer::sleep(base);

        if !ctx.is_running() {
            kdebug!("Profiler stopped during experiment - result discarded");
            return ExperimentOutcome::Aborted;
        }

        let duration = duration_ns(start.elapsed());
        let delay = ctx.delay.take();
        let points_hit = ctx.points_hit.swap(0, Ordering::AcqRel);

        let signature = match ctx.host.declaring_class_signature(experiment.method) {
            Ok(signature) => signature,
            Err(e) => {
                kdebug!("Dropping experiment on {:?}: {}", experiment.method, e);
                return ExperimentOutcome::Discarded;
            }
        };
        let class = clean_signature(&signature);

        let next_length = self.length.update(points_hit);
        ctx.line_hits
            .add_hit(&class, experiment.line, experiment.offset);

        let record = ExperimentRecord::new(
            &class,
            experiment.line,
            experiment.speedup,
            duration,
            delay,
            points_hit,
        );
        kinfo!("Ran experiment: {} [new exp time: {:?}]", record, next_length);
        if let Err(e) = ctx.sink.record(&record) {
            kwarn!("Failed to write experiment result: {}", e);
        }
        ExperimentOutcome::Recorded(record)
    }
}
