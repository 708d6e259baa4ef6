//! Profiler lifecycle and host hooks
//!
//! ```rust,ignore
//! let config = ProfilerConfig::parse_options(options)?;
//! let profiler = Profiler::new(config, host)?;
//! profiler.start()?;
//!
//! // from the host's callbacks:
//! profiler.on_class_prepare(&signature, &methods);
//! profiler.on_thread_start(thread);
//! profiler.on_breakpoint();
//! profiler.on_thread_end();
//!
//! profiler.stop();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use causal_core::error::{HostError, ProfilerError, ProfilerResult};
use causal_core::{kdebug, kinfo, ktrace, kwarn};
use causal_core::{kprint, Host, ManagedThread, MethodId};

use crate::config::ProfilerConfig;
use crate::context::ProfilerContext;
use crate::line_hits::LineHitSummary;
use crate::output::{CsvFileSink, ResultSink};
use crate::sampler::{self, SamplerSnapshot};
use crate::scheduler::Scheduler;
use crate::signal;
use crate::threads::UserThread;
use crate::tls;

/// Marks the scheduler finished even if its body unwinds.
struct DoneGuard<'a>(&'a AtomicBool);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

pub struct Profiler {
    ctx: Arc<ProfilerContext>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Profiler {
    /// Profiler writing to the configured CSV file.
    pub fn new(config: ProfilerConfig, host: Arc<dyn Host>) -> ProfilerResult<Self> {
        config.validate()?;
        let sink = Arc::new(CsvFileSink::open(&config.output_file)?);
        Ok(Self::with_sink(config, host, sink))
    }

    /// Profiler writing to a caller-supplied sink.
    pub fn with_sink(config: ProfilerConfig, host: Arc<dyn Host>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            ctx: Arc::new(ProfilerContext::new(config, host, sink)),
            scheduler: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        self.ctx.config()
    }

    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    /// Install the sampler, scan loaded classes and launch the scheduler.
    pub fn start(&self) -> ProfilerResult<()> {
        self.ctx.config.validate()?;
        if let Some(level) = self.ctx.config.log_level {
            kprint::set_log_level(level);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ProfilerError::AlreadyRunning);
        }
        if !sampler::bind(&self.ctx) {
            self.started.store(false, Ordering::Release);
            return Err(ProfilerError::AlreadyRunning);
        }
        if let Err(e) = signal::install_sigprof_handler(sampler::sigprof_handler) {
            sampler::unbind(&self.ctx);
            self.started.store(false, Ordering::Release);
            return Err(e);
        }

        self.ctx.config.print();

        match self.ctx.host.loaded_classes() {
            Ok(classes) => {
                kdebug!("Scanning {} loaded classes", classes.len());
                for class in &classes {
                    self.on_class_prepare(&class.signature, &class.methods);
                }
            }
            Err(e) => kwarn!("Could not enumerate loaded classes: {}", e),
        }

        self.ctx.running.store(true, Ordering::Release);
        let ctx = Arc::clone(&self.ctx);
        let spawned = thread::Builder::new()
            .name("causal-profiler".into())
            .spawn(move || {
                let result = {
                    let _done = DoneGuard(&ctx.profile_done);
                    Scheduler::new(Arc::clone(&ctx)).run()
                };
                if let Err(e) = result {
                    ctx.host.abort(&e);
                }
            });

        match spawned {
            Ok(handle) => {
                *self.scheduler.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
                kinfo!("Profiler started");
                Ok(())
            }
            Err(e) => {
                self.ctx.running.store(false, Ordering::Release);
                let _ = signal::ignore_sigprof();
                sampler::unbind(&self.ctx);
                Err(ProfilerError::Spawn(e.to_string()))
            }
        }
    }

    /// Stop profiling and finalise. Later calls do nothing.
    pub fn stop(&self) {
        if !self.started.load(Ordering::Acquire) || self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let ctx = &self.ctx;
        kinfo!("Stopping profiler");
        if ctx.running.load(Ordering::Acquire) {
            if ctx.config.end_to_end {
                ctx.points_hit.fetch_add(1, Ordering::AcqRel);
            }
            ctx.running.store(false, Ordering::Release);

            kinfo!("Waiting for profiler to finish current cycle...");
            while !ctx.profile_done.load(Ordering::Acquire) {
                std::hint::spin_loop();
            }
            kinfo!("Profiler finished current cycle...");
        }

        for line in ctx.line_hits.dump() {
            kinfo!("{}", line);
        }
        ctx.in_scope.clear();
        if let Err(e) = signal::ignore_sigprof() {
            kwarn!("{}", e);
        }
        sampler::unbind(ctx);
        ctx.progress.disarm(&*ctx.host);
        if let Err(e) = ctx.sink.flush() {
            kwarn!("{}", e);
        }
        sampler::log_stats(ctx, "final");

        let handle = self
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                kwarn!("Profiler thread panicked");
            }
        }
        kprint::flush();
    }

    /// Host hook: a thread started. Tracks it if it is an application
    /// thread and returns whether it was tracked.
    ///
    /// Must be called on the thread that started.
    pub fn on_thread_start(&self, thread: ManagedThread) -> bool {
        match self.ctx.host.is_application_thread(thread) {
            Ok(true) => {}
            Ok(false) | Err(HostError::WrongPhase) => return false,
            Err(e) => self.ctx.host.abort(&ProfilerError::Host(e)),
        }

        kdebug!("Adding user thread");
        let record = Arc::new(UserThread::new(
            signal::current_native_thread(),
            thread,
            self.ctx.delay.snapshot(),
        ));
        self.ctx.threads.register(Arc::clone(&record));
        tls::set_current(record);
        true
    }

    /// Host hook: the calling thread is ending.
    pub fn on_thread_end(&self) {
        let Some(record) = tls::take_current() else {
            return;
        };
        kdebug!("Removing user thread");
        self.ctx
            .points_hit
            .fetch_add(record.take_points_hit(), Ordering::AcqRel);
        self.ctx.delay.settle_exit(&record);
        self.ctx.threads.unregister(&record);
    }

    /// Host hook: a class finished loading.
    pub fn on_class_prepare(&self, signature: &str, methods: &[MethodId]) {
        let ctx = &self.ctx;
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let Some(_guard) = ctx.class_prepare.lock_unless_owned() else {
            kwarn!("Nested class prepare for {} ignored", signature);
            return;
        };

        if ctx.config.scope.is_in_scope(signature) {
            ktrace!("Adding {} in scope methods from {}", methods.len(), signature);
            ctx.in_scope.register(methods);
        }
        if ctx.progress.matches_class(signature) {
            if let Err(e) = ctx.progress.try_resolve(&*ctx.host, methods) {
                kwarn!("Failed to arm progress point in {}: {}", signature, e);
            }
        }
    }

    /// Host hook: the progress point breakpoint fired on the calling thread.
    pub fn on_breakpoint(&self) {
        self.ctx.progress.on_hit(self.ctx.experiment.is_active());
    }

    /// Per-line experiment counts, most frequent first
    pub fn line_hits_dump(&self) -> Vec<LineHitSummary> {
        self.ctx.line_hits.dump()
    }

    pub fn sampler_stats(&self) -> SamplerSnapshot {
        self.ctx.stats.snapshot()
    }

    pub fn tracked_threads(&self) -> usize {
        self.ctx.threads.len()
    }

    pub fn in_scope_methods(&self) -> usize {
        self.ctx.in_scope.len()
    }

    pub fn progress_point_armed(&self) -> bool {
        self.ctx.progress.is_armed()
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        self.stop();
    }
}
