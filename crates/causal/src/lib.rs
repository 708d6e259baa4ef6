//! # causal - Causal Profiler
//!
//! Finds the code worth optimising by measuring which source lines, if made
//! faster, would make a chosen progress point run more often.
//!
//! Instead of speeding code up, each experiment picks one sampled line and a
//! virtual speedup, then delays every *other* thread whenever the line runs.
//! The progress point's hit rate under that delay tells how much the whole
//! program would gain from really speeding the line up.
//!
//! ## Features
//!
//! - **Signal sampling**: SIGPROF to every tracked application thread, stack
//!   capture through the host, allocation-free handler
//! - **Virtual speedup**: Global/per-thread delay ledger, reconciled every few samples
//! - **Adaptive experiments**: Length doubles or halves to keep progress hits
//!   in a useful band
//! - **Scope filter**: Search/ignore class prefixes pick the eligible lines
//! - **CSV results**: One row per completed experiment
//!
//! ## Quick Start
//!
//! ```ignore
//! use causal::{attach, Host};
//! use std::sync::Arc;
//!
//! let profiler = attach(
//!     "search_scopes=com.acme,progress_point=com.acme.Server:120",
//!     Arc::new(MyHost::new()),
//! )?;
//!
//! // Host callbacks forward to the profiler:
//! profiler.on_thread_start(thread);
//! profiler.on_class_prepare(&signature, &methods);
//! profiler.on_breakpoint();
//! profiler.on_thread_end();
//!
//! profiler.stop();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Host (managed runtime)                   │
//! │  stack capture, line tables, breakpoints, thread lifecycle  │
//! └─────────────────────────────────────────────────────────────┘
//!            │ hooks                          ▲ Host trait
//!            ▼                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Profiler                            │
//! │    scope filter, progress point, thread registry            │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                │
//!            ▼                                ▼
//!    ┌───────────────┐  SIGPROF       ┌───────────────┐
//!    │   Scheduler   │ ─────────────► │    Sampler    │
//!    │    Thread     │ ◄───────────── │ (app threads) │
//!    └───────────────┘   candidates   └───────────────┘
//!            │                                │
//!            ▼                                ▼
//!    ┌───────────────┐                ┌───────────────┐
//!    │  Result sink  │                │ Delay ledger  │
//!    └───────────────┘                └───────────────┘
//! ```

use std::sync::Arc;

// Re-export core types
pub use causal_core::{
    calculate_random_speedup,
    clean_signature,
    dedup_frames,
    CallFrame,
    CaptureError,
    ConfigError,
    Experiment,
    ExperimentLength,
    ExperimentRecord,
    Host,
    HostError,
    InScopeMethods,
    LineEntry,
    LineSelection,
    LineTable,
    LoadedClass,
    LocationRange,
    ManagedThread,
    MethodId,
    ProfilerError,
    ProfilerResult,
    Scope,
    SignalContext,
    CSV_HEADER,
};
pub use causal_core::constants;

// Re-export kprint macros for logging
pub use causal_core::{kerror, kwarn, kinfo, kdebug, ktrace};
pub use causal_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export runtime types
pub use causal_runtime::{
    CsvFileSink,
    ExperimentOutcome,
    LineHitSummary,
    MemorySink,
    Profiler,
    ProfilerConfig,
    ProgressPointSpec,
    ResultSink,
    SamplerSnapshot,
};
pub use causal_runtime::config::defaults;

/// Parse agent options, build a profiler writing to the configured CSV
/// file, and start it.
///
/// Logging is initialised from the environment first, so option errors
/// are reported at the configured level.
pub fn attach(options: &str, host: Arc<dyn Host>) -> ProfilerResult<Profiler> {
    init_logging();
    let config = ProfilerConfig::parse_options(options)?;
    let profiler = Profiler::new(config, host)?;
    profiler.start()?;
    Ok(profiler)
}

/// Like [`attach`], but a configuration or startup failure terminates the
/// process through [`Host::abort`].
pub fn attach_or_abort(options: &str, host: Arc<dyn Host>) -> Profiler {
    match attach(options, Arc::clone(&host)) {
        Ok(profiler) => profiler,
        Err(e) => host.abort(&e),
    }
}

/// Check if the calling thread is tracked by a profiler
#[inline]
pub fn is_tracked_thread() -> bool {
    causal_runtime::tls::has_current()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHost;

    impl Host for NullHost {
        fn capture_frames(&self, _: SignalContext, _: &mut [CallFrame]) -> Result<usize, CaptureError> {
            Err(CaptureError::Unavailable)
        }
        fn loaded_classes(&self) -> Result<Vec<LoadedClass>, HostError> {
            Ok(Vec::new())
        }
        fn line_number_table(&self, _: MethodId) -> Result<LineTable, HostError> {
            Err(HostError::Absent)
        }
        fn declaring_class_signature(&self, _: MethodId) -> Result<String, HostError> {
            Err(HostError::Absent)
        }
        fn set_breakpoint(&self, _: MethodId, _: i32) -> Result<(), HostError> {
            Ok(())
        }
        fn clear_breakpoint(&self, _: MethodId, _: i32) -> Result<(), HostError> {
            Ok(())
        }
        fn is_application_thread(&self, _: ManagedThread) -> Result<bool, HostError> {
            Ok(true)
        }
    }

    #[test]
    fn test_attach_rejects_bad_options() {
        let host: Arc<dyn Host> = Arc::new(NullHost);
        assert_eq!(
            attach("progress_point=com.acme.Main:3", Arc::clone(&host)).err(),
            Some(ProfilerError::Config(ConfigError::MissingOption("search_scopes")))
        );
        assert!(matches!(
            attach("search_scopes=com.acme,no_such_option=1", host),
            Err(ProfilerError::Config(ConfigError::UnknownOption(_)))
        ));
    }

    #[test]
    fn test_untracked_by_default() {
        assert!(!is_tracked_thread());
    }
}
