//! # causal-runtime
//!
//! Platform runtime for the causal profiler.
//!
//! This crate provides:
//! - SIGPROF installation and delivery
//! - Thread-local profiler records and the thread registry
//! - The signal-context sampler and the global delay ledger
//! - The progress point registry
//! - The experiment scheduler thread
//! - Result sinks and per-line diagnostics
//! - Configuration (agent options, defaults, env overrides)

pub mod config;
pub mod signal;
pub mod tls;
pub mod timer;
pub mod threads;
pub mod delay;
pub mod active;
pub mod progress;
pub mod line_hits;
pub mod output;
pub mod sampler;
pub mod context;
pub mod scheduler;
pub mod profiler;

#[cfg(test)]
pub(crate) mod mock;

// Re-exports
pub use config::{ProfilerConfig, ProgressPointSpec};
pub use context::ProfilerContext;
pub use delay::{DelayLedger, Reconciliation};
pub use line_hits::{LineHitSummary, LineHits};
pub use output::{CsvFileSink, MemorySink, ResultSink};
pub use profiler::Profiler;
pub use sampler::{SamplerSnapshot, SamplerStats};
pub use scheduler::{ExperimentOutcome, Scheduler};
pub use threads::{ThreadRegistry, UserThread};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        /// Name of the platform backend compiled in
        pub const PLATFORM: &str = "linux";
    } else if #[cfg(target_os = "macos")] {
        pub const PLATFORM: &str = "macos";
    } else if #[cfg(unix)] {
        pub const PLATFORM: &str = "unix";
    } else {
        compile_error!("Unsupported platform");
    }
}
