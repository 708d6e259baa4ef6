//! # causal-core
//!
//! Core types and algorithms for the causal profiler.
//!
//! This crate is platform-agnostic and installs no signal handlers.
//! Everything OS-specific lives in `causal-runtime`.
//!
//! ## Modules
//!
//! - `frame` - Method identifiers, sampled call frames, frame dedup
//! - `scope` - Search/ignore prefix filter and the in-scope method set
//! - `line_table` - Line-number tables and source-line range selection
//! - `experiment` - Experiment model, speedup draw, result record
//! - `length` - Adaptive experiment length
//! - `candidates` - Fixed-capacity candidate buffer for the sampler
//! - `host` - Host instrumentation substrate trait
//! - `error` - Error types
//! - `spinlock` - Owner-tracking spinlock
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment overrides for tuning knobs

pub mod frame;
pub mod scope;
pub mod line_table;
pub mod experiment;
pub mod length;
pub mod candidates;
pub mod host;
pub mod error;
pub mod spinlock;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use frame::{dedup_frames, CallFrame, MethodId};
pub use scope::{InScopeMethods, Scope};
pub use line_table::{LineEntry, LineSelection, LineTable};
pub use experiment::{
    calculate_random_speedup, clean_signature, Experiment, ExperimentRecord, LocationRange,
    CSV_HEADER,
};
pub use length::ExperimentLength;
pub use candidates::{CandidateBuffer, PushOutcome};
pub use host::{Host, LoadedClass, ManagedThread, SignalContext};
pub use error::{CaptureError, ConfigError, HostError, ProfilerError, ProfilerResult};
pub use spinlock::SpinLock;
pub use env::{env_flag, env_micros, env_millis, env_override};

/// Fixed limits
pub mod constants {
    /// Largest legal bytecode offset in a method
    pub const MAX_OFFSET: i32 = 65535;

    /// Frames captured per sample
    pub const MAX_FRAMES: usize = 128;

    /// Offset ranges one experiment can hold (a line rarely needs more than a few)
    pub const MAX_RANGES: usize = 64;

    /// Experiment-mode signals between delay reconciliations
    pub const SIGNALS_PER_RECONCILE: u32 = 10;
}
