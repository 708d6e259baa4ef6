//! Compile-time defaults for every tuning knob

/// Base sampling interval (one signal round), microseconds
pub const SIGNAL_INTERVAL_US: u64 = 1000;

/// Largest accepted base sampling interval, microseconds
pub const MAX_SIGNAL_INTERVAL_US: u64 = 1_000_000;

/// Shortest adaptive experiment, milliseconds
pub const MIN_EXP_MS: u64 = 5000;

/// Longest adaptive experiment, milliseconds
pub const MAX_EXP_MS: u64 = 80000;

/// Largest accepted experiment length, milliseconds
pub const MAX_EXP_LIMIT_MS: u64 = 24 * 60 * 60 * 1000;

/// Progress hits at or below which the next experiment doubles
pub const HITS_TO_INC_EXP_TIME: u64 = 5;

/// Progress hits at or above which the next experiment halves
pub const HITS_TO_DEC_EXP_TIME: u64 = 20;

/// Candidate frames kept per sampling phase
pub const CANDIDATE_CAPACITY: usize = 1000;

/// Sampling phase length, in base intervals
pub const SAMPLING_ROUNDS: u32 = 30;

/// Result stream written when `output_file` is not given
pub const OUTPUT_FILE: &str = "causal-output.csv";
