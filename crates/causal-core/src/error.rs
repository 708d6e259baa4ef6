//! Error types for the causal profiler
//!
//! Three families, matching how the profiler reacts to them:
//! - configuration and setup problems end the run (`ProfilerError`),
//! - host lookups that fail are sampling noise and get skipped (`HostError`),
//! - stack captures that fail drop one sample (`CaptureError`).

use core::fmt;

/// Result type for profiler operations
pub type ProfilerResult<T> = Result<T, ProfilerError>;

/// Errors that stop the profiler from running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilerError {
    /// Agent options were missing or malformed
    Config(ConfigError),

    /// A host call that the run cannot do without failed
    Host(HostError),

    /// No progress point was armed by the time sampling started
    ProgressPointUnresolved { class: String, line: i32 },

    /// `start` called on a running profiler, or another profiler owns the
    /// process-wide signal handler
    AlreadyRunning,

    /// Installing or restoring the SIGPROF disposition failed
    SignalSetup(i32),

    /// The scheduler thread could not be spawned
    Spawn(String),

    /// Writing the result stream failed
    Output(String),
}

impl fmt::Display for ProfilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfilerError::Config(e) => write!(f, "configuration error: {}", e),
            ProfilerError::Host(e) => write!(f, "host error: {}", e),
            ProfilerError::ProgressPointUnresolved { class, line } => write!(
                f,
                "progress point {}:{} was never set - check the class name and line number",
                class, line
            ),
            ProfilerError::AlreadyRunning => write!(f, "profiler already running"),
            ProfilerError::SignalSetup(errno) => {
                write!(f, "failed to configure SIGPROF handler (errno {})", errno)
            }
            ProfilerError::Spawn(msg) => write!(f, "failed to spawn profiler thread: {}", msg),
            ProfilerError::Output(msg) => write!(f, "output error: {}", msg),
        }
    }
}

impl std::error::Error for ProfilerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProfilerError::Config(e) => Some(e),
            ProfilerError::Host(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for ProfilerError {
    fn from(e: ConfigError) -> Self {
        ProfilerError::Config(e)
    }
}

impl From<HostError> for ProfilerError {
    fn from(e: HostError) -> Self {
        ProfilerError::Host(e)
    }
}

impl From<std::io::Error> for ProfilerError {
    fn from(e: std::io::Error) -> Self {
        ProfilerError::Output(e.to_string())
    }
}

/// Agent option problems, all fatal at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required option is absent
    MissingOption(&'static str),

    /// Option key not recognised
    UnknownOption(String),

    /// Option present but its value does not parse or is out of range
    InvalidValue { option: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingOption(name) => write!(f, "missing required option `{}`", name),
            ConfigError::UnknownOption(name) => write!(f, "unknown option `{}`", name),
            ConfigError::InvalidValue { option, value } => {
                write!(f, "invalid value `{}` for option `{}`", value, option)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failures reported by the host instrumentation substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostError {
    /// The host is not in a phase where the call is allowed
    WrongPhase,

    /// The method identifier is stale or unknown
    InvalidMethod,

    /// The requested information does not exist (e.g. no line table)
    Absent,

    /// Host-specific error code
    Other(i32),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::WrongPhase => write!(f, "wrong host phase"),
            HostError::InvalidMethod => write!(f, "invalid method id"),
            HostError::Absent => write!(f, "information absent"),
            HostError::Other(code) => write!(f, "host error code {}", code),
        }
    }
}

impl std::error::Error for HostError {}

/// Why a stack capture produced no frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    /// Capture is not possible on this thread at all; the sample is dropped
    Unavailable,

    /// The thread was caught in a state that cannot be walked (GC, native
    /// code, ...); the sample counts with zero frames
    NotWalkable(i32),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Unavailable => write!(f, "stack capture unavailable"),
            CaptureError::NotWalkable(code) => write!(f, "stack not walkable ({})", code),
        }
    }
}

impl std::error::Error for CaptureError {}
