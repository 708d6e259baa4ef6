//! Profiler Configuration
//!
//! Compile-time defaults, environment overrides for tuning knobs, and the
//! agent option string the host passes at load time.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Agent options (`search_scopes=com.acme,progress_point=com.acme.Main:42`)
//! 2. Environment variables (tuning knobs only)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use causal_runtime::config::ProfilerConfig;
//!
//! let config = ProfilerConfig::parse_options(
//!     "search_scopes=com.acme|org.util,ignored_scopes=com.acme.gen,progress_point=com.acme.Server:120,warmup=500",
//! )?;
//! ```

pub mod defaults;

use std::path::PathBuf;
use std::time::Duration;

use causal_core::env::{env_micros, env_millis, env_override};
use causal_core::error::ConfigError;
use causal_core::kprint::LogLevel;
use causal_core::length::ExperimentLength;
use causal_core::scope::{internal_class_name, Scope};
use causal_core::kinfo;

/// Configured progress point, class in internal (slash) form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPointSpec {
    pub class: String,
    pub line: i32,
}

/// Profiler configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    /// Classes eligible for experiments
    pub scope: Scope,
    /// Throughput signal location; unused in end-to-end mode
    pub progress_point: Option<ProgressPointSpec>,
    /// Log level from the agent options, if given
    pub log_level: Option<LogLevel>,
    /// CSV result stream
    pub output_file: PathBuf,
    /// Progress signal is program completion instead of a breakpoint
    pub end_to_end: bool,
    /// Delay before sampling starts
    pub warmup: Duration,
    /// Disable adaptive experiment length
    pub fix_exp: bool,
    /// Base sampling interval
    pub signal_interval: Duration,
    /// Adaptive length lower bound (and the fixed length)
    pub min_experiment: Duration,
    /// Adaptive length upper bound
    pub max_experiment: Duration,
    /// Low-water mark for progress hits
    pub hits_to_increase: u64,
    /// High-water mark for progress hits
    pub hits_to_decrease: u64,
    /// Candidate buffer capacity
    pub candidate_capacity: usize,
    /// Sampling phase length in base intervals
    pub sampling_rounds: u32,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ProfilerConfig {
    /// Library defaults with environment overrides for tuning knobs.
    ///
    /// Environment variables (all optional):
    /// - `CAUSAL_SIGNAL_INTERVAL_US` - Base sampling interval in microseconds
    /// - `CAUSAL_MIN_EXP_MS` - Shortest experiment in milliseconds
    /// - `CAUSAL_MAX_EXP_MS` - Longest experiment in milliseconds
    /// - `CAUSAL_HITS_TO_INC` - Hits at or below which experiments lengthen
    /// - `CAUSAL_HITS_TO_DEC` - Hits at or above which experiments shorten
    /// - `CAUSAL_CANDIDATE_CAPACITY` - Candidate frames per sampling phase
    /// - `CAUSAL_SAMPLING_ROUNDS` - Sampling phase length in intervals
    pub fn from_env() -> Self {
        Self {
            signal_interval: env_micros("CAUSAL_SIGNAL_INTERVAL_US", defaults::SIGNAL_INTERVAL_US),
            min_experiment: env_millis("CAUSAL_MIN_EXP_MS", defaults::MIN_EXP_MS),
            max_experiment: env_millis("CAUSAL_MAX_EXP_MS", defaults::MAX_EXP_MS),
            hits_to_increase: env_override("CAUSAL_HITS_TO_INC", defaults::HITS_TO_INC_EXP_TIME),
            hits_to_decrease: env_override("CAUSAL_HITS_TO_DEC", defaults::HITS_TO_DEC_EXP_TIME),
            candidate_capacity: env_override(
                "CAUSAL_CANDIDATE_CAPACITY",
                defaults::CANDIDATE_CAPACITY,
            ),
            sampling_rounds: env_override("CAUSAL_SAMPLING_ROUNDS", defaults::SAMPLING_ROUNDS),
            ..Self::new()
        }
    }

    /// Library defaults only (no env override).
    /// Useful for testing or when you want full control.
    pub fn new() -> Self {
        Self {
            scope: Scope::new(),
            progress_point: None,
            log_level: None,
            output_file: PathBuf::from(defaults::OUTPUT_FILE),
            end_to_end: false,
            warmup: Duration::ZERO,
            fix_exp: false,
            signal_interval: Duration::from_micros(defaults::SIGNAL_INTERVAL_US),
            min_experiment: Duration::from_millis(defaults::MIN_EXP_MS),
            max_experiment: Duration::from_millis(defaults::MAX_EXP_MS),
            hits_to_increase: defaults::HITS_TO_INC_EXP_TIME,
            hits_to_decrease: defaults::HITS_TO_DEC_EXP_TIME,
            candidate_capacity: defaults::CANDIDATE_CAPACITY,
            sampling_rounds: defaults::SAMPLING_ROUNDS,
        }
    }

    /// Environment defaults plus the agent option string, validated.
    pub fn parse_options(options: &str) -> Result<Self, ConfigError> {
        let config = Self::from_env().apply_options(options)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply comma-separated `key=value` options (flags may omit the value).
    pub fn apply_options(mut self, options: &str) -> Result<Self, ConfigError> {
        for item in options.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = match item.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (item, None),
            };

            match key {
                "search_scopes" => {
                    for prefix in required("search_scopes", value)?.split('|') {
                        self.scope.add_search(prefix);
                    }
                }
                "ignored_scopes" => {
                    for prefix in required("ignored_scopes", value)?.split('|') {
                        self.scope.add_ignored(prefix);
                    }
                }
                "progress_point" => {
                    self.progress_point = Some(parse_progress_point(required(
                        "progress_point",
                        value,
                    )?)?);
                }
                "logging_level" => {
                    let raw = required("logging_level", value)?;
                    let level = LogLevel::parse(raw).ok_or_else(|| ConfigError::InvalidValue {
                        option: "logging_level",
                        value: raw.to_string(),
                    })?;
                    self.log_level = Some(level);
                }
                "output_file" => {
                    self.output_file = PathBuf::from(required("output_file", value)?);
                }
                "end_to_end" => self.end_to_end = parse_flag("end_to_end", value)?,
                "fix_exp" => self.fix_exp = parse_flag("fix_exp", value)?,
                "warmup" => {
                    let raw = required("warmup", value)?;
                    let ms: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                        option: "warmup",
                        value: raw.to_string(),
                    })?;
                    self.warmup = Duration::from_millis(ms);
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
        }
        Ok(self)
    }

    // Builder methods

    pub fn search_scope(mut self, prefix: &str) -> Self {
        self.scope.add_search(prefix);
        self
    }

    pub fn ignored_scope(mut self, prefix: &str) -> Self {
        self.scope.add_ignored(prefix);
        self
    }

    pub fn progress_point(mut self, class: &str, line: i32) -> Self {
        self.progress_point = Some(ProgressPointSpec {
            class: internal_class_name(class).into_owned(),
            line,
        });
        self
    }

    pub fn end_to_end(mut self, enable: bool) -> Self {
        self.end_to_end = enable;
        self
    }

    pub fn fix_exp(mut self, enable: bool) -> Self {
        self.fix_exp = enable;
        self
    }

    pub fn warmup(mut self, d: Duration) -> Self {
        self.warmup = d;
        self
    }

    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = path.into();
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn signal_interval(mut self, d: Duration) -> Self {
        self.signal_interval = d;
        self
    }

    pub fn experiment_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_experiment = min;
        self.max_experiment = max;
        self
    }

    pub fn hit_marks(mut self, increase_at_or_below: u64, decrease_at_or_above: u64) -> Self {
        self.hits_to_increase = increase_at_or_below;
        self.hits_to_decrease = decrease_at_or_above;
        self
    }

    pub fn candidate_capacity(mut self, capacity: usize) -> Self {
        self.candidate_capacity = capacity;
        self
    }

    pub fn sampling_rounds(mut self, rounds: u32) -> Self {
        self.sampling_rounds = rounds;
        self
    }

    /// Adaptive length state seeded from this configuration.
    pub fn experiment_length(&self) -> ExperimentLength {
        ExperimentLength::new(
            self.min_experiment,
            self.max_experiment,
            self.hits_to_increase,
            self.hits_to_decrease,
        )
        .fixed(self.fix_exp)
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scope.is_empty() {
            return Err(ConfigError::MissingOption("search_scopes"));
        }
        if !self.end_to_end && self.progress_point.is_none() {
            return Err(ConfigError::MissingOption("progress_point"));
        }
        if self.signal_interval.is_zero() {
            return Err(invalid("signal_interval", "0"));
        }
        if self.signal_interval > Duration::from_micros(defaults::MAX_SIGNAL_INTERVAL_US) {
            return Err(invalid("signal_interval", format!("{:?}", self.signal_interval)));
        }
        if self.min_experiment.is_zero() {
            return Err(invalid("min_experiment", "0"));
        }
        if self.max_experiment < self.min_experiment {
            return Err(invalid(
                "max_experiment",
                format!("{:?} < {:?}", self.max_experiment, self.min_experiment),
            ));
        }
        if self.max_experiment > Duration::from_millis(defaults::MAX_EXP_LIMIT_MS) {
            return Err(invalid("max_experiment", format!("{:?}", self.max_experiment)));
        }
        if self.candidate_capacity == 0 {
            return Err(invalid("candidate_capacity", "0"));
        }
        if self.sampling_rounds == 0 {
            return Err(invalid("sampling_rounds", "0"));
        }
        Ok(())
    }

    /// Log the effective configuration
    pub fn print(&self) {
        let progress = match &self.progress_point {
            Some(pp) => format!("{}:{}", pp.class, pp.line),
            None => "-".to_string(),
        };
        kinfo!("Profiler arguments:");
        kinfo!("  progress point:            {}", progress);
        kinfo!("  search scopes:             {}", self.scope.search_scopes().join(", "));
        kinfo!("  ignored scopes:            {}", self.scope.ignored_scopes().join(", "));
        kinfo!("  warmup:                    {:?}", self.warmup);
        kinfo!("  end-to-end:                {}", self.end_to_end);
        kinfo!("  fixed experiment duration: {}", self.fix_exp);
        kinfo!("  signal interval:           {:?}", self.signal_interval);
        kinfo!(
            "  experiment length:         {:?}..{:?}",
            self.min_experiment,
            self.max_experiment
        );
        kinfo!("  output file:               {}", self.output_file.display());
        kinfo!(
            "  logging level:             {}",
            self.log_level
                .unwrap_or_else(causal_core::kprint::log_level)
                .name()
        );
    }
}

fn invalid(option: &'static str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        option,
        value: value.into(),
    }
}

fn required<'a>(option: &'static str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingOption(option)),
    }
}

fn parse_flag(option: &'static str, value: Option<&str>) -> Result<bool, ConfigError> {
    match value.map(|v| v.to_ascii_lowercase()) {
        None => Ok(true),
        Some(v) => match v.as_str() {
            "" | "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(option, v)),
        },
    }
}

fn parse_progress_point(value: &str) -> Result<ProgressPointSpec, ConfigError> {
    let (class, line) = value
        .rsplit_once(':')
        .filter(|(class, _)| !class.trim().is_empty())
        .ok_or_else(|| invalid("progress_point", value))?;
    let line: i32 = line
        .trim()
        .parse()
        .map_err(|_| invalid("progress_point", value))?;
    Ok(ProgressPointSpec {
        class: internal_class_name(class).into_owned(),
        line,
    })
}
