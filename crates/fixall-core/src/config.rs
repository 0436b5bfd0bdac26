//! Configuration resolution for aggregation runs.
//!
//! Precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (`FIXALL_MAX_PARALLEL`, `FIXALL_TREE_MODE`, `FIXALL_LOG`)
//! 3. Defaults
//!
//! Each resolved value remembers where it came from so callers can report
//! the effective configuration.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

// ============================================================================
// Config Values
// ============================================================================

/// Environment variable capping concurrent group fetches (`0` = unbounded).
pub const ENV_MAX_PARALLEL: &str = "FIXALL_MAX_PARALLEL";
/// Environment variable selecting tree materialization (`concurrent`|`sequential`).
pub const ENV_TREE_MODE: &str = "FIXALL_TREE_MODE";
/// Environment variable selecting the log level.
pub const ENV_LOG: &str = "FIXALL_LOG";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in default value.
    Default = 0,
    /// From environment variable.
    EnvVar = 1,
    /// From CLI flag (highest precedence).
    CliFlag = 2,
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue<T> {
    /// The actual value.
    pub value: T,
    /// Where the value came from.
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    /// Create a new config value with the given source.
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Merge with another value, preferring higher precedence.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

// ============================================================================
// Tree Mode
// ============================================================================

/// How the identity map materializes trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeMode {
    /// Materialize every unit's tree concurrently.
    #[default]
    Concurrent,
    /// Materialize trees one unit at a time.
    Sequential,
}

impl FromStr for TreeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" => Ok(TreeMode::Concurrent),
            "sequential" => Ok(TreeMode::Sequential),
            other => Err(format!(
                "invalid tree mode '{}', expected 'concurrent' or 'sequential'",
                other
            )),
        }
    }
}

impl fmt::Display for TreeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeMode::Concurrent => write!(f, "concurrent"),
            TreeMode::Sequential => write!(f, "sequential"),
        }
    }
}

// ============================================================================
// Engine Options
// ============================================================================

/// Knobs the engine reads during one aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregationOptions {
    /// Cap on concurrently running group fetches (`None` = all at once).
    pub max_parallel_fetches: Option<NonZeroUsize>,
    /// Tree materialization strategy.
    pub tree_mode: TreeMode,
}

impl AggregationOptions {
    /// Cap concurrent group fetches; `0` removes the cap.
    pub fn with_max_parallel_fetches(mut self, max: usize) -> Self {
        self.max_parallel_fetches = NonZeroUsize::new(max);
        self
    }

    /// Select the tree materialization strategy.
    pub fn with_tree_mode(mut self, mode: TreeMode) -> Self {
        self.tree_mode = mode;
        self
    }
}

// ============================================================================
// Configuration Resolution
// ============================================================================

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// `--max-parallel N` (`0` = unbounded).
    pub max_parallel: Option<usize>,
    /// `--sequential-trees` maps to [`TreeMode::Sequential`].
    pub tree_mode: Option<TreeMode>,
    /// `--log-level`.
    pub log_level: Option<String>,
}

/// Resolved configuration with precedence information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Concurrent group fetch cap.
    pub max_parallel_fetches: ConfigValue<Option<NonZeroUsize>>,
    /// Tree materialization strategy.
    pub tree_mode: ConfigValue<TreeMode>,
    /// Log level directive.
    pub log_level: ConfigValue<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ResolvedConfig {
            max_parallel_fetches: ConfigValue::new(None, ConfigSource::Default),
            tree_mode: ConfigValue::new(TreeMode::default(), ConfigSource::Default),
            log_level: ConfigValue::new(DEFAULT_LOG_LEVEL.to_string(), ConfigSource::Default),
        }
    }
}

impl ResolvedConfig {
    /// Resolve from the process environment and CLI overrides.
    pub fn resolve(cli_overrides: &CliOverrides) -> Self {
        Self::resolve_with(cli_overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with<F>(cli_overrides: &CliOverrides, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ResolvedConfig::default();
        config.apply_env_vars(env);
        config.apply_cli_overrides(cli_overrides);
        config
    }

    /// Engine options derived from the resolved values.
    pub fn options(&self) -> AggregationOptions {
        AggregationOptions {
            max_parallel_fetches: self.max_parallel_fetches.value,
            tree_mode: self.tree_mode.value,
        }
    }

    fn apply_env_vars<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = env(ENV_MAX_PARALLEL) {
            match raw.trim().parse::<usize>() {
                Ok(max) => {
                    self.max_parallel_fetches = self
                        .max_parallel_fetches
                        .clone()
                        .merge(ConfigValue::new(NonZeroUsize::new(max), ConfigSource::EnvVar));
                }
                Err(e) => {
                    tracing::warn!(var = ENV_MAX_PARALLEL, value = %raw, error = %e, "ignoring invalid value");
                }
            }
        }

        if let Some(raw) = env(ENV_TREE_MODE) {
            match raw.parse::<TreeMode>() {
                Ok(mode) => {
                    self.tree_mode = ConfigValue::new(mode, ConfigSource::EnvVar);
                }
                Err(e) => {
                    tracing::warn!(var = ENV_TREE_MODE, value = %raw, error = %e, "ignoring invalid value");
                }
            }
        }

        if let Some(level) = env(ENV_LOG) {
            self.log_level = ConfigValue::new(level, ConfigSource::EnvVar);
        }
    }

    fn apply_cli_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(max) = overrides.max_parallel {
            self.max_parallel_fetches =
                ConfigValue::new(NonZeroUsize::new(max), ConfigSource::CliFlag);
        }

        if let Some(mode) = overrides.tree_mode {
            self.tree_mode = ConfigValue::new(mode, ConfigSource::CliFlag);
        }

        if let Some(ref level) = overrides.log_level {
            self.log_level = ConfigValue::new(level.clone(), ConfigSource::CliFlag);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
