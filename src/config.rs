//! Compiler configuration
//!
//! Defaults match the dashboard's behaviour: a run whose heartbeat is older
//! than two minutes is classified `PROBABLY_DEAD`, list pages hold 200 rows.

use serde::{Deserialize, Serialize};

/// Liveness threshold in milliseconds.
pub const DEFAULT_PROBABLY_DEAD_AFTER_MS: i64 = 120_000;

/// Page size used when a list request carries no `limit`.
pub const DEFAULT_LIMIT: u64 = 200;

/// Settings consumed by the run-query compiler and service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// A RUNNING run with no heartbeat for longer than this is `PROBABLY_DEAD`.
    pub probably_dead_after_ms: i64,
    /// Page size when the request has no `limit`.
    pub default_limit: u64,
    /// Hard cap on any page size, if set.
    pub max_limit: Option<u64>,
    /// Allow the store to spill large sorts and groups to disk.
    pub allow_disk_use: bool,
    /// Collection holding run documents.
    pub runs_collection: String,
    /// Collection holding metric series.
    pub metrics_collection: String,
    /// Collection holding metric-column definitions.
    pub metric_columns_collection: String,
    /// Collection holding custom-column definitions.
    pub custom_columns_collection: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            probably_dead_after_ms: DEFAULT_PROBABLY_DEAD_AFTER_MS,
            default_limit: DEFAULT_LIMIT,
            max_limit: None,
            allow_disk_use: true,
            runs_collection: "runs".to_string(),
            metrics_collection: "metrics".to_string(),
            metric_columns_collection: "omniboard.metric.columns".to_string(),
            custom_columns_collection: "omniboard.custom.columns".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Create a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> CompilerConfigBuilder {
        CompilerConfigBuilder::default()
    }

    /// Apply `max_limit` to a requested page size.
    #[must_use]
    pub fn clamp_limit(&self, limit: u64) -> u64 {
        self.max_limit.map_or(limit, |max| limit.min(max))
    }
}

/// Builder for `CompilerConfig`.
#[derive(Debug, Default)]
pub struct CompilerConfigBuilder {
    config: CompilerConfig,
}

impl CompilerConfigBuilder {
    /// Set the liveness threshold.
    #[must_use]
    pub const fn probably_dead_after_ms(mut self, ms: i64) -> Self {
        self.config.probably_dead_after_ms = ms;
        self
    }

    /// Set the default page size.
    #[must_use]
    pub const fn default_limit(mut self, limit: u64) -> Self {
        self.config.default_limit = limit;
        self
    }

    /// Cap every page at `limit` rows.
    #[must_use]
    pub const fn max_limit(mut self, limit: u64) -> Self {
        self.config.max_limit = Some(limit);
        self
    }

    /// Allow or forbid spilling to disk.
    #[must_use]
    pub const fn allow_disk_use(mut self, allow: bool) -> Self {
        self.config.allow_disk_use = allow;
        self
    }

    /// Override the runs collection name.
    #[must_use]
    pub fn runs_collection(mut self, name: impl Into<String>) -> Self {
        self.config.runs_collection = name.into();
        self
    }

    /// Override the metrics collection name.
    #[must_use]
    pub fn metrics_collection(mut self, name: impl Into<String>) -> Self {
        self.config.metrics_collection = name.into();
        self
    }

    /// Build the `CompilerConfig`.
    #[must_use]
    pub fn build(self) -> CompilerConfig {
        self.config
    }
}
