//! Column definitions configured from the dashboard
//!
//! Both kinds are created and deleted elsewhere; the compiler only reads them.

use serde::{Deserialize, Serialize};

/// Aggregate used to reduce a metric series to a single cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrema {
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Mean of all values.
    Avg,
    /// Most recent value.
    Last,
    /// Mean of the most recent `lastn` values.
    LastNAvg,
}

impl Extrema {
    /// Every variant, in display order.
    pub const ALL: [Self; 5] = [Self::Min, Self::Max, Self::Avg, Self::Last, Self::LastNAvg];
}

/// A display column computed from a metric series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricColumnDefinition {
    /// Unique column name shown in the table.
    pub name: String,
    /// Series to aggregate.
    pub metric_name: String,
    /// Aggregate to apply.
    pub extrema: Extrema,
    /// Window for `last_n_avg`.
    #[serde(default, rename = "lastn", skip_serializing_if = "Option::is_none")]
    pub last_n: Option<i64>,
}

impl MetricColumnDefinition {
    /// Create a definition without a `lastn` window.
    #[must_use]
    pub fn new(name: impl Into<String>, metric_name: impl Into<String>, extrema: Extrema) -> Self {
        Self {
            name: name.into(),
            metric_name: metric_name.into(),
            extrema,
            last_n: None,
        }
    }

    /// Set the `lastn` window.
    #[must_use]
    pub const fn with_last_n(mut self, last_n: i64) -> Self {
        self.last_n = Some(last_n);
        self
    }
}

/// A display column mapped onto a dotted path inside the run document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomColumnDefinition {
    /// Column name shown in the table.
    pub name: String,
    /// Dotted path, e.g. `config.optimizer.lr`.
    pub config_path: String,
}

impl CustomColumnDefinition {
    /// Create a definition.
    #[must_use]
    pub fn new(name: impl Into<String>, config_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_path: config_path.into(),
        }
    }
}
