//! Metric Record - a named time series belonging to a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Metric Record holds one series as parallel `steps`/`values`/`timestamps`
/// arrays, the layout the dashboard reads directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    #[serde(rename = "_id")]
    id: String,
    run_id: i64,
    name: String,
    steps: Vec<u64>,
    values: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
}

impl MetricRecord {
    /// Create an empty series.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique metric id, referenced from the run's `info.metrics`
    /// * `run_id` - Id of the owning run
    /// * `name` - Series name (e.g., "train.loss")
    #[must_use]
    pub fn new(id: impl Into<String>, run_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            run_id,
            name: name.into(),
            steps: Vec::new(),
            values: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    /// Create a builder for constructing a series from points.
    #[must_use]
    pub fn builder(id: impl Into<String>, run_id: i64, name: impl Into<String>) -> MetricRecordBuilder {
        MetricRecordBuilder {
            record: Self::new(id, run_id, name),
        }
    }

    /// Get the metric id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the owning run id.
    #[must_use]
    pub const fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Get the series name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the recorded values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Get the recorded steps.
    #[must_use]
    pub fn steps(&self) -> &[u64] {
        &self.steps
    }

    /// Number of points in the series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a point stamped with the current time.
    pub fn push(&mut self, step: u64, value: f64) {
        self.push_at(step, value, Utc::now());
    }

    /// Append a point with an explicit timestamp.
    pub fn push_at(&mut self, step: u64, value: f64, at: DateTime<Utc>) {
        self.steps.push(step);
        self.values.push(value);
        self.timestamps.push(at);
    }

    /// Serialize into the stored document shape.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_document(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Builder for `MetricRecord`.
#[derive(Debug)]
pub struct MetricRecordBuilder {
    record: MetricRecord,
}

impl MetricRecordBuilder {
    /// Append a point stamped with the current time.
    #[must_use]
    pub fn point(mut self, step: u64, value: f64) -> Self {
        self.record.push(step, value);
        self
    }

    /// Append consecutive values starting at step 0.
    #[must_use]
    pub fn values(mut self, values: &[f64]) -> Self {
        let start = self.record.steps.len() as u64;
        for (offset, value) in values.iter().enumerate() {
            self.record.push(start + offset as u64, *value);
        }
        self
    }

    /// Build the `MetricRecord`.
    #[must_use]
    pub fn build(self) -> MetricRecord {
        self.record
    }
}
