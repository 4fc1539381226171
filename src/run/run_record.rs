//! Run Record - one recorded execution of an experiment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Status of a run.
///
/// `ProbablyDead` is never stored. It is derived at query time for RUNNING
/// runs whose heartbeat has gone stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run is currently executing.
    Running,
    /// Run completed successfully.
    Completed,
    /// Run failed with an error.
    Failed,
    /// Run was interrupted by the user.
    Interrupted,
    /// Run hit its time limit.
    Timeout,
    /// Run is waiting to be scheduled.
    Queued,
    /// Derived: RUNNING with a stale heartbeat.
    ProbablyDead,
}

impl RunStatus {
    /// Wire name as stored and returned by the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Interrupted => "INTERRUPTED",
            Self::Timeout => "TIMEOUT",
            Self::Queued => "QUEUED",
            Self::ProbablyDead => "PROBABLY_DEAD",
        }
    }

    /// Whether this status only exists at read time.
    #[must_use]
    pub const fn is_derived(self) -> bool {
        matches!(self, Self::ProbablyDead)
    }
}

/// Reference from a run to one of its metric series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricRef {
    /// Id of the `MetricRecord`.
    pub id: String,
    /// Series name, e.g. `train.loss`.
    pub name: String,
}

/// Source files captured with the experiment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentInfo {
    /// Experiment name.
    pub name: String,
    /// `(filename, file_id)` pairs.
    pub sources: Vec<(String, String)>,
}

/// Run-level bookkeeping written by the tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunInfo {
    /// Metric series logged by the run.
    pub metrics: Vec<MetricRef>,
}

/// Stored artifact reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Artifact filename.
    pub name: String,
    /// Blob id.
    pub file_id: String,
}

/// User annotations attached from the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Annotations {
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Notes text.
    pub notes: String,
}

/// Run Record in its stored document shape.
///
/// The query compiler works on raw documents because `config` is open-ended;
/// this type exists to write well-formed runs into a store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    #[serde(rename = "_id")]
    id: i64,
    config: serde_json::Value,
    experiment: ExperimentInfo,
    status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    heartbeat: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    stop_time: Option<DateTime<Utc>>,
    info: RunInfo,
    artifacts: Vec<ArtifactRef>,
    omniboard: Annotations,
}

impl RunRecord {
    /// Create a builder for a run with the given id.
    #[must_use]
    pub fn builder(id: i64) -> RunRecordBuilder {
        RunRecordBuilder::new(id)
    }

    /// Get the run id.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Get the stored status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the run configuration.
    #[must_use]
    pub const fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Get the last heartbeat timestamp.
    #[must_use]
    pub const fn heartbeat(&self) -> Option<DateTime<Utc>> {
        self.heartbeat
    }

    /// Get the stop timestamp.
    #[must_use]
    pub const fn stop_time(&self) -> Option<DateTime<Utc>> {
        self.stop_time
    }

    /// Get the metric references.
    #[must_use]
    pub fn metric_refs(&self) -> &[MetricRef] {
        &self.info.metrics
    }

    /// Get the user annotations.
    #[must_use]
    pub const fn annotations(&self) -> &Annotations {
        &self.omniboard
    }

    /// Serialize into the stored document shape.
    ///
    /// # Errors
    ///
    /// Returns error if the config cannot be serialized.
    pub fn to_document(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Builder for `RunRecord`.
#[derive(Debug)]
pub struct RunRecordBuilder {
    record: RunRecord,
}

impl RunRecordBuilder {
    /// Create a new builder; the run starts out COMPLETED with an empty config.
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            record: RunRecord {
                id,
                config: serde_json::Value::Object(serde_json::Map::new()),
                experiment: ExperimentInfo::default(),
                status: RunStatus::Completed,
                start_time: None,
                heartbeat: None,
                stop_time: None,
                info: RunInfo::default(),
                artifacts: Vec::new(),
                omniboard: Annotations::default(),
            },
        }
    }

    /// Set the stored status.
    ///
    /// `ProbablyDead` is derived and is stored as `RUNNING` instead.
    #[must_use]
    pub const fn status(mut self, status: RunStatus) -> Self {
        self.record.status = if status.is_derived() {
            RunStatus::Running
        } else {
            status
        };
        self
    }

    /// Set the run configuration.
    #[must_use]
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.record.config = config;
        self
    }

    /// Set the experiment name.
    #[must_use]
    pub fn experiment_name(mut self, name: impl Into<String>) -> Self {
        self.record.experiment.name = name.into();
        self
    }

    /// Add a captured source file.
    #[must_use]
    pub fn source(mut self, filename: impl Into<String>, file_id: impl Into<String>) -> Self {
        self.record
            .experiment
            .sources
            .push((filename.into(), file_id.into()));
        self
    }

    /// Set the start timestamp.
    #[must_use]
    pub const fn start_time(mut self, at: DateTime<Utc>) -> Self {
        self.record.start_time = Some(at);
        self
    }

    /// Set the heartbeat timestamp.
    #[must_use]
    pub const fn heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.record.heartbeat = Some(at);
        self
    }

    /// Set the stop timestamp.
    #[must_use]
    pub const fn stop_time(mut self, at: DateTime<Utc>) -> Self {
        self.record.stop_time = Some(at);
        self
    }

    /// Reference a metric series.
    #[must_use]
    pub fn metric(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.record.info.metrics.push(MetricRef {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Reference an artifact.
    #[must_use]
    pub fn artifact(mut self, name: impl Into<String>, file_id: impl Into<String>) -> Self {
        self.record.artifacts.push(ArtifactRef {
            name: name.into(),
            file_id: file_id.into(),
        });
        self
    }

    /// Add a dashboard tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.record.omniboard.tags.push(tag.into());
        self
    }

    /// Set the dashboard notes.
    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.record.omniboard.notes = notes.into();
        self
    }

    /// Build the `RunRecord`.
    #[must_use]
    pub fn build(self) -> RunRecord {
        self.record
    }
}
