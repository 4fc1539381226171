//! Run data model
//!
//! ## Schema Overview
//!
//! ```text
//! RunRecord (1) ──< MetricRecord (N) [info.metrics → _id]
//!
//! MetricColumnDefinition ── reduces a series by name into one cell
//! CustomColumnDefinition ── exposes a dotted run path as a column
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use trueno_runboard::run::{MetricRecord, RunRecord, RunStatus};
//!
//! let run = RunRecord::builder(1)
//!     .status(RunStatus::Running)
//!     .metric("m-1", "train.loss")
//!     .build();
//!
//! let loss = MetricRecord::builder("m-1", run.id(), "train.loss")
//!     .values(&[0.9, 0.4, 0.7])
//!     .build();
//! assert_eq!(loss.len(), 3);
//! ```

mod column;
mod metric_record;
mod run_record;

pub use column::{CustomColumnDefinition, Extrema, MetricColumnDefinition};
pub use metric_record::{MetricRecord, MetricRecordBuilder};
pub use run_record::{
    Annotations, ArtifactRef, ExperimentInfo, MetricRef, RunInfo, RunRecord, RunRecordBuilder,
    RunStatus,
};
