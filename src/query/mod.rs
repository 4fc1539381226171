//! Run-query compiler
//!
//! Turns a declarative request (columns, filter, sort, page) into one
//! pipeline over the runs collection, joining the metrics collection when a
//! user-defined metric column is involved.
//!
//! Planning happens in small pure steps:
//! - [`filter`]: fields the filter references
//! - [`projection`]: inclusion and strip sets
//! - [`synthetic`]: `duration` and liveness-aware `status`
//! - [`metric_join`]: explode, lookup and regroup of metric series
//! - [`sort`]: where sort/skip/limit go relative to the join
//!
//! [`RunQueryCompiler`] assembles the stages in a fixed order.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use trueno_runboard::config::CompilerConfig;
//! use trueno_runboard::query::{ColumnCatalog, RunQuery, RunQueryCompiler};
//!
//! let compiler = RunQueryCompiler::new(CompilerConfig::default());
//! let query = RunQuery::list().select(["status"]).limit(10);
//! let compiled = compiler.compile(&query, &ColumnCatalog::default(), Utc::now());
//! assert_eq!(
//!     compiled.pipeline().stage_names(),
//!     vec!["$project", "$addFields", "$sort", "$limit", "$project"]
//! );
//! ```

pub mod catalog;
pub mod compiler;
pub mod filter;
pub mod metric_join;
pub mod projection;
pub mod sort;
pub mod synthetic;

pub use catalog::ColumnCatalog;
pub use compiler::{CompiledQuery, RunQueryCompiler, RunQueryResponse};
pub use filter::{parse_query, referenced_fields, FilterNode};

use serde_json::Value;

use crate::pipeline::OrderDirection;

/// Stored and synthesized field names the planner refers to.
pub mod fields {
    /// Run id.
    pub const ID: &str = "_id";
    /// Stored status, replaced by the synthesized one when requested.
    pub const STATUS: &str = "status";
    /// Synthesized `heartbeat - start_time`.
    pub const DURATION: &str = "duration";
    /// Run start.
    pub const START_TIME: &str = "start_time";
    /// Last sign of life.
    pub const HEARTBEAT: &str = "heartbeat";
    /// `{id, name}` references into the metrics collection.
    pub const METRIC_REFS: &str = "info.metrics";
    /// Output field of a count request.
    pub const COUNT: &str = "count";
}

/// What shape of answer the request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// A page of runs.
    List,
    /// At most one run, by id.
    Single(i64),
    /// Number of matching runs.
    Count,
}

/// A run query before compilation.
///
/// Column names are display names; the compiler resolves them through the
/// column catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct RunQuery {
    mode: QueryMode,
    select: Vec<String>,
    filter: Option<Value>,
    sort_by: Option<String>,
    order: OrderDirection,
    skip: u64,
    limit: Option<u64>,
}

impl RunQuery {
    fn with_mode(mode: QueryMode) -> Self {
        Self {
            mode,
            select: Vec::new(),
            filter: None,
            sort_by: None,
            order: OrderDirection::Desc,
            skip: 0,
            limit: None,
        }
    }

    /// List request.
    #[must_use]
    pub fn list() -> Self {
        Self::with_mode(QueryMode::List)
    }

    /// Single-run request.
    #[must_use]
    pub fn single(id: i64) -> Self {
        Self::with_mode(QueryMode::Single(id))
    }

    /// Count request.
    #[must_use]
    pub fn count() -> Self {
        Self::with_mode(QueryMode::Count)
    }

    /// Set the selected columns; empty means every field.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the filter. `null` and `{}` mean no filter.
    #[must_use]
    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = match filter {
            Value::Null => None,
            Value::Object(ref map) if map.is_empty() => None,
            other => Some(other),
        };
        self
    }

    /// Sort by a display column.
    #[must_use]
    pub fn sort_by(mut self, column: impl Into<String>, order: OrderDirection) -> Self {
        self.sort_by = Some(column.into());
        self.order = order;
        self
    }

    /// Set the sort direction without changing the column.
    #[must_use]
    pub const fn order(mut self, order: OrderDirection) -> Self {
        self.order = order;
        self
    }

    /// Rows to skip.
    #[must_use]
    pub const fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Page size.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Request mode.
    #[must_use]
    pub const fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Selected display columns.
    #[must_use]
    pub fn selection(&self) -> &[String] {
        &self.select
    }

    /// Filter, if any.
    #[must_use]
    pub const fn filter_value(&self) -> Option<&Value> {
        self.filter.as_ref()
    }

    /// Sort column, if set.
    #[must_use]
    pub fn sort_column(&self) -> Option<&str> {
        self.sort_by.as_deref()
    }

    /// Sort direction.
    #[must_use]
    pub const fn order_direction(&self) -> OrderDirection {
        self.order
    }

    /// Rows to skip.
    #[must_use]
    pub const fn skip_count(&self) -> u64 {
        self.skip
    }

    /// Requested page size.
    #[must_use]
    pub const fn limit_count(&self) -> Option<u64> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let query = RunQuery::list();
        assert_eq!(query.mode(), QueryMode::List);
        assert!(query.selection().is_empty());
        assert_eq!(query.order_direction(), OrderDirection::Desc);
        assert_eq!(query.skip_count(), 0);
        assert_eq!(query.limit_count(), None);
    }

    #[test]
    fn test_empty_filter_is_no_filter() {
        assert!(RunQuery::list().filter(json!({})).filter_value().is_none());
        assert!(RunQuery::list().filter(Value::Null).filter_value().is_none());
        assert!(RunQuery::list()
            .filter(json!({"status": "FAILED"}))
            .filter_value()
            .is_some());
    }
}
