//! Projection planning
//!
//! Computes which fields must survive the inclusion projection and which of
//! those must be stripped again before the response leaves the pipeline.
//! A field is force-included (and strip-listed) when the caller did not
//! select it but the filter, the sort, a synthetic column or the metric join
//! needs it.

use std::collections::BTreeSet;

use super::catalog::ColumnCatalog;
use super::fields;
use crate::pipeline::{is_ancestor, Projection, Stage};
use crate::run::MetricColumnDefinition;

/// Inclusion and strip sets, threaded by value through the planning steps.
///
/// An empty inclusion set means "keep everything"; forcing a field is then a
/// no-op because nothing is projected away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSets {
    include: BTreeSet<String>,
    strip: BTreeSet<String>,
}

impl FieldSets {
    /// Start from the caller's selection.
    pub fn from_selection<I, S>(selection: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: selection.into_iter().map(Into::into).collect(),
            strip: BTreeSet::new(),
        }
    }

    /// Whether an inclusion projection will be emitted.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        !self.include.is_empty()
    }

    /// Include `field`, strip-listing it if the caller did not select it.
    ///
    /// Paths overlap: a field already covered by an included path (itself or
    /// an ancestor) is left alone, and a field that is an ancestor of a kept
    /// path is included but never stripped, since stripping it would remove
    /// the kept path with it.
    #[must_use]
    pub fn force(mut self, field: &str) -> Self {
        if !self.is_explicit() || field == fields::ID {
            return self;
        }
        let covered = self
            .include
            .iter()
            .any(|path| path == field || is_ancestor(path, field));
        if covered {
            return self;
        }
        let holds_kept = self.kept().any(|path| is_ancestor(field, path));
        self.include.insert(field.to_string());
        if !holds_kept {
            self.strip.insert(field.to_string());
        }
        self
    }

    /// Included paths that reach the response.
    fn kept(&self) -> impl Iterator<Item = &str> + '_ {
        self.include
            .iter()
            .filter(|path| !self.strip.contains(*path))
            .map(String::as_str)
    }

    /// Paths the strip projection removes.
    ///
    /// Each strip-listed path is widened to its shortest prefix that holds no
    /// kept path, so parents that only existed for forced fields go too
    /// (`info.metrics` becomes `info` unless something under `info` was
    /// selected).
    #[must_use]
    pub fn strip_paths(&self) -> BTreeSet<String> {
        self.strip
            .iter()
            .map(|path| {
                let mut prefix = String::new();
                for segment in path.split('.') {
                    if !prefix.is_empty() {
                        prefix.push('.');
                    }
                    prefix.push_str(segment);
                    if !self
                        .kept()
                        .any(|kept| kept == prefix || is_ancestor(&prefix, kept))
                    {
                        break;
                    }
                }
                prefix
            })
            .collect()
    }

    /// Fields kept by the inclusion projection.
    #[must_use]
    pub const fn include(&self) -> &BTreeSet<String> {
        &self.include
    }

    /// Fields removed by the strip projection.
    #[must_use]
    pub const fn strip(&self) -> &BTreeSet<String> {
        &self.strip
    }
}

/// Which synthesized columns must be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyntheticRequirements {
    /// `duration = heartbeat - start_time`
    pub duration: bool,
    /// Liveness-aware `status`
    pub status: bool,
}

impl SyntheticRequirements {
    /// Whether any synthetic column is needed.
    #[must_use]
    pub const fn any(self) -> bool {
        self.duration || self.status
    }
}

/// Output of projection planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionPlan {
    fields: FieldSets,
    metric_columns: Vec<MetricColumnDefinition>,
    synthetic: SyntheticRequirements,
}

impl ProjectionPlan {
    /// Plan the projection.
    ///
    /// # Arguments
    ///
    /// * `selection` - Selected stored fields, already resolved from display names
    /// * `filter_fields` - Fields referenced by the filter
    /// * `sort_field` - Resolved sort key, if the request sorts
    /// * `catalog` - Current column definitions
    #[must_use]
    pub fn plan(
        selection: &[String],
        filter_fields: &BTreeSet<String>,
        sort_field: Option<&str>,
        catalog: &ColumnCatalog,
    ) -> Self {
        let mut referenced: BTreeSet<&str> = selection.iter().map(String::as_str).collect();
        referenced.extend(filter_fields.iter().map(String::as_str));
        referenced.extend(sort_field);

        let fields = filter_fields
            .iter()
            .map(String::as_str)
            .chain(sort_field)
            .fold(FieldSets::from_selection(selection), FieldSets::force);

        let metric_columns: Vec<MetricColumnDefinition> = catalog
            .metric_columns()
            .iter()
            .filter(|column| referenced.contains(column.name.as_str()))
            .cloned()
            .collect();
        let fields = if metric_columns.is_empty() {
            fields
        } else {
            fields.force(fields::METRIC_REFS)
        };

        let synthetic = SyntheticRequirements {
            duration: referenced.contains(fields::DURATION),
            status: referenced.contains(fields::STATUS),
        };
        let fields = if synthetic.any() {
            fields.force(fields::START_TIME).force(fields::HEARTBEAT)
        } else {
            fields
        };

        Self {
            fields,
            metric_columns,
            synthetic,
        }
    }

    /// Planned field sets.
    #[must_use]
    pub const fn fields(&self) -> &FieldSets {
        &self.fields
    }

    /// Metric columns referenced by the selection, filter or sort.
    #[must_use]
    pub fn metric_columns(&self) -> &[MetricColumnDefinition] {
        &self.metric_columns
    }

    /// Whether the metric join must run.
    #[must_use]
    pub fn metric_column_projection_required(&self) -> bool {
        !self.metric_columns.is_empty()
    }

    /// Synthetic columns to compute.
    #[must_use]
    pub const fn synthetic(&self) -> SyntheticRequirements {
        self.synthetic
    }

    /// Inclusion stage, if the caller selected columns.
    #[must_use]
    pub fn inclusion_stage(&self) -> Option<Stage> {
        self.fields
            .is_explicit()
            .then(|| Stage::Project(Projection::include(self.fields.include.iter().cloned())))
    }

    /// Strip stage removing force-included fields plus `helpers`.
    #[must_use]
    pub fn strip_stage<'a>(&'a self, helpers: impl IntoIterator<Item = &'a str>) -> Option<Stage> {
        let mut paths = self.fields.strip_paths();
        paths.extend(helpers.into_iter().map(str::to_string));
        (!paths.is_empty()).then(|| Stage::Project(Projection::exclude(paths)))
    }
}
