//! Pipeline IR
//!
//! Typed stages produced by the run-query compiler. A [`Pipeline`] renders
//! to the document store's JSON stage array; rendering is deterministic, so
//! compiling the same request twice yields byte-identical output.
//!
//! ```rust
//! use trueno_runboard::pipeline::{OrderDirection, Pipeline, SortSpec, Stage};
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.push(Stage::Sort(SortSpec::by("_id", OrderDirection::Desc)));
//! pipeline.push(Stage::Limit(10));
//! assert_eq!(
//!     pipeline.to_json_string(),
//!     r#"[{"$sort":{"_id":-1}},{"$limit":10}]"#
//! );
//! ```

mod expr;

pub use expr::{format_timestamp, Accumulator, Expr};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Sort order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order (smallest first)
    Asc,
    /// Descending order (largest first)
    Desc,
}

impl OrderDirection {
    /// `1` or `-1`, as written in a sort stage.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }

    /// Parse the `+1`/`-1` convention; anything non-negative is ascending.
    #[must_use]
    pub const fn from_sign(sign: i64) -> Self {
        if sign < 0 {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

/// Ordered sort keys; the first key has the highest priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(String, OrderDirection)>,
}

impl SortSpec {
    /// Sort by a single key.
    pub fn by(field: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            keys: vec![(field.into(), direction)],
        }
    }

    /// Append a lower-priority key unless the field is already a key.
    #[must_use]
    pub fn then_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        let field = field.into();
        if !self.keys.iter().any(|(existing, _)| *existing == field) {
            self.keys.push((field, direction));
        }
        self
    }

    /// Sort keys in priority order.
    #[must_use]
    pub fn keys(&self) -> &[(String, OrderDirection)] {
        &self.keys
    }

    /// Highest-priority key.
    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        self.keys.first().map(|(field, _)| field.as_str())
    }
}

/// Whether a projection keeps or removes the listed paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    /// Keep only the listed paths (and `_id`).
    Include,
    /// Remove the listed paths.
    Exclude,
}

/// Projection over dotted paths.
///
/// Paths covered by an ancestor already in the set are dropped, since the
/// store rejects overlapping projection paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    mode: ProjectionMode,
    paths: BTreeSet<String>,
}

impl Projection {
    /// Inclusion projection.
    pub fn include<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ProjectionMode::Include, paths)
    }

    /// Exclusion projection.
    pub fn exclude<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ProjectionMode::Exclude, paths)
    }

    fn new<I, S>(mode: ProjectionMode, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let all: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        let paths = all
            .iter()
            .filter(|path| !all.iter().any(|other| is_ancestor(other, path)))
            .cloned()
            .collect();
        Self { mode, paths }
    }

    /// Projection mode.
    #[must_use]
    pub const fn mode(&self) -> ProjectionMode {
        self.mode
    }

    /// Normalized paths in lexical order.
    #[must_use]
    pub const fn paths(&self) -> &BTreeSet<String> {
        &self.paths
    }

    /// Whether no path is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// `ancestor` is a strict dotted prefix of `path` (`config` of `config.lr`,
/// but not of `configs`).
#[must_use]
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}

/// Join against another collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Foreign collection.
    pub from: String,
    /// Path in the current document holding the reference.
    pub local_field: String,
    /// Path in the foreign document it must equal.
    pub foreign_field: String,
    /// Extra restriction: foreign `.0` must be one of `.1`.
    pub restrict: Option<(String, Vec<String>)>,
    /// Field receiving the array of matches.
    pub as_field: String,
}

/// Variable bound to the local reference inside a rendered lookup.
const LOOKUP_VAR: &str = "ref";

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Filter documents with a match expression.
    Match(Value),
    /// Keep or remove paths.
    Project(Projection),
    /// Compute fields, in order.
    AddFields(Vec<(String, Expr)>),
    /// Order documents.
    Sort(SortSpec),
    /// Drop the first `n` documents.
    Skip(u64),
    /// Keep at most `n` documents.
    Limit(u64),
    /// One document per element of the array at `path`.
    Unwind {
        /// Array path.
        path: String,
        /// Keep documents whose array is null, missing or empty.
        preserve_empty: bool,
    },
    /// Join against another collection.
    Lookup(Lookup),
    /// Group documents by key.
    Group {
        /// Grouping key.
        id: Expr,
        /// Output fields.
        accumulators: Vec<(String, Accumulator)>,
    },
    /// Replace each document with the evaluated object.
    ReplaceRoot(Expr),
    /// Reduce to a single `{field: n}` document.
    Count(String),
}

impl Stage {
    /// Stage operator name, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Project(_) => "$project",
            Self::AddFields(_) => "$addFields",
            Self::Sort(_) => "$sort",
            Self::Skip(_) => "$skip",
            Self::Limit(_) => "$limit",
            Self::Unwind { .. } => "$unwind",
            Self::Lookup(_) => "$lookup",
            Self::Group { .. } => "$group",
            Self::ReplaceRoot(_) => "$replaceRoot",
            Self::Count(_) => "$count",
        }
    }

    /// Render in the store's JSON syntax.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let body = match self {
            Self::Match(filter) => filter.clone(),
            Self::Project(projection) => {
                let flag = match projection.mode {
                    ProjectionMode::Include => 1,
                    ProjectionMode::Exclude => 0,
                };
                Value::Object(
                    projection
                        .paths
                        .iter()
                        .map(|path| (path.clone(), json!(flag)))
                        .collect::<Map<_, _>>(),
                )
            }
            Self::AddFields(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, expr)| (name.clone(), expr.to_document()))
                    .collect::<Map<_, _>>(),
            ),
            Self::Sort(spec) => Value::Object(
                spec.keys
                    .iter()
                    .map(|(field, direction)| (field.clone(), json!(direction.as_i32())))
                    .collect::<Map<_, _>>(),
            ),
            Self::Skip(n) | Self::Limit(n) => json!(n),
            Self::Unwind {
                path,
                preserve_empty,
            } => json!({
                "path": format!("${path}"),
                "preserveNullAndEmptyArrays": preserve_empty,
            }),
            Self::Lookup(lookup) => {
                let mut matcher = Map::new();
                matcher.insert(
                    "$expr".to_string(),
                    json!({ "$eq": [format!("${}", lookup.foreign_field), format!("$${LOOKUP_VAR}")] }),
                );
                if let Some((field, values)) = &lookup.restrict {
                    matcher.insert(field.clone(), json!({ "$in": values }));
                }
                let mut bindings = Map::new();
                bindings.insert(
                    LOOKUP_VAR.to_string(),
                    json!(format!("${}", lookup.local_field)),
                );
                json!({
                    "from": lookup.from,
                    "let": bindings,
                    "pipeline": [{ "$match": matcher }],
                    "as": lookup.as_field,
                })
            }
            Self::Group { id, accumulators } => {
                let mut map = Map::new();
                map.insert("_id".to_string(), id.to_document());
                for (name, acc) in accumulators {
                    map.insert(name.clone(), acc.to_document());
                }
                Value::Object(map)
            }
            Self::ReplaceRoot(expr) => json!({ "newRoot": expr.to_document() }),
            Self::Count(field) => json!(field),
        };
        let mut stage = Map::new();
        stage.insert(self.name().to_string(), body);
        Value::Object(stage)
    }
}

/// Options forwarded to the store with a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateOptions {
    /// Allow large sorts and groups to spill to disk.
    pub allow_disk_use: bool,
}

/// Ordered list of stages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub const fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage.
    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Append several stages.
    pub fn extend(&mut self, stages: impl IntoIterator<Item = Stage>) {
        self.stages.extend(stages);
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage operator names in order, e.g. `["$match", "$project"]`.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Render as the store's JSON stage array.
    #[must_use]
    pub fn to_document(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::to_document).collect())
    }

    /// Compact JSON rendering.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        self.to_document().to_string()
    }
}
