//! Pipeline assembly and response shaping

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::catalog::ColumnCatalog;
use super::fields;
use super::filter::referenced_fields;
use super::metric_join::MetricJoinPlan;
use super::projection::ProjectionPlan;
use super::sort::{SortContext, SortPlan};
use super::synthetic::synthetic_stage;
use super::{QueryMode, RunQuery};
use crate::config::CompilerConfig;
use crate::pipeline::{AggregateOptions, Pipeline, Stage};
use crate::store::DocumentStore;
use crate::Result;

fn single_field(name: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), value);
    Value::Object(map)
}

/// A compiled request, ready to run against a store.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    mode: QueryMode,
    collection: String,
    pipeline: Pipeline,
    options: AggregateOptions,
}

impl CompiledQuery {
    /// Request mode the response is shaped for.
    #[must_use]
    pub const fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Collection the pipeline runs against.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Options forwarded to the store.
    #[must_use]
    pub const fn options(&self) -> AggregateOptions {
        self.options
    }
}

/// Shaped result of a read request.
#[derive(Debug, Clone, PartialEq)]
pub enum RunQueryResponse {
    /// Single-run request; `None` when no run has that id.
    Document(Option<Value>),
    /// Page of runs.
    Page(Vec<Value>),
    /// Number of matching runs.
    Count(u64),
    /// Distinct field values.
    Distinct(Vec<Value>),
}

impl RunQueryResponse {
    /// JSON body: the document or `null`, an array, or `{"count": n}`.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self {
            Self::Document(doc) => doc.unwrap_or(Value::Null),
            Self::Page(rows) | Self::Distinct(rows) => Value::Array(rows),
            Self::Count(n) => single_field(fields::COUNT, json!(n)),
        }
    }

    /// Number of documents or values carried; a count is one row.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Document(doc) => usize::from(doc.is_some()),
            Self::Page(rows) | Self::Distinct(rows) => rows.len(),
            Self::Count(_) => 1,
        }
    }
}

/// Compiles [`RunQuery`] requests into pipelines.
#[derive(Debug, Clone, Default)]
pub struct RunQueryCompiler {
    config: CompilerConfig,
}

impl RunQueryCompiler {
    /// Create a compiler.
    #[must_use]
    pub const fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Compiler configuration.
    #[must_use]
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a request.
    ///
    /// `now` is the single reference instant for the liveness rule; the
    /// output depends only on the arguments.
    #[must_use]
    pub fn compile(&self, query: &RunQuery, catalog: &ColumnCatalog, now: DateTime<Utc>) -> CompiledQuery {
        let mode = query.mode();
        let paginated = mode == QueryMode::List;

        let selection: Vec<String> = match mode {
            QueryMode::Count => Vec::new(),
            QueryMode::List | QueryMode::Single(_) => query
                .selection()
                .iter()
                .map(|column| catalog.resolve_column(column).to_string())
                .collect(),
        };
        let filter_fields = query
            .filter_value()
            .map(referenced_fields)
            .unwrap_or_default();
        let sort_field = if paginated {
            query.sort_column().map(|column| catalog.resolve_column(column))
        } else {
            None
        };

        let projection = ProjectionPlan::plan(&selection, &filter_fields, sort_field, catalog);
        let join = projection
            .metric_column_projection_required()
            .then(|| MetricJoinPlan::plan(projection.metric_columns(), &self.config.metrics_collection));
        let filter_deferred = filter_fields.iter().any(|f| catalog.is_metric_column(f));

        let sort = SortPlan::plan(
            sort_field,
            query.order_direction(),
            query.skip_count(),
            self.config
                .clamp_limit(
                    query
                        .limit_count()
                        .filter(|&limit| limit > 0)
                        .unwrap_or(self.config.default_limit),
                ),
            SortContext {
                unpaginated: !paginated,
                join: join.is_some(),
                sort_on_metric: sort_field.is_some_and(|f| catalog.is_metric_column(f)),
                filter_deferred,
            },
        );

        let mut pipeline = Pipeline::new();
        if let QueryMode::Single(id) = mode {
            pipeline.push(Stage::Match(single_field(fields::ID, json!(id))));
        }
        pipeline.extend(projection.inclusion_stage());
        pipeline.extend(synthetic_stage(
            projection.synthetic(),
            now,
            self.config.probably_dead_after_ms,
        ));
        let filter_stage = query.filter_value().cloned().map(Stage::Match);
        if !filter_deferred {
            pipeline.extend(filter_stage.clone());
        }
        pipeline.extend(sort.early_stages());
        let helpers: &[&str] = if let Some(join) = join {
            pipeline.extend(join.into_stages());
            pipeline.extend(sort.resort_stage());
            MetricJoinPlan::HELPER_FIELDS
        } else {
            &[]
        };
        if filter_deferred {
            pipeline.extend(filter_stage);
        }
        pipeline.extend(sort.late_stages());
        pipeline.extend(projection.strip_stage(helpers.iter().copied()));
        if mode == QueryMode::Count {
            pipeline.push(Stage::Count(fields::COUNT.to_string()));
        }

        debug!(
            mode = ?mode,
            stages = pipeline.len(),
            join = projection.metric_column_projection_required(),
            filter_deferred,
            placement = ?sort.placement(),
            "compiled run query"
        );

        CompiledQuery {
            mode,
            collection: self.config.runs_collection.clone(),
            pipeline,
            options: AggregateOptions {
                allow_disk_use: self.config.allow_disk_use,
            },
        }
    }

    /// Run a compiled request and shape the rows.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the pipeline fails; nothing is retried.
    pub async fn execute<S: DocumentStore>(
        &self,
        store: &S,
        compiled: &CompiledQuery,
    ) -> Result<RunQueryResponse> {
        let rows = store
            .aggregate(compiled.collection(), compiled.pipeline(), compiled.options())
            .await?;
        Ok(match compiled.mode() {
            QueryMode::Single(_) => RunQueryResponse::Document(rows.into_iter().next()),
            QueryMode::Count => RunQueryResponse::Count(
                rows.first()
                    .and_then(|row| row.get(fields::COUNT))
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            ),
            QueryMode::List => RunQueryResponse::Page(rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::OrderDirection;
    use crate::run::{Extrema, MetricColumnDefinition};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn catalog() -> ColumnCatalog {
        ColumnCatalog::new(
            vec![MetricColumnDefinition::new("loss_min", "train.loss", Extrema::Min)],
            Vec::new(),
        )
    }

    fn stage_names(query: &RunQuery) -> Vec<&'static str> {
        RunQueryCompiler::default()
            .compile(query, &catalog(), now())
            .pipeline()
            .stage_names()
    }

    #[test]
    fn test_plain_list() {
        assert_eq!(stage_names(&RunQuery::list()), vec!["$sort", "$limit"]);
    }

    #[test]
    fn test_single_mode_matches_id_without_pagination() {
        let compiled = RunQueryCompiler::default().compile(&RunQuery::single(7).skip(3), &catalog(), now());
        assert_eq!(compiled.pipeline().stage_names(), vec!["$match"]);
        assert_eq!(
            compiled.pipeline().stages()[0].to_document(),
            json!({"$match": {"_id": 7}})
        );
    }

    #[test]
    fn test_count_ignores_select_sort_and_page() {
        let query = RunQuery::count()
            .select(["config.lr"])
            .sort_by("loss_min", OrderDirection::Asc)
            .skip(10)
            .limit(5)
            .filter(json!({"status": "FAILED"}));
        assert_eq!(stage_names(&query), vec!["$addFields", "$match", "$count"]);
    }

    #[test]
    fn test_metric_sort_defers_pagination() {
        let query = RunQuery::list().sort_by("loss_min", OrderDirection::Asc).limit(10);
        let names = stage_names(&query);
        let join_end = names.iter().rposition(|n| *n == "$addFields").unwrap();
        let sort_at = names.iter().position(|n| *n == "$sort").unwrap();
        assert!(sort_at > join_end);
        assert_eq!(names.last(), Some(&"$project"));
    }

    #[test]
    fn test_metric_filter_is_deferred() {
        let query = RunQuery::list().filter(json!({"loss_min": {"$lt": 0.5}}));
        let names = stage_names(&query);
        let lookup_at = names.iter().position(|n| *n == "$lookup").unwrap();
        let match_at = names.iter().position(|n| *n == "$match").unwrap();
        assert!(match_at > lookup_at);
    }

    #[test]
    fn test_plain_sort_with_join_resorts_after_join() {
        let query = RunQuery::list().select(["loss_min"]);
        let names = stage_names(&query);
        assert_eq!(&names[..3], ["$project", "$sort", "$limit"]);
        assert_eq!(names.iter().filter(|n| **n == "$sort").count(), 2);
    }

    #[test]
    fn test_limit_is_clamped() {
        let config = CompilerConfig::builder().max_limit(50).build();
        let compiled = RunQueryCompiler::new(config).compile(&RunQuery::list().limit(500), &catalog(), now());
        assert_eq!(compiled.pipeline().stages()[1], Stage::Limit(50));
    }

    #[test]
    fn test_zero_limit_uses_default() {
        let config = CompilerConfig::builder().default_limit(25).build();
        let compiled = RunQueryCompiler::new(config).compile(&RunQuery::list().limit(0), &catalog(), now());
        assert_eq!(compiled.pipeline().stages()[1], Stage::Limit(25));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let query = RunQuery::list()
            .select(["status", "loss_min", "duration"])
            .filter(json!({"$or": [{"config.lr": {"$gt": 0.1}}, {"loss_min": {"$lt": 1}}]}))
            .sort_by("duration", OrderDirection::Asc);
        let compiler = RunQueryCompiler::default();
        let first = compiler.compile(&query, &catalog(), now()).pipeline().to_json_string();
        let second = compiler.compile(&query, &catalog(), now()).pipeline().to_json_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_response_json() {
        assert_eq!(RunQueryResponse::Count(3).into_json(), json!({"count": 3}));
        assert_eq!(RunQueryResponse::Document(None).into_json(), Value::Null);
        assert_eq!(RunQueryResponse::Page(vec![json!(1)]).into_json(), json!([1]));
    }
}
