//! Metric join
//!
//! Attaches the referenced metric series to each run and reduces each series
//! to the value of a metric column. The block explodes the run's metric
//! references, looks up the metric documents, then regroups by run id. Runs
//! without matching references pass through once with null metric columns.

use serde_json::Value;
use std::collections::BTreeSet;

use super::fields;
use crate::pipeline::{Accumulator, Expr, Lookup, Projection, Stage};
use crate::run::{Extrema, MetricColumnDefinition};

/// Narrowed copy of `info.metrics`, exploded to one reference per row.
pub const METRIC_REF: &str = "__metric_ref";
/// Lookup result: the referenced metric document, or nothing.
pub const METRIC_DOC: &str = "__metric";
/// Whole run document carried through the regroup.
pub const RUN_DOC: &str = "__run";
/// `{k: series, v: metric}` entries collected per run.
pub const METRIC_ENTRIES: &str = "__metric_entries";
/// Series name to metric document map; removed by the strip projection.
pub const METRICS_MAP: &str = "__metrics";
/// Key for rows whose reference matched nothing.
pub const UNMATCHED_KEY: &str = "__unmatched";

/// Reduction of one series to a column value.
type ExtremaRule = fn(Expr, i64) -> Expr;

fn min_rule(values: Expr, _: i64) -> Expr {
    Expr::Min(Box::new(values))
}

fn max_rule(values: Expr, _: i64) -> Expr {
    Expr::Max(Box::new(values))
}

fn avg_rule(values: Expr, _: i64) -> Expr {
    Expr::Avg(Box::new(values))
}

fn last_rule(values: Expr, _: i64) -> Expr {
    let non_empty = Expr::gt(
        Expr::Size(Box::new(Expr::if_null(values.clone(), Expr::lit(Value::Array(Vec::new()))))),
        Expr::lit(0),
    );
    Expr::cond(non_empty, Expr::ArrayElemAt(Box::new(values), -1), Expr::null())
}

fn last_n_avg_rule(values: Expr, n: i64) -> Expr {
    Expr::Avg(Box::new(Expr::Slice(Box::new(values), -n)))
}

const fn rule(extrema: Extrema) -> ExtremaRule {
    match extrema {
        Extrema::Min => min_rule,
        Extrema::Max => max_rule,
        Extrema::Avg => avg_rule,
        Extrema::Last => last_rule,
        Extrema::LastNAvg => last_n_avg_rule,
    }
}

/// Window used by `last_n_avg`; non-positive or missing windows become 1.
#[must_use]
pub fn window(column: &MetricColumnDefinition) -> i64 {
    column.last_n.unwrap_or(1).max(1)
}

/// Expression computing `column` from the joined metrics map.
#[must_use]
pub fn column_expr(column: &MetricColumnDefinition) -> Expr {
    let series = Expr::get_field(
        column.metric_name.clone(),
        Expr::field(METRICS_MAP),
    );
    let values = Expr::get_field("values", series);
    rule(column.extrema)(values, window(column))
}

/// Stages of the join block for the given metric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricJoinPlan {
    series: Vec<String>,
    stages: Vec<Stage>,
}

impl MetricJoinPlan {
    /// Build the join block.
    ///
    /// # Arguments
    ///
    /// * `columns` - Referenced metric columns (non-empty)
    /// * `metrics_collection` - Collection holding metric documents
    #[must_use]
    pub fn plan(columns: &[MetricColumnDefinition], metrics_collection: &str) -> Self {
        let series: Vec<String> = columns
            .iter()
            .map(|c| c.metric_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let matched = Expr::ArrayElemAt(Box::new(Expr::field(METRIC_DOC)), 0);
        let mut stages = vec![
            Stage::AddFields(vec![(
                METRIC_REF.to_string(),
                Expr::FilterIn {
                    input: Box::new(Expr::field(fields::METRIC_REFS)),
                    key: "name".to_string(),
                    values: series.iter().map(|s| Value::String(s.clone())).collect(),
                },
            )]),
            Stage::Unwind {
                path: METRIC_REF.to_string(),
                preserve_empty: true,
            },
            Stage::Lookup(Lookup {
                from: metrics_collection.to_string(),
                local_field: format!("{METRIC_REF}.id"),
                foreign_field: fields::ID.to_string(),
                restrict: Some(("name".to_string(), series.clone())),
                as_field: METRIC_DOC.to_string(),
            }),
            Stage::Group {
                id: Expr::field(fields::ID),
                accumulators: vec![
                    (RUN_DOC.to_string(), Accumulator::First(Expr::Root)),
                    (
                        METRIC_ENTRIES.to_string(),
                        Accumulator::Push(Expr::Object(vec![
                            (
                                "k".to_string(),
                                Expr::if_null(
                                    Expr::get_field("name", matched.clone()),
                                    Expr::lit(UNMATCHED_KEY),
                                ),
                            ),
                            ("v".to_string(), matched),
                        ])),
                    ),
                ],
            },
            Stage::ReplaceRoot(Expr::MergeObjects(vec![
                Expr::field(RUN_DOC),
                Expr::Object(vec![(
                    METRICS_MAP.to_string(),
                    Expr::ArrayToObject(Box::new(Expr::field(METRIC_ENTRIES))),
                )]),
            ])),
            Stage::Project(Projection::exclude([METRIC_REF, METRIC_DOC])),
        ];
        stages.push(Stage::AddFields(
            columns
                .iter()
                .map(|column| (column.name.clone(), column_expr(column)))
                .collect(),
        ));

        Self { series, stages }
    }

    /// Distinct series names the join narrows to, sorted.
    #[must_use]
    pub fn series(&self) -> &[String] {
        &self.series
    }

    /// Stages in order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Consume into the stage list.
    #[must_use]
    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }

    /// Helper fields the final strip projection must remove.
    pub const HELPER_FIELDS: &'static [&'static str] = &[METRICS_MAP];
}
