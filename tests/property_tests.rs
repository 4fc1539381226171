//! Property-based tests for trueno-runboard
//!
//! - Filter field extraction never reports operators
//! - Liveness classification matches the threshold rule for any heartbeat age
//! - Compilation is deterministic and count requests never paginate
//! - Run with ProptestConfig::with_cases(100)

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use trueno_runboard::pipeline::{format_timestamp, OrderDirection, ProjectionMode, Stage};
use trueno_runboard::query::{referenced_fields, ColumnCatalog, RunQuery, RunQueryCompiler};
use trueno_runboard::run::{Extrema, MetricColumnDefinition, RunStatus};
use trueno_runboard::store::MemoryStore;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn catalog() -> ColumnCatalog {
    ColumnCatalog::new(
        vec![
            MetricColumnDefinition::new("loss_min", "train.loss", Extrema::Min),
            MetricColumnDefinition::new("acc_last", "val.acc", Extrema::Last),
        ],
        Vec::new(),
    )
}

/// Dotted field names such as `config.lr`
fn arb_field() -> impl Strategy<Value = String> {
    "[a-z]{1,6}(\\.[a-z]{1,6})?"
}

fn arb_condition() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{0,4}".prop_map(|s| json!(s)),
        any::<i32>().prop_map(|n| json!({"$gt": n})),
        prop::collection::vec(any::<i32>(), 1..4).prop_map(|ns| json!({"$in": ns})),
        any::<i32>().prop_map(|n| json!({"$not": {"$lte": n}})),
    ]
}

/// Filters built from leaf clauses under nested `$and`/`$or`, with the
/// fields they reference.
fn arb_filter() -> impl Strategy<Value = (Value, BTreeSet<String>)> {
    let leaf = (arb_field(), arb_condition()).prop_map(|(field, condition)| {
        let mut clause = serde_json::Map::new();
        clause.insert(field.clone(), condition);
        (Value::Object(clause), BTreeSet::from([field]))
    });
    leaf.prop_recursive(3, 16, 4, |inner| {
        (prop::bool::ANY, prop::collection::vec(inner, 1..4)).prop_map(|(any_of, terms)| {
            let op = if any_of { "$or" } else { "$and" };
            let fields = terms.iter().flat_map(|(_, f)| f.iter().cloned()).collect();
            let clauses: Vec<Value> = terms.into_iter().map(|(clause, _)| clause).collect();
            let mut combined = serde_json::Map::new();
            combined.insert(op.to_string(), Value::Array(clauses));
            (Value::Object(combined), fields)
        })
    })
}

fn arb_stored_status() -> impl Strategy<Value = RunStatus> {
    prop_oneof![
        Just(RunStatus::Running),
        Just(RunStatus::Completed),
        Just(RunStatus::Failed),
        Just(RunStatus::Interrupted),
        Just(RunStatus::Timeout),
        Just(RunStatus::Queued),
    ]
}

fn arb_selection() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(
        vec!["status", "duration", "loss_min", "acc_last", "config.lr", "tags"],
        0..6,
    )
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: every leaf field is reported and no operator is
    #[test]
    fn prop_filter_fields_exclude_operators((filter, expected) in arb_filter()) {
        let fields = referenced_fields(&filter);
        prop_assert!(fields.iter().all(|f| !f.starts_with('$')));
        prop_assert_eq!(fields, expected);
    }

    /// Property: only a stale RUNNING run is PROBABLY_DEAD
    #[test]
    fn prop_liveness_threshold(
        status in arb_stored_status(),
        age_ms in 0i64..600_000,
        use_heartbeat in prop::bool::ANY,
    ) {
        let last_seen = format_timestamp(now() - Duration::milliseconds(age_ms));
        let mut run = json!({"_id": 1, "status": status.as_str()});
        let key = if use_heartbeat { "heartbeat" } else { "start_time" };
        run[key] = json!(last_seen);

        let store = MemoryStore::new();
        store.insert("runs", run);
        let compiled = RunQueryCompiler::default().compile(
            &RunQuery::list().select(["status"]),
            &catalog(),
            now(),
        );
        let rows = store.run_pipeline("runs", compiled.pipeline()).unwrap();

        let expected = if status == RunStatus::Running && age_ms > 120_000 {
            RunStatus::ProbablyDead
        } else {
            status
        };
        prop_assert_eq!(rows[0]["status"].as_str(), Some(expected.as_str()));
    }

    /// Property: duration is heartbeat minus start time in milliseconds
    #[test]
    fn prop_duration(start_ago in 1i64..1_000_000, elapsed in 0i64..1_000_000) {
        let start = now() - Duration::milliseconds(start_ago + elapsed);
        let heartbeat = start + Duration::milliseconds(elapsed);
        let store = MemoryStore::new();
        store.insert("runs", json!({
            "_id": 1,
            "start_time": format_timestamp(start),
            "heartbeat": format_timestamp(heartbeat),
        }));
        let compiled = RunQueryCompiler::default().compile(
            &RunQuery::list().select(["duration"]),
            &catalog(),
            now(),
        );
        let rows = store.run_pipeline("runs", compiled.pipeline()).unwrap();
        prop_assert_eq!(&rows[0], &json!({"_id": 1, "duration": elapsed}));
    }

    /// Property: compiling twice yields byte-identical pipelines
    #[test]
    fn prop_compile_is_deterministic(
        selection in arb_selection(),
        (filter, _) in arb_filter(),
        skip in 0u64..1000,
        limit in 1u64..500,
        ascending in prop::bool::ANY,
    ) {
        let order = if ascending { OrderDirection::Asc } else { OrderDirection::Desc };
        let query = RunQuery::list()
            .select(selection)
            .filter(filter)
            .sort_by("loss_min", order)
            .skip(skip)
            .limit(limit);
        let compiler = RunQueryCompiler::default();
        let first = compiler.compile(&query, &catalog(), now()).pipeline().to_json_string();
        let second = compiler.compile(&query, &catalog(), now()).pipeline().to_json_string();
        prop_assert_eq!(first, second);
    }

    /// Property: count requests never sort, skip or limit
    #[test]
    fn prop_count_never_paginates(
        selection in arb_selection(),
        (filter, _) in arb_filter(),
        skip in 0u64..1000,
        limit in 1u64..500,
    ) {
        let query = RunQuery::count()
            .select(selection)
            .filter(filter)
            .sort_by("loss_min", OrderDirection::Asc)
            .skip(skip)
            .limit(limit);
        let compiled = RunQueryCompiler::default().compile(&query, &catalog(), now());
        let stages = compiled.pipeline().stages();
        prop_assert!(!stages
            .iter()
            .any(|stage| matches!(stage, Stage::Sort(_) | Stage::Skip(_) | Stage::Limit(_))));
        prop_assert!(!stages
            .iter()
            .any(|stage| matches!(stage, Stage::Project(p) if p.mode() == ProjectionMode::Include)));
        prop_assert!(matches!(stages.last(), Some(Stage::Count(_))));
    }
}
