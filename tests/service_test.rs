//! Integration tests for the read endpoints
//!
//! Query-string parameters → RunQueryService → MemoryStore, with column
//! definitions read from the store on every call.

use chrono::{Duration, Utc};
use serde_json::json;
use trueno_runboard::config::CompilerConfig;
use trueno_runboard::query::RunQueryResponse;
use trueno_runboard::run::{
    CustomColumnDefinition, Extrema, MetricColumnDefinition, MetricRecord, RunRecord, RunStatus,
};
use trueno_runboard::service::{error_response, RunQueryParams, RunQueryService};
use trueno_runboard::store::MemoryStore;
use trueno_runboard::Error;

fn seeded_service() -> RunQueryService<MemoryStore> {
    let config = CompilerConfig::default();
    let store = MemoryStore::new();
    let now = Utc::now();

    store
        .insert_record(
            &config.metric_columns_collection,
            &MetricColumnDefinition::new("loss_min", "train.loss", Extrema::Min),
        )
        .unwrap();
    store
        .insert_record(
            &config.custom_columns_collection,
            &CustomColumnDefinition::new("lr", "config.lr"),
        )
        .unwrap();

    let runs = [
        RunRecord::builder(1)
            .status(RunStatus::Completed)
            .config(json!({"lr": 0.1}))
            .experiment_name("mnist")
            .start_time(now - Duration::hours(2))
            .heartbeat(now - Duration::hours(1))
            .metric("m1", "train.loss")
            .tag("baseline")
            .build(),
        RunRecord::builder(2)
            .status(RunStatus::Running)
            .config(json!({"lr": 0.01}))
            .experiment_name("mnist")
            .start_time(now - Duration::minutes(30))
            .heartbeat(now - Duration::seconds(5))
            .metric("m2", "train.loss")
            .tag("baseline")
            .tag("wide")
            .build(),
        RunRecord::builder(3)
            .status(RunStatus::Running)
            .config(json!({"lr": 0.001}))
            .experiment_name("cifar")
            .start_time(now - Duration::minutes(30))
            .heartbeat(now - Duration::seconds(121))
            .build(),
    ];
    for run in &runs {
        store.insert_record(&config.runs_collection, run).unwrap();
    }
    for (id, run_id, values) in [("m1", 1, [0.9, 0.4, 0.7]), ("m2", 2, [0.8, 0.6, 0.5])] {
        store
            .insert_record(
                &config.metrics_collection,
                &MetricRecord::builder(id, run_id, "train.loss").values(&values).build(),
            )
            .unwrap();
    }

    RunQueryService::new(store, config)
}

fn params(pairs: &[(&str, &str)]) -> RunQueryParams {
    RunQueryParams::from_pairs(pairs.iter().copied()).unwrap()
}

fn page(response: RunQueryResponse) -> Vec<serde_json::Value> {
    match response {
        RunQueryResponse::Page(rows) => rows,
        other => panic!("expected a page, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_runs_with_metric_and_synthetic_columns() {
    let service = seeded_service();
    let rows = page(
        service
            .list_runs(&params(&[
                ("select", "status,loss_min,lr"),
                ("sort_by", "id"),
                ("order_by", "1"),
            ]))
            .await
            .unwrap(),
    );

    assert_eq!(
        rows,
        vec![
            json!({"_id": 1, "status": "COMPLETED", "loss_min": 0.4, "config": {"lr": 0.1}}),
            json!({"_id": 2, "status": "RUNNING", "loss_min": 0.5, "config": {"lr": 0.01}}),
            json!({"_id": 3, "status": "PROBABLY_DEAD", "loss_min": null, "config": {"lr": 0.001}}),
        ]
    );
}

#[tokio::test]
async fn test_list_runs_default_order_and_limit() {
    let service = seeded_service();
    let rows = page(service.list_runs(&params(&[("limit", "2")])).await.unwrap());
    let ids: Vec<i64> = rows.iter().map(|r| r["_id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 2]);
    assert!(rows[0].get("config").is_some());
}

#[tokio::test]
async fn test_list_runs_sorted_by_metric() {
    let service = seeded_service();
    let rows = page(
        service
            .list_runs(&params(&[
                ("select", "loss_min"),
                ("sort_by", "loss_min"),
                ("order_by", "-1"),
                ("limit", "1"),
            ]))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["_id"], json!(2));
}

#[tokio::test]
async fn test_list_runs_filtered_by_query() {
    let service = seeded_service();
    let rows = page(
        service
            .list_runs(&params(&[
                ("select", "experiment_name"),
                ("query", r#"{"$or": [{"status": "PROBABLY_DEAD"}, {"config.lr": {"$gte": 0.1}}]}"#),
            ]))
            .await
            .unwrap(),
    );
    let ids: Vec<i64> = rows.iter().map(|r| r["_id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 1]);
    for row in &rows {
        assert!(row.get("status").is_none());
        assert!(row.get("heartbeat").is_none());
        assert!(row["config"].get("lr").is_none());
    }
}

#[tokio::test]
async fn test_distinct_short_circuits() {
    let service = seeded_service();
    let response = service
        .list_runs(&params(&[("distinct", "tags"), ("select", "status")]))
        .await
        .unwrap();
    assert_eq!(response, RunQueryResponse::Distinct(vec![json!("baseline"), json!("wide")]));

    let response = service
        .list_runs(&params(&[
            ("distinct", "experiment_name"),
            ("query", r#"{"config.lr": {"$lt": 0.05}}"#),
        ]))
        .await
        .unwrap();
    assert_eq!(response.into_json(), json!(["cifar", "mnist"]));
}

#[tokio::test]
async fn test_get_run() {
    let service = seeded_service();
    let response = service
        .get_run("3", &params(&[("select", "status")]))
        .await
        .unwrap();
    assert_eq!(
        response,
        RunQueryResponse::Document(Some(json!({"_id": 3, "status": "PROBABLY_DEAD"})))
    );

    let missing = service.get_run("404", &params(&[])).await.unwrap();
    assert_eq!(missing.into_json(), serde_json::Value::Null);
}

#[tokio::test]
async fn test_get_run_rejects_non_numeric_id() {
    let service = seeded_service();
    let err = service.get_run("abc", &params(&[])).await.unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { .. }));
    assert_eq!(error_response(&err).0, 400);
}

#[tokio::test]
async fn test_count_runs() {
    let service = seeded_service();
    let all = service
        .count_runs(&params(&[("limit", "1"), ("skip", "1"), ("select", "status")]))
        .await
        .unwrap();
    assert_eq!(all.into_json(), json!({"count": 3}));

    let running = service
        .count_runs(&params(&[("query", r#"{"status": "RUNNING"}"#)]))
        .await
        .unwrap();
    assert_eq!(running, RunQueryResponse::Count(1));

    let low_loss = service
        .count_runs(&params(&[("query", r#"{"loss_min": {"$lt": 0.45}}"#)]))
        .await
        .unwrap();
    assert_eq!(low_loss, RunQueryResponse::Count(1));
}

#[test]
fn test_malformed_query_never_reaches_the_store() {
    let err = RunQueryParams::from_pairs([("query", "{\"status\": ")]).unwrap_err();
    assert!(matches!(err, Error::InvalidFilterSyntax(_)));
    let (status, body) = error_response(&err);
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("Invalid filter syntax"));
}

#[tokio::test]
async fn test_store_failure_is_opaque() {
    let service = seeded_service();
    let err = service
        .list_runs(&params(&[("query", r#"{"config.lr": {"$regex": "^0"}}"#)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)));
    assert_eq!(error_response(&err), (500, json!({"error": "internal server error"})));
}

#[tokio::test]
async fn test_malformed_catalog_fails_the_request() {
    let service = seeded_service();
    service.store().insert(
        &service.compiler().config().metric_columns_collection,
        json!({"name": "broken", "extrema": "median"}),
    );
    let err = service.list_runs(&params(&[])).await.unwrap_err();
    assert!(matches!(err, Error::Catalog(_)));
    assert!(!err.is_client_error());
}
