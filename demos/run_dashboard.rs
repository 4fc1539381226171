//! Run Dashboard Example
//!
//! Seeds an in-memory store with a handful of training runs, configures
//! metric and custom columns, then serves the three read endpoints the
//! dashboard grid uses.
//!
//! Run with: RUST_LOG=debug cargo run --example run_dashboard

use chrono::{Duration, Utc};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use trueno_runboard::config::CompilerConfig;
use trueno_runboard::run::{
    CustomColumnDefinition, Extrema, MetricColumnDefinition, MetricRecord, RunRecord, RunStatus,
};
use trueno_runboard::service::{error_response, RunQueryParams, RunQueryService};
use trueno_runboard::store::MemoryStore;

fn seed(store: &MemoryStore, config: &CompilerConfig) -> anyhow::Result<()> {
    let now = Utc::now();

    store.insert_record(
        &config.metric_columns_collection,
        &MetricColumnDefinition::new("best_loss", "train.loss", Extrema::Min),
    )?;
    store.insert_record(
        &config.metric_columns_collection,
        &MetricColumnDefinition::new("recent_acc", "val.acc", Extrema::LastNAvg).with_last_n(3),
    )?;
    store.insert_record(
        &config.custom_columns_collection,
        &CustomColumnDefinition::new("lr", "config.optimizer.lr"),
    )?;

    let runs = [
        (1, RunStatus::Completed, 0.1, now - Duration::hours(3), now - Duration::hours(2)),
        (2, RunStatus::Running, 0.01, now - Duration::minutes(40), now - Duration::seconds(10)),
        (3, RunStatus::Running, 0.001, now - Duration::minutes(50), now - Duration::minutes(15)),
        (4, RunStatus::Failed, 0.5, now - Duration::hours(1), now - Duration::minutes(55)),
    ];

    for (id, status, lr, start, heartbeat) in runs {
        let loss_id = format!("loss-{id}");
        let acc_id = format!("acc-{id}");
        let run = RunRecord::builder(id)
            .status(status)
            .config(json!({"optimizer": {"name": "adam", "lr": lr}, "epochs": 10}))
            .experiment_name("resnet50")
            .start_time(start)
            .heartbeat(heartbeat)
            .metric(loss_id.clone(), "train.loss")
            .metric(acc_id.clone(), "val.acc")
            .tag(if id % 2 == 0 { "sweep" } else { "baseline" })
            .build();
        store.insert_record(&config.runs_collection, &run)?;

        let scale = 1.0 + lr * 10.0;
        let loss: Vec<f64> = (1..=8_u32).map(|step| scale / f64::from(step)).collect();
        let acc: Vec<f64> = (1..=8_u32).map(|step| 1.0 - 0.5 / (scale * f64::from(step))).collect();
        store.insert_record(
            &config.metrics_collection,
            &MetricRecord::builder(loss_id, id, "train.loss").values(&loss).build(),
        )?;
        store.insert_record(
            &config.metrics_collection,
            &MetricRecord::builder(acc_id, id, "val.acc").values(&acc).build(),
        )?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Trueno-Runboard Dashboard ===\n");

    let config = CompilerConfig::builder().probably_dead_after_ms(120_000).build();
    let store = MemoryStore::new();
    seed(&store, &config)?;
    let service = RunQueryService::new(store, config);

    // -------------------------------------------------------------------------
    // 1. Grid page sorted by a metric column
    // -------------------------------------------------------------------------
    println!("1. Runs by best loss:");
    let params = RunQueryParams::from_pairs([
        ("select", "status,duration,best_loss,recent_acc,lr"),
        ("sort_by", "best_loss"),
        ("order_by", "1"),
        ("limit", "10"),
    ])?;
    let page = service.list_runs(&params).await?;
    println!("{}\n", serde_json::to_string_pretty(&page.into_json())?);

    // -------------------------------------------------------------------------
    // 2. Filter on the synthesized status
    // -------------------------------------------------------------------------
    println!("2. Stale runs:");
    let params = RunQueryParams::from_pairs([
        ("select", "status,heartbeat"),
        ("query", r#"{"status": "PROBABLY_DEAD"}"#),
    ])?;
    let stale = service.list_runs(&params).await?;
    println!("{}\n", serde_json::to_string_pretty(&stale.into_json())?);

    // -------------------------------------------------------------------------
    // 3. Single run and count
    // -------------------------------------------------------------------------
    println!("3. Run 2 and the low-loss count:");
    let run = service
        .get_run("2", &RunQueryParams::from_pairs([("select", "status,best_loss")])?)
        .await?;
    println!("{}", serde_json::to_string_pretty(&run.into_json())?);
    let count = service
        .count_runs(&RunQueryParams::from_pairs([("query", r#"{"best_loss": {"$lt": 0.2}}"#)])?)
        .await?;
    println!("{}\n", count.into_json());

    // -------------------------------------------------------------------------
    // 4. Distinct values and client errors
    // -------------------------------------------------------------------------
    println!("4. Distinct tags:");
    let tags = service
        .list_runs(&RunQueryParams::from_pairs([("distinct", "tags")])?)
        .await?;
    println!("{}", tags.into_json());

    match RunQueryParams::from_pairs([("query", "{not json")]) {
        Ok(_) => println!("unexpectedly accepted a malformed filter"),
        Err(err) => {
            let (status, body) = error_response(&err);
            println!("malformed filter -> {status} {body}");
        }
    }

    Ok(())
}
