//! Document store seam
//!
//! The compiler only builds pipelines; executing them belongs to the store.
//! [`DocumentStore`] is the read surface the service needs, and
//! [`MemoryStore`] is an in-memory implementation that evaluates the full
//! pipeline IR.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use trueno_runboard::pipeline::{AggregateOptions, Pipeline, Stage};
//! use trueno_runboard::store::{DocumentStore, MemoryStore};
//!
//! # async fn example() -> trueno_runboard::Result<()> {
//! let store = MemoryStore::new();
//! store.insert("runs", json!({"_id": 1, "status": "FAILED"}));
//! store.insert("runs", json!({"_id": 2, "status": "RUNNING"}));
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.push(Stage::Match(json!({"status": "RUNNING"})));
//! let rows = store.aggregate("runs", &pipeline, AggregateOptions::default()).await?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod document;
mod eval;
mod memory;

pub use memory::MemoryStore;

use crate::pipeline::{AggregateOptions, Pipeline};
use crate::Result;
use serde_json::Value;
use std::future::Future;

/// Read access to a document database.
///
/// Each call is expected to observe one consistent snapshot of the data.
pub trait DocumentStore: Send + Sync {
    /// Run a pipeline against `collection`.
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        options: AggregateOptions,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Every document of a small collection (column catalogs).
    fn find_all(&self, collection: &str) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Distinct values of `field` among documents matching `filter`.
    ///
    /// Array values contribute their elements.
    fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<&Value>,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;
}
