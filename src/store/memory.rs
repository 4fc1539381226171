//! In-memory document store using `DashMap`.
//!
//! Reference backend for tests and demos. Every read works on a snapshot of
//! the collection taken when the call starts.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use super::document::{compare_values, get_path, values_equal};
use super::eval::{apply_stage, matches};
use super::DocumentStore;
use crate::pipeline::{AggregateOptions, Pipeline};
use crate::Result;

/// In-memory store of JSON documents grouped by collection name.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trueno_runboard::store::{DocumentStore, MemoryStore};
///
/// # async fn example() -> trueno_runboard::Result<()> {
/// let store = MemoryStore::new();
/// store.insert("runs", json!({"_id": 1, "status": "RUNNING"}));
/// assert_eq!(store.find_all("runs").await?.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    collections: DashMap<String, Vec<Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    /// Append a raw document.
    pub fn insert(&self, collection: &str, doc: Value) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    /// Serialize a record and append it.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be serialized.
    pub fn insert_record<T: Serialize>(&self, collection: &str, record: &T) -> Result<()> {
        self.insert(collection, serde_json::to_value(record)?);
        Ok(())
    }

    /// Replace the document whose `_id` equals `id`, or append it.
    pub fn upsert(&self, collection: &str, id: &Value, doc: Value) {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        match docs
            .iter_mut()
            .find(|existing| get_path(existing, "_id").is_some_and(|v| values_equal(v, id)))
        {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |docs| docs.len())
    }

    /// Whether the store holds no documents at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.iter().all(|entry| entry.value().is_empty())
    }

    /// Drop every collection.
    pub fn clear(&self) {
        self.collections.clear();
    }

    fn snapshot(&self, collection: &str) -> Vec<Value> {
        self.collections
            .get(collection)
            .map(|docs| docs.value().clone())
            .unwrap_or_default()
    }

    /// Evaluate a pipeline synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if any stage fails to evaluate.
    pub fn run_pipeline(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>> {
        let resolve = |name: &str| self.snapshot(name);
        pipeline
            .stages()
            .iter()
            .try_fold(self.snapshot(collection), |docs, stage| {
                trace!(stage = stage.name(), rows = docs.len(), "applying stage");
                apply_stage(stage, docs, &resolve)
            })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        _options: AggregateOptions,
    ) -> Result<Vec<Value>> {
        self.run_pipeline(collection, pipeline)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Value>> {
        Ok(self.snapshot(collection))
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<&Value>,
    ) -> Result<Vec<Value>> {
        let mut values: Vec<Value> = Vec::new();
        for doc in self.snapshot(collection) {
            if let Some(filter) = filter {
                if !matches(filter, &doc)? {
                    continue;
                }
            }
            let found = match get_path(&doc, field) {
                Some(Value::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in found {
                if !values.iter().any(|seen| values_equal(seen, &value)) {
                    values.push(value);
                }
            }
        }
        values.sort_by(compare_values);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{OrderDirection, SortSpec, Stage};
    use serde_json::json;

    #[tokio::test]
    async fn test_aggregate_missing_collection_is_empty() {
        let store = MemoryStore::new();
        let out = store
            .aggregate("runs", &Pipeline::new(), AggregateOptions::default())
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_sort_and_limit() {
        let store = MemoryStore::new();
        for id in [3, 1, 2] {
            store.insert("runs", json!({"_id": id}));
        }
        let mut pipeline = Pipeline::new();
        pipeline.push(Stage::Sort(SortSpec::by("_id", OrderDirection::Desc)));
        pipeline.push(Stage::Limit(2));

        let out = store
            .aggregate("runs", &pipeline, AggregateOptions::default())
            .await
            .unwrap();
        assert_eq!(out, vec![json!({"_id": 3}), json!({"_id": 2})]);
    }

    #[tokio::test]
    async fn test_distinct_flattens_and_filters() {
        let store = MemoryStore::new();
        store.insert("runs", json!({"_id": 1, "status": "RUNNING", "omniboard": {"tags": ["a", "b"]}}));
        store.insert("runs", json!({"_id": 2, "status": "FAILED", "omniboard": {"tags": ["b", "c"]}}));
        store.insert("runs", json!({"_id": 3, "status": "RUNNING"}));

        let all = store.distinct("runs", "omniboard.tags", None).await.unwrap();
        assert_eq!(all, vec![json!("a"), json!("b"), json!("c")]);

        let running = store
            .distinct("runs", "omniboard.tags", Some(&json!({"status": "RUNNING"})))
            .await
            .unwrap();
        assert_eq!(running, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let store = MemoryStore::new();
        store.upsert("runs", &json!(1), json!({"_id": 1, "status": "RUNNING"}));
        store.upsert("runs", &json!(1), json!({"_id": 1, "status": "COMPLETED"}));
        assert_eq!(store.len("runs"), 1);
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
    }
}
