//! Column catalog: user-defined metric and custom columns
//!
//! Loaded fresh for every request; definitions can change between requests.

use tracing::{debug, warn};

use crate::config::CompilerConfig;
use crate::run::{CustomColumnDefinition, Extrema, MetricColumnDefinition};
use crate::store::DocumentStore;
use crate::{Error, Result};

/// Display names that map onto a differently-named stored field.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("id", "_id"),
    ("experiment_name", "experiment.name"),
    ("tags", "omniboard.tags"),
    ("notes", "omniboard.notes"),
];

/// Current metric-column and custom-column definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnCatalog {
    metric_columns: Vec<MetricColumnDefinition>,
    custom_columns: Vec<CustomColumnDefinition>,
}

impl ColumnCatalog {
    /// Create a catalog from definitions.
    #[must_use]
    pub const fn new(
        metric_columns: Vec<MetricColumnDefinition>,
        custom_columns: Vec<CustomColumnDefinition>,
    ) -> Self {
        Self {
            metric_columns,
            custom_columns,
        }
    }

    /// Read both definition collections from the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Catalog`] if a stored definition cannot be decoded, or
    /// the store's error if a read fails.
    pub async fn load<S: DocumentStore>(store: &S, config: &CompilerConfig) -> Result<Self> {
        let metric_columns: Vec<MetricColumnDefinition> =
            decode(store.find_all(&config.metric_columns_collection).await?, "metric column")?;
        let custom_columns: Vec<CustomColumnDefinition> =
            decode(store.find_all(&config.custom_columns_collection).await?, "custom column")?;

        for column in &metric_columns {
            if column.extrema == Extrema::LastNAvg && column.last_n.unwrap_or(0) < 1 {
                warn!(
                    column = %column.name,
                    lastn = ?column.last_n,
                    "last_n_avg column without a positive window, averaging the last value only"
                );
            }
        }
        debug!(
            metric_columns = metric_columns.len(),
            custom_columns = custom_columns.len(),
            "loaded column catalog"
        );
        Ok(Self::new(metric_columns, custom_columns))
    }

    /// All metric-column definitions.
    #[must_use]
    pub fn metric_columns(&self) -> &[MetricColumnDefinition] {
        &self.metric_columns
    }

    /// All custom-column definitions.
    #[must_use]
    pub fn custom_columns(&self) -> &[CustomColumnDefinition] {
        &self.custom_columns
    }

    /// Metric column with this display name.
    #[must_use]
    pub fn metric_column(&self, name: &str) -> Option<&MetricColumnDefinition> {
        self.metric_columns.iter().find(|c| c.name == name)
    }

    /// Whether `name` is a metric column.
    #[must_use]
    pub fn is_metric_column(&self, name: &str) -> bool {
        self.metric_column(name).is_some()
    }

    /// Stored field behind a display column name.
    ///
    /// Custom columns resolve to their `config_path`, built-in aliases to
    /// their stored field; everything else is already a field name.
    #[must_use]
    pub fn resolve_column<'a>(&'a self, name: &'a str) -> &'a str {
        if let Some(custom) = self.custom_columns.iter().find(|c| c.name == name) {
            return &custom.config_path;
        }
        BUILTIN_ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map_or(name, |(_, field)| *field)
    }
}

fn decode<T: serde::de::DeserializeOwned>(docs: Vec<serde_json::Value>, what: &str) -> Result<Vec<T>> {
    docs.into_iter()
        .enumerate()
        .map(|(i, doc)| {
            serde_json::from_value(doc)
                .map_err(|e| Error::Catalog(format!("{what} #{i} is malformed: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_resolve_column() {
        let catalog = ColumnCatalog::new(
            vec![MetricColumnDefinition::new("loss_min", "train.loss", Extrema::Min)],
            vec![CustomColumnDefinition::new("lr", "config.optimizer.lr")],
        );
        assert_eq!(catalog.resolve_column("lr"), "config.optimizer.lr");
        assert_eq!(catalog.resolve_column("id"), "_id");
        assert_eq!(catalog.resolve_column("loss_min"), "loss_min");
        assert_eq!(catalog.resolve_column("status"), "status");
        assert!(catalog.is_metric_column("loss_min"));
        assert!(!catalog.is_metric_column("lr"));
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let store = MemoryStore::new();
        let config = CompilerConfig::default();
        store.insert(
            &config.metric_columns_collection,
            json!({"name": "acc_max", "metric_name": "val.acc", "extrema": "max"}),
        );
        store.insert(
            &config.custom_columns_collection,
            json!({"name": "batch", "config_path": "config.batch_size"}),
        );

        let catalog = ColumnCatalog::load(&store, &config).await.unwrap();
        assert_eq!(catalog.metric_columns().len(), 1);
        assert_eq!(catalog.custom_columns().len(), 1);
        assert_eq!(catalog.metric_column("acc_max").map(|c| c.extrema), Some(Extrema::Max));
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_definition() {
        let store = MemoryStore::new();
        let config = CompilerConfig::default();
        store.insert(&config.metric_columns_collection, json!({"name": "broken"}));

        let result = ColumnCatalog::load(&store, &config).await;
        assert!(matches!(result, Err(Error::Catalog(_))));
    }
}
