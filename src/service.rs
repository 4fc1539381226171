//! Read endpoints over the run-query compiler
//!
//! Request parameters arrive as string pairs (a decoded query string).
//! [`RunQueryParams`] validates them before anything is compiled, and
//! [`RunQueryService`] is the fault boundary: execution failures are logged
//! here in full and reach the caller only as an opaque message.
//!
//! # Example
//!
//! ```rust
//! use trueno_runboard::config::CompilerConfig;
//! use trueno_runboard::service::{RunQueryParams, RunQueryService};
//! use trueno_runboard::store::MemoryStore;
//!
//! # async fn example() -> trueno_runboard::Result<()> {
//! let service = RunQueryService::new(MemoryStore::new(), CompilerConfig::default());
//! let params = RunQueryParams::from_pairs([("select", "status,duration"), ("limit", "20")])?;
//! let page = service.list_runs(&params).await?;
//! assert_eq!(page.row_count(), 0);
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::CompilerConfig;
use crate::pipeline::OrderDirection;
use crate::query::{parse_query, ColumnCatalog, QueryMode, RunQuery, RunQueryCompiler, RunQueryResponse};
use crate::store::DocumentStore;
use crate::{Error, Result};

/// Validated read-request parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunQueryParams {
    limit: Option<u64>,
    skip: u64,
    sort_by: Option<String>,
    order: Option<OrderDirection>,
    select: Vec<String>,
    distinct: Option<String>,
    query: Option<Value>,
}

impl RunQueryParams {
    /// Parse `limit`, `skip`, `sort_by`, `order_by`, `select`, `distinct`
    /// and `query`. Unknown keys and empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a non-numeric `limit`, `skip`
    /// or `order_by`, and [`Error::InvalidFilterSyntax`] for a `query` that is
    /// not a JSON object.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            if value.is_empty() {
                continue;
            }
            match key {
                "limit" => match parse_number(key, value)? {
                    0 => return Err(Error::invalid_parameter(key, "must be at least 1")),
                    limit => params.limit = Some(limit),
                },
                "skip" => params.skip = parse_number(key, value)?,
                "sort_by" => params.sort_by = Some(value.to_string()),
                "order_by" => {
                    let sign: i64 = value
                        .parse()
                        .map_err(|_| Error::invalid_parameter(key, "expected 1 or -1"))?;
                    params.order = Some(OrderDirection::from_sign(sign));
                }
                "select" => {
                    params.select = value
                        .split(',')
                        .map(str::trim)
                        .filter(|column| !column.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "distinct" => params.distinct = Some(value.to_string()),
                "query" => params.query = parse_query(value)?,
                other => debug!(parameter = other, "ignoring unknown parameter"),
            }
        }
        Ok(params)
    }

    /// Page size.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Rows to skip.
    #[must_use]
    pub const fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Sort column and direction.
    #[must_use]
    pub fn sort_by(mut self, column: impl Into<String>, order: OrderDirection) -> Self {
        self.sort_by = Some(column.into());
        self.order = Some(order);
        self
    }

    /// Selected columns.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Return distinct values of this column instead of runs.
    #[must_use]
    pub fn distinct(mut self, column: impl Into<String>) -> Self {
        self.distinct = Some(column.into());
        self
    }

    /// Filter; `null` and `{}` mean none.
    #[must_use]
    pub fn query(mut self, filter: Value) -> Self {
        self.query = match filter {
            Value::Null => None,
            Value::Object(ref map) if map.is_empty() => None,
            other => Some(other),
        };
        self
    }

    /// Parsed filter, if any.
    #[must_use]
    pub const fn filter(&self) -> Option<&Value> {
        self.query.as_ref()
    }

    /// Build the compiler input for `mode`.
    #[must_use]
    pub fn to_query(&self, mode: QueryMode) -> RunQuery {
        let base = match mode {
            QueryMode::List => RunQuery::list(),
            QueryMode::Single(id) => RunQuery::single(id),
            QueryMode::Count => RunQuery::count(),
        };
        let mut query = base.select(self.select.iter().cloned()).skip(self.skip);
        if let Some(filter) = &self.query {
            query = query.filter(filter.clone());
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        let order = self.order.unwrap_or(OrderDirection::Desc);
        match &self.sort_by {
            Some(column) => query.sort_by(column.clone(), order),
            None => query.order(order),
        }
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::invalid_parameter(name, format!("expected a non-negative integer, got `{value}`")))
}

/// List, get and count runs.
pub struct RunQueryService<S> {
    store: S,
    compiler: RunQueryCompiler,
}

impl<S: DocumentStore> RunQueryService<S> {
    /// Create a service over `store`.
    pub const fn new(store: S, config: CompilerConfig) -> Self {
        Self {
            store,
            compiler: RunQueryCompiler::new(config),
        }
    }

    /// Underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Compiler used for every request.
    pub const fn compiler(&self) -> &RunQueryCompiler {
        &self.compiler
    }

    /// A page of runs, or distinct values when `distinct` is set.
    ///
    /// # Errors
    ///
    /// Returns the catalog or store error; see [`Error::public_message`]
    /// for what the caller should see.
    pub async fn list_runs(&self, params: &RunQueryParams) -> Result<RunQueryResponse> {
        let result = match &params.distinct {
            Some(column) => self.distinct(column, params.filter()).await,
            None => self.run(params.to_query(QueryMode::List)).await,
        };
        report("list_runs", result)
    }

    /// One run by id; `Document(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `id` is not an integer, else
    /// the catalog or store error.
    pub async fn get_run(&self, id: &str, params: &RunQueryParams) -> Result<RunQueryResponse> {
        let result = match id.trim().parse::<i64>() {
            Ok(id) => self.run(params.to_query(QueryMode::Single(id))).await,
            Err(_) => Err(Error::invalid_parameter("id", format!("`{id}` is not a run id"))),
        };
        report("get_run", result)
    }

    /// Number of runs matching the filter; selection, sort and page are ignored.
    ///
    /// # Errors
    ///
    /// Returns the catalog or store error.
    pub async fn count_runs(&self, params: &RunQueryParams) -> Result<RunQueryResponse> {
        let result = self.run(params.to_query(QueryMode::Count)).await;
        report("count_runs", result)
    }

    async fn run(&self, query: RunQuery) -> Result<RunQueryResponse> {
        let catalog = ColumnCatalog::load(&self.store, self.compiler.config()).await?;
        let compiled = self.compiler.compile(&query, &catalog, Utc::now());
        self.compiler.execute(&self.store, &compiled).await
    }

    async fn distinct(&self, column: &str, filter: Option<&Value>) -> Result<RunQueryResponse> {
        let catalog = ColumnCatalog::load(&self.store, self.compiler.config()).await?;
        let field = catalog.resolve_column(column);
        let values = self
            .store
            .distinct(&self.compiler.config().runs_collection, field, filter)
            .await?;
        Ok(RunQueryResponse::Distinct(values))
    }
}

fn report(operation: &str, result: Result<RunQueryResponse>) -> Result<RunQueryResponse> {
    match &result {
        Ok(response) => info!(operation, rows = response.row_count(), "run query served"),
        Err(e) if e.is_client_error() => debug!(operation, error = %e, "run query rejected"),
        Err(e) => error!(operation, error = %e, "run query failed"),
    }
    result
}

/// HTTP status and JSON body for a failed request.
#[must_use]
pub fn error_response(error: &Error) -> (u16, Value) {
    let status = if error.is_client_error() { 400 } else { 500 };
    (status, json!({ "error": error.public_message() }))
}
