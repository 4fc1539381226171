//! # Trueno-Runboard: Run-Query Compiler for Experiment Dashboards
//!
//! **Version**: 0.1.0
//!
//! Trueno-Runboard compiles declarative run-table requests (columns, filter,
//! sort, page) into a single aggregation pipeline over a document store that
//! holds experiment runs and their metric time series.
//!
//! ## Design Principles
//!
//! - **Pure planning**: every planner step is a function of the request, the
//!   column catalog and one captured instant, so equal requests compile to
//!   byte-identical pipelines
//! - **Derived in the pipeline**: `duration` and the `PROBABLY_DEAD` liveness
//!   status are computed by the store, so filters and sorts see them
//! - **Runtime columns as data**: metric columns are catalog records, reduced
//!   through a closed extrema table
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use serde_json::json;
//! use trueno_runboard::config::CompilerConfig;
//! use trueno_runboard::query::{ColumnCatalog, RunQuery, RunQueryCompiler};
//!
//! let compiler = RunQueryCompiler::new(CompilerConfig::default());
//! let query = RunQuery::count().filter(json!({"status": "RUNNING"}));
//! let compiled = compiler.compile(&query, &ColumnCatalog::default(), Utc::now());
//!
//! assert_eq!(
//!     compiled.pipeline().stage_names(),
//!     vec!["$addFields", "$match", "$count"]
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod run;
pub mod service;
pub mod store;

pub use error::{Error, Result};
