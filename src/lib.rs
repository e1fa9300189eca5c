// Record Transform Engine
// Author: Gabriel Demetrios Lafis

//! # Record Transform Engine
//!
//! Composable operators over batches of schema-less, dynamically typed
//! records, driven by declarative configuration carried in record metadata.
//!
//! ## Features
//!
//! - Filtering with a pluggable condition operator registry
//! - Union, inner, left, right and full joins on composite keys
//! - Group-by aggregation with a pluggable function registry
//! - Two-pass statistical normalization
//! - Date/time field derivation
//! - Parsing, serializing, extracting and flattening of embedded JSON
//!
//! ## Example
//!
//! ```rust
//! use record_transform_engine::{
//!     data::Record,
//!     processing::{AggregateProcessor, AggregationSpec, Condition, ConditionSet,
//!                  FilterProcessor, Pipeline},
//! };
//!
//! let records = vec![
//!     Record::new().with("region", "north").with("amount", 120),
//!     Record::new().with("region", "south").with("amount", 80),
//!     Record::new().with("region", "north").with("amount", 40),
//! ];
//!
//! let pipeline = Pipeline::new("example")
//!     .add(FilterProcessor::with_conditions(ConditionSet::all(vec![
//!         Condition::new("amount", "greaterThan", 50),
//!     ])))
//!     .add(AggregateProcessor::with_spec(
//!         AggregationSpec::new().group_by("region").aggregate("amount", "Sum"),
//!     ));
//!
//! let result = pipeline.execute(&records).unwrap();
//! assert_eq!(result.len(), 2);
//! ```

pub mod data;
pub mod processing;
pub mod utils;

// Re-export main types
pub use data::{Record, Value};
pub use processing::{Pipeline, ProcessingError, RecordProcessor};
pub use utils::{Config, EngineSettings, PipelineConfig};
