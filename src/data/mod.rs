// Data module for the record and value model
// Author: Gabriel Demetrios Lafis

mod json;
mod key;

pub mod coerce;
pub mod timestamp;

pub use json::*;
pub use key::*;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Metadata key carrying the filter configuration
pub const FILTER_CONFIG: &str = "FilterConfig";
/// Metadata key carrying the merge configuration
pub const MERGE_CONFIG: &str = "MergeConfig";
/// Metadata key carrying the aggregation configuration
pub const AGGREGATION_CONFIG: &str = "AggregationConfig";
/// Metadata key carrying the normalization configuration
pub const NORMALIZATION_CONFIG: &str = "NormalizationConfig";
/// Metadata key carrying the date/time configuration
pub const DATETIME_CONFIG: &str = "DateTimeConfig";
/// Metadata key carrying the structured-data configuration
pub const JSON_CONFIG: &str = "JsonConfig";

/// Marker set on every record produced by a join
pub const MERGE_APPLIED: &str = "MergeApplied";
/// Marker set on every record produced by an aggregation
pub const AGGREGATION_APPLIED: &str = "AggregationApplied";
/// Size of the group an aggregate record was built from
pub const RECORDS_AGGREGATED: &str = "RecordsAggregated";
/// Per-record list of error annotations
pub const VALIDATION_ERRORS: &str = "ValidationErrors";

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

fn next_record_id() -> u64 {
    NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed)
}

/// Represents a dynamically typed value stored in a record
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Timestamp(NaiveDateTime),
    /// Nested structure kept in its serialized object form
    Json(JsonValue),
    List(Vec<Value>),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the name of the value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
            Value::List(_) => "list",
        }
    }

    /// Borrow the inner string if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check whether both values use the same variant
    pub fn same_type(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Decimal(d) => write!(f, "{}", d.normalize()),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(timestamp::CANONICAL_FORMAT)),
            Value::Json(json) => write!(f, "{}", json),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

/// Represents side-channel metadata attached to a record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub properties: HashMap<String, Value>,
}

impl Metadata {
    /// Create new empty metadata
    pub fn new() -> Self {
        Metadata {
            properties: HashMap::new(),
        }
    }

    /// Set a property, replacing any previous value
    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.properties.insert(key.into(), value.into());
    }

    /// Get a property from the metadata
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Check if a property exists
    pub fn has(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Remove a property, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    /// Append an error message to the record's error annotations
    pub fn push_error<S: Into<String>>(&mut self, message: S) {
        let entry = self
            .properties
            .entry(VALIDATION_ERRORS.to_string())
            .or_insert_with(|| Value::List(Vec::new()));

        match entry {
            Value::List(items) => items.push(Value::String(message.into())),
            other => {
                let previous = std::mem::replace(other, Value::Null);
                *other = Value::List(vec![previous, Value::String(message.into())]);
            }
        }
    }

    /// Get the number of properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Check if the metadata is empty
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Represents a schema-less record: ordered fields plus metadata
///
/// Field names are unique within a record. Setting an existing field keeps
/// its position; new fields are appended. Equality only looks at field
/// values, never at the identifier or the metadata.
#[derive(Debug, Clone)]
pub struct Record {
    id: u64,
    fields: Vec<(String, Value)>,
    pub metadata: Metadata,
}

impl Record {
    /// Create a new empty record
    pub fn new() -> Self {
        Record {
            id: next_record_id(),
            fields: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Create a record from name/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut record = Record::new();
        for (name, value) in pairs {
            record.set(name, value);
        }
        record
    }

    /// Builder-style field setter
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, name: K, value: V) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style metadata setter
    pub fn with_metadata<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.metadata.set(key, value);
        self
    }

    /// Create a new record (fresh identifier) with the same fields and metadata
    pub fn duplicate(&self) -> Self {
        Record {
            id: next_record_id(),
            fields: self.fields.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Get the record's process-unique identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get a field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a field value, treating a missing field as null
    pub fn get_or_null(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.get(name).unwrap_or(&NULL)
    }

    /// Set a field value, keeping the position of an existing field
    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, name: K, value: V) {
        let name = name.into();
        let value = value.into();

        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Check if a field exists
    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(index).1)
    }

    /// Get the field names in order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Iterate over fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Get the number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

/// Represents an error in the data module
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Expected a JSON object, found {0}")]
    NotAnObject(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}
