// Operator configuration carried in record metadata
// Author: Gabriel Demetrios Lafis

//! Typed views over the per-batch configuration embedded in the metadata of
//! the first record of a batch.
//!
//! Every key is optional: [`decode_config`] returns `Ok(None)` when the key is
//! absent and a [`ProcessingError::Configuration`] when it is malformed.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value as JsonValue};

use crate::data::{Record, Value};
use crate::utils::validate_field_name;
use super::{Condition, ConditionSet, LogicType, MergeType, ProcessingError};

/// Decode the configuration stored under `key` on the first record of a batch
pub fn decode_config<T: DeserializeOwned>(
    records: &[Record],
    key: &str,
) -> Result<Option<T>, ProcessingError> {
    let value = match records.first().and_then(|record| record.metadata.get(key)) {
        Some(value) => value,
        None => return Ok(None),
    };

    let json = match value {
        Value::Json(json) => json.clone(),
        Value::String(text) => serde_json::from_str(text).map_err(|e| {
            ProcessingError::Configuration(format!("{} is not valid JSON: {}", key, e))
        })?,
        other => other.to_json(),
    };

    serde_json::from_value(json)
        .map(Some)
        .map_err(|e| ProcessingError::Configuration(format!("invalid {}: {}", key, e)))
}

/// Deserialize a map into a list of entries, keeping the document order
fn ordered_entries<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct EntriesVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, V>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor(PhantomData))
}

/// Free-form operation parameters with case-insensitive lookup
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, JsonValue>);

impl Parameters {
    /// Create empty parameters
    pub fn new() -> Self {
        Parameters(Map::new())
    }

    /// Builder-style parameter setter
    pub fn with<K: Into<String>, V: Into<JsonValue>>(mut self, name: K, value: V) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    fn lookup(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name).or_else(|| {
            self.0
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    /// Get a parameter as a float
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.lookup(name)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get a parameter as an integer; integral floats are accepted
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.lookup(name)? {
            JsonValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get a parameter as a string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.lookup(name)?.as_str()
    }

    /// Check if no parameters are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `FilterConfig`: `{Conditions: [...], LogicType: "AND" | "OR"}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterConfig {
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
    #[serde(default)]
    pub logic_type: LogicType,
}

/// A single condition as it appears on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConditionConfig {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default)]
    pub negate: bool,
}

impl FilterConfig {
    /// Convert the wire form into a condition set
    pub fn to_condition_set(&self) -> ConditionSet {
        let conditions = self
            .conditions
            .iter()
            .map(|c| Condition {
                field: c.field.clone(),
                operator: c.operator.clone(),
                compare_value: Value::from_json(&c.value),
                negate: c.negate,
            })
            .collect();

        ConditionSet::new(conditions, self.logic_type)
    }
}

/// `MergeConfig`: `{MergeType, DataSources: {name -> records}, JoinFields: [...]}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MergeConfig {
    pub merge_type: MergeType,
    #[serde(default, deserialize_with = "ordered_entries")]
    pub data_sources: Vec<(String, Vec<JsonValue>)>,
    #[serde(default)]
    pub join_fields: Vec<String>,
}

impl MergeConfig {
    /// Convert the registered data sources into record sets, in registration order
    pub fn secondary_sets(&self) -> Result<Vec<(String, Vec<Record>)>, ProcessingError> {
        self.data_sources
            .iter()
            .map(|(name, rows)| {
                let records = rows
                    .iter()
                    .map(Record::from_json_object)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| {
                        ProcessingError::Configuration(format!("data source '{}': {}", name, e))
                    })?;
                Ok((name.clone(), records))
            })
            .collect()
    }

    /// Check the join fields are usable names
    pub fn validate(&self) -> Result<(), ProcessingError> {
        for field in &self.join_fields {
            validate_field_name(field).map_err(ProcessingError::Configuration)?;
        }
        Ok(())
    }
}

/// `AggregationConfig`: `{GroupByFields: [...], AggregationOperations: {field -> function}}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AggregationConfig {
    #[serde(default)]
    pub group_by_fields: Vec<String>,
    #[serde(default, deserialize_with = "ordered_entries")]
    pub aggregation_operations: Vec<(String, String)>,
}

/// `NormalizationConfig`: `{Operations: {field -> operation}}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NormalizationConfig {
    #[serde(default, deserialize_with = "ordered_entries")]
    pub operations: Vec<(String, NormalizationOperation)>,
}

/// Normalization of one field
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NormalizationOperation {
    #[serde(rename = "Type")]
    pub type_name: String,
    #[serde(default)]
    pub create_new_field: bool,
    #[serde(default)]
    pub new_field_name: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
}

impl NormalizationOperation {
    /// Create an operation that overwrites the source field
    pub fn new(type_name: &str) -> Self {
        NormalizationOperation {
            type_name: type_name.to_string(),
            create_new_field: false,
            new_field_name: None,
            parameters: Parameters::new(),
        }
    }

    /// Write the result into a new field instead of the source field
    pub fn into_field(mut self, name: &str) -> Self {
        self.create_new_field = true;
        self.new_field_name = Some(name.to_string());
        self
    }

    /// Set the operation parameters
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// `DateTimeConfig`: `{Operations: {field -> operation}, IncludeOnError?}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateTimeConfig {
    #[serde(default, deserialize_with = "ordered_entries")]
    pub operations: Vec<(String, DateTimeOperation)>,
    #[serde(default)]
    pub include_on_error: Option<bool>,
}

/// Date/time derivation for one field
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateTimeOperation {
    pub operation: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub input_format: Option<String>,
    #[serde(default)]
    pub input_culture: Option<String>,
    #[serde(default)]
    pub create_new_field: bool,
    #[serde(default)]
    pub new_field_name: Option<String>,
}

impl DateTimeOperation {
    /// Create an operation that overwrites the source field
    pub fn new(operation: &str) -> Self {
        DateTimeOperation {
            operation: operation.to_string(),
            parameters: Parameters::new(),
            input_format: None,
            input_culture: None,
            create_new_field: false,
            new_field_name: None,
        }
    }

    /// Write the result into a new field instead of the source field
    pub fn into_field(mut self, name: &str) -> Self {
        self.create_new_field = true;
        self.new_field_name = Some(name.to_string());
        self
    }

    /// Set the operation parameters
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Parse the source value with an explicit format first
    pub fn with_input_format(mut self, format: &str) -> Self {
        self.input_format = Some(format.to_string());
        self
    }

    /// Read ambiguous dates using the given culture
    pub fn with_input_culture(mut self, culture: &str) -> Self {
        self.input_culture = Some(culture.to_string());
        self
    }
}

/// `JsonConfig`: `{Operation, SourceField, TargetField, PathMapping?, Separator?, IncludeOnError?}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JsonConfig {
    pub operation: String,
    #[serde(default)]
    pub source_field: Option<String>,
    #[serde(default)]
    pub target_field: Option<String>,
    #[serde(default, deserialize_with = "ordered_entries")]
    pub path_mapping: Vec<(String, String)>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub include_on_error: Option<bool>,
}

impl JsonConfig {
    /// Create a configuration for the named operation
    pub fn new(operation: &str) -> Self {
        JsonConfig {
            operation: operation.to_string(),
            ..JsonConfig::default()
        }
    }

    /// Set the field the operation reads from
    pub fn source(mut self, field: &str) -> Self {
        self.source_field = Some(field.to_string());
        self
    }

    /// Set the field the operation writes to
    pub fn target(mut self, field: &str) -> Self {
        self.target_field = Some(field.to_string());
        self
    }

    /// Map a path expression to a target field
    pub fn map_path(mut self, path: &str, field: &str) -> Self {
        self.path_mapping.push((path.to_string(), field.to_string()));
        self
    }

    /// Set the flatten separator
    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = Some(separator.to_string());
        self
    }

    /// Restrict serialization to the given fields
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Keep failing records, annotated with the error
    pub fn include_on_error(mut self, include: bool) -> Self {
        self.include_on_error = Some(include);
        self
    }
}
