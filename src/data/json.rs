// JSON conversion for values and records
// Author: Gabriel Demetrios Lafis

use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Number, Value as JsonValue};

use super::timestamp::CANONICAL_FORMAT;
use super::{DataError, Record, Value};

impl Value {
    /// Convert a JSON value to a data value
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(arr) => Value::List(arr.iter().map(Value::from_json).collect()),
            JsonValue::Object(_) => Value::Json(json.clone()),
        }
    }

    /// Convert a data value to a JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Integer(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => float_to_json(*f),
            Value::Decimal(d) => {
                if d.fract().is_zero() {
                    if let Some(i) = d.to_i64() {
                        return JsonValue::Number(i.into());
                    }
                }
                d.to_f64().map_or(JsonValue::Null, float_to_json)
            }
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Timestamp(ts) => JsonValue::String(ts.format(CANONICAL_FORMAT).to_string()),
            Value::Json(json) => json.clone(),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// Read the value as a parsed JSON document.
    ///
    /// Nested values are returned as-is, strings are parsed as JSON text.
    pub fn as_json_document(&self) -> Result<JsonValue, DataError> {
        match self {
            Value::Json(json) => Ok(json.clone()),
            Value::List(_) => Ok(self.to_json()),
            Value::String(s) => {
                serde_json::from_str(s).map_err(|e| DataError::ParseError(e.to_string()))
            }
            other => Err(DataError::NotSupported(format!(
                "cannot read a {} value as a JSON document",
                other.type_name()
            ))),
        }
    }
}

fn float_to_json(f: f64) -> JsonValue {
    match Number::from_f64(f) {
        Some(num) => JsonValue::Number(num),
        None => JsonValue::Null,
    }
}

impl Record {
    /// Create a record from a JSON object, one field per key
    pub fn from_json_object(json: &JsonValue) -> Result<Record, DataError> {
        let obj = json
            .as_object()
            .ok_or_else(|| DataError::NotAnObject(json_kind(json).to_string()))?;

        let mut record = Record::new();
        for (key, value) in obj {
            record.set(key.clone(), Value::from_json(value));
        }

        Ok(record)
    }

    /// Convert the record's fields to a JSON object
    pub fn to_json_object(&self) -> JsonValue {
        let mut obj = Map::new();
        for (name, value) in self.iter() {
            obj.insert(name.to_string(), value.to_json());
        }
        JsonValue::Object(obj)
    }

    /// Convert the record's fields and metadata to a JSON object
    pub fn to_json_with_metadata(&self) -> JsonValue {
        let mut metadata = Map::new();
        let mut keys: Vec<&String> = self.metadata.properties.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(value) = self.metadata.get(key) {
                metadata.insert(key.clone(), value.to_json());
            }
        }

        let mut obj = Map::new();
        obj.insert("fields".to_string(), self.to_json_object());
        obj.insert("metadata".to_string(), JsonValue::Object(metadata));
        JsonValue::Object(obj)
    }
}

/// Convert a JSON array of objects into records
pub fn records_from_json(json: &JsonValue) -> Result<Vec<Record>, DataError> {
    let array = json
        .as_array()
        .ok_or_else(|| DataError::ParseError(format!("expected an array of records, found {}", json_kind(json))))?;

    array.iter().map(Record::from_json_object).collect()
}

/// Convert records into a JSON array of objects
pub fn records_to_json(records: &[Record]) -> JsonValue {
    JsonValue::Array(records.iter().map(Record::to_json_object).collect())
}

pub(crate) fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
