// Structured data operations on record fields
// Author: Gabriel Demetrios Lafis

use std::str::FromStr;

use log::{debug, warn};
use serde_json::{Map, Value as JsonValue};

use crate::data::{json_kind, DataError, Record, Value, JSON_CONFIG};
use crate::utils::EngineSettings;
use super::{decode_config, ErrorPolicy, JsonConfig, ProcessingError, ProcessorType, RecordProcessor};

/// Separator used by `flatten` when none is configured
pub const DEFAULT_FLATTEN_SEPARATOR: &str = ".";

/// Structured data operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonOperation {
    Parse,
    Serialize,
    Extract,
    Flatten,
}

impl FromStr for JsonOperation {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parse" => Ok(JsonOperation::Parse),
            "serialize" => Ok(JsonOperation::Serialize),
            "extract" => Ok(JsonOperation::Extract),
            "flatten" => Ok(JsonOperation::Flatten),
            _ => Err(ProcessingError::Configuration(format!(
                "unknown JSON operation '{}'",
                s
            ))),
        }
    }
}

/// One step of a path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse a path such as `order.items[0].sku` into segments
pub fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let mut segments = Vec::new();

    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if !name.is_empty() {
            segments.push(PathSegment::Key(name.to_string()));
        } else if rest.is_empty() {
            return None;
        }

        while !rest.is_empty() {
            let close = rest.find(']')?;
            if !rest.starts_with('[') {
                return None;
            }
            let index = rest[1..close].trim().parse::<usize>().ok()?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
        }
    }

    Some(segments)
}

/// Navigate a document along a path
pub fn resolve_path<'a>(document: &'a JsonValue, path: &[PathSegment]) -> Option<&'a JsonValue> {
    path.iter().try_fold(document, |current, segment| match segment {
        PathSegment::Key(key) => current.as_object()?.get(key),
        PathSegment::Index(index) => current.as_array()?.get(*index),
    })
}

/// Flatten a document into `(name, leaf)` pairs
pub fn flatten_document(document: &JsonValue, separator: &str) -> Vec<(String, JsonValue)> {
    let mut out = Vec::new();
    flatten_into(document, None, separator, &mut out);
    out
}

fn flatten_into(
    value: &JsonValue,
    prefix: Option<&str>,
    separator: &str,
    out: &mut Vec<(String, JsonValue)>,
) {
    let join = |name: &str| match prefix {
        Some(prefix) => format!("{}{}{}", prefix, separator, name),
        None => name.to_string(),
    };

    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                flatten_into(child, Some(&join(key)), separator, out);
            }
        }
        JsonValue::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, Some(&join(&index.to_string())), separator, out);
            }
        }
        leaf => {
            if let Some(name) = prefix {
                out.push((name.to_string(), leaf.clone()));
            }
        }
    }
}

/// Structured data processor for nested text embedded in fields
pub struct JsonProcessor {
    separator: String,
    include_on_error: bool,
}

impl JsonProcessor {
    /// Create a processor reading `JsonConfig` from the batch metadata
    pub fn new() -> Self {
        JsonProcessor {
            separator: DEFAULT_FLATTEN_SEPARATOR.to_string(),
            include_on_error: false,
        }
    }

    /// Create a processor using engine settings
    pub fn with_settings(settings: &EngineSettings) -> Self {
        JsonProcessor {
            separator: settings.flatten_separator.clone(),
            include_on_error: settings.include_on_error,
        }
    }

    /// Apply the configured operation to one record
    pub fn apply(&self, record: &Record, config: &JsonConfig) -> Result<Record, ProcessingError> {
        match config.operation.parse::<JsonOperation>()? {
            JsonOperation::Parse => self.parse(record, config),
            JsonOperation::Serialize => self.serialize(record, config),
            JsonOperation::Extract => self.extract(record, config),
            JsonOperation::Flatten => self.flatten(record, config),
        }
    }

    fn source_document(
        &self,
        record: &Record,
        config: &JsonConfig,
    ) -> Result<(String, JsonValue), ProcessingError> {
        let field = config.source_field.as_deref().ok_or_else(|| {
            ProcessingError::Configuration(format!("{} requires SourceField", config.operation))
        })?;

        let value = match record.get(field) {
            Some(value) if !value.is_null() => value,
            _ => {
                return Err(ProcessingError::record(
                    record,
                    format!("source field '{}' is missing", field),
                ))
            }
        };

        match value.as_json_document() {
            Ok(document) => Ok((field.to_string(), document)),
            Err(DataError::ParseError(msg)) => Err(ProcessingError::Fatal(format!(
                "field '{}' of record {} is not valid JSON: {}",
                field,
                record.id(),
                msg
            ))),
            Err(e) => Err(ProcessingError::record(record, format!("field '{}': {}", field, e))),
        }
    }

    /// Replace the source field with the top-level keys of its document
    fn parse(&self, record: &Record, config: &JsonConfig) -> Result<Record, ProcessingError> {
        let (field, document) = self.source_document(record, config)?;

        let object = match document {
            JsonValue::Object(object) => object,
            other => {
                return Err(ProcessingError::record(
                    record,
                    format!("field '{}' holds a JSON {}, not an object", field, json_kind(&other)),
                ))
            }
        };

        let mut output = record.clone();
        output.remove(&field);
        for (key, value) in &object {
            output.set(key.clone(), Value::from_json(value));
        }

        Ok(output)
    }

    /// Pack fields into a serialized object stored in the target field
    fn serialize(&self, record: &Record, config: &JsonConfig) -> Result<Record, ProcessingError> {
        let target = config.target_field.as_deref().ok_or_else(|| {
            ProcessingError::Configuration("serialize requires TargetField".to_string())
        })?;

        let mut object = Map::new();
        if config.fields.is_empty() {
            for (name, value) in record.iter().filter(|(name, _)| *name != target) {
                object.insert(name.to_string(), value.to_json());
            }
        } else {
            for name in &config.fields {
                match record.get(name) {
                    Some(value) => {
                        object.insert(name.clone(), value.to_json());
                    }
                    None => debug!("Record {}: '{}' not present, not serialized", record.id(), name),
                }
            }
        }

        let text = serde_json::to_string(&JsonValue::Object(object))
            .map_err(|e| ProcessingError::record(record, e.to_string()))?;

        let mut output = record.clone();
        output.set(target, Value::String(text));
        Ok(output)
    }

    /// Copy scalar values found at the mapped paths into target fields
    fn extract(&self, record: &Record, config: &JsonConfig) -> Result<Record, ProcessingError> {
        if config.path_mapping.is_empty() {
            return Err(ProcessingError::Configuration(
                "extract requires PathMapping".to_string(),
            ));
        }

        let (_, document) = self.source_document(record, config)?;
        let mut output = record.clone();

        for (path, target) in &config.path_mapping {
            let segments = match parse_path(path) {
                Some(segments) => segments,
                None => {
                    warn!("Invalid extract path '{}' skipped", path);
                    continue;
                }
            };

            match resolve_path(&document, &segments) {
                Some(JsonValue::Object(_)) | Some(JsonValue::Array(_)) => {
                    debug!("Record {}: '{}' is not a scalar", record.id(), path)
                }
                Some(leaf) => output.set(target.clone(), Value::from_json(leaf)),
                None => debug!("Record {}: '{}' did not resolve", record.id(), path),
            }
        }

        Ok(output)
    }

    /// Replace the source field with one field per leaf of its document
    fn flatten(&self, record: &Record, config: &JsonConfig) -> Result<Record, ProcessingError> {
        let (field, document) = self.source_document(record, config)?;
        let separator = config.separator.as_deref().unwrap_or(&self.separator);

        let leaves = match document {
            JsonValue::Object(_) => flatten_document(&document, separator),
            JsonValue::Array(_) => {
                let mut wrapped = Map::new();
                wrapped.insert(field.clone(), document);
                flatten_document(&JsonValue::Object(wrapped), separator)
            }
            other => {
                return Err(ProcessingError::record(
                    record,
                    format!("field '{}' holds a JSON {}, nothing to flatten", field, json_kind(&other)),
                ))
            }
        };

        let mut output = record.clone();
        output.remove(&field);
        for (name, leaf) in &leaves {
            output.set(name.clone(), Value::from_json(leaf));
        }

        Ok(output)
    }

    /// Apply the operation to every record under an error policy
    pub fn process_with(
        &self,
        input: &[Record],
        config: &JsonConfig,
        policy: ErrorPolicy,
    ) -> Result<Vec<Record>, ProcessingError> {
        let mut result = Vec::with_capacity(input.len());

        for record in input {
            match self.apply(record, config) {
                Ok(output) => result.push(output),
                Err(e @ ProcessingError::Record { .. }) => {
                    if let Some(kept) = policy.resolve(record.clone(), &e) {
                        result.push(kept);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }
}

impl Default for JsonProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordProcessor for JsonProcessor {
    fn process(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError> {
        let config: JsonConfig = match decode_config(input, JSON_CONFIG) {
            Ok(Some(config)) => config,
            Ok(None) => {
                warn!("JSON operation skipped: no {} found on batch", JSON_CONFIG);
                return Ok(input.to_vec());
            }
            Err(ProcessingError::Configuration(msg)) => {
                warn!("JSON operation skipped: {}", msg);
                return Ok(input.to_vec());
            }
            Err(e) => return Err(e),
        };

        let policy = ErrorPolicy::new(config.include_on_error.unwrap_or(self.include_on_error));

        match self.process_with(input, &config, policy) {
            Err(ProcessingError::Configuration(msg)) => {
                warn!("JSON operation skipped: {}", msg);
                Ok(input.to_vec())
            }
            outcome => outcome,
        }
    }

    fn name(&self) -> &str {
        "json"
    }

    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Json
    }
}
