// Join operations for record batches
// Author: Gabriel Demetrios Lafis

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::Deserialize;

use crate::data::{JoinKey, Record, MERGE_APPLIED, MERGE_CONFIG};
use crate::utils::EngineSettings;
use super::{decode_config, MergeConfig, ProcessingError, ProcessorType, RecordProcessor};

/// Default prefix for right-side fields whose name is already taken
pub const DEFAULT_RIGHT_PREFIX: &str = "Right_";

/// Merge type for combining record sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MergeType {
    #[serde(alias = "union", alias = "UNION")]
    Union,
    #[serde(alias = "inner", alias = "INNER")]
    Inner,
    #[serde(alias = "left", alias = "LEFT")]
    Left,
    #[serde(alias = "right", alias = "RIGHT")]
    Right,
    #[serde(alias = "full", alias = "FULL")]
    Full,
}

/// Merge processor for joining a primary batch with secondary record sets
pub struct MergeProcessor {
    right_prefix: String,
}

impl MergeProcessor {
    /// Create a new merge processor
    pub fn new() -> Self {
        MergeProcessor {
            right_prefix: DEFAULT_RIGHT_PREFIX.to_string(),
        }
    }

    /// Create a merge processor using engine settings
    pub fn with_settings(settings: &EngineSettings) -> Self {
        MergeProcessor {
            right_prefix: settings.right_field_prefix.clone(),
        }
    }

    /// Merge the primary records with the secondary sets.
    ///
    /// `Union` concatenates every input. The other merge types join the
    /// primary set against the first secondary set only.
    pub fn merge(
        &self,
        primary: &[Record],
        secondaries: &[(String, Vec<Record>)],
        merge_type: MergeType,
        join_fields: &[String],
    ) -> Result<Vec<Record>, ProcessingError> {
        if merge_type == MergeType::Union {
            let mut result = primary.to_vec();
            for (name, records) in secondaries {
                debug!("Union appending {} records from '{}'", records.len(), name);
                result.extend(records.iter().cloned());
            }
            return Ok(result);
        }

        let (name, secondary) = secondaries.first().ok_or_else(|| {
            ProcessingError::Configuration(format!("{:?} merge requires a data source", merge_type))
        })?;

        if join_fields.is_empty() {
            return Err(ProcessingError::Configuration(format!(
                "{:?} merge requires join fields",
                merge_type
            )));
        }

        if secondaries.len() > 1 {
            warn!(
                "{:?} merge uses only the first data source '{}'; {} ignored",
                merge_type,
                name,
                secondaries.len() - 1
            );
        }

        let result = match merge_type {
            MergeType::Inner => self.inner_join(primary, secondary, join_fields),
            MergeType::Left => self.left_join(primary, secondary, join_fields),
            MergeType::Right => self.left_join(secondary, primary, join_fields),
            MergeType::Full => self.full_join(primary, secondary, join_fields),
            MergeType::Union => unreachable!("union handled above"),
        };

        Ok(result)
    }

    /// Pair every left record with each right record sharing its key
    pub fn inner_join(&self, left: &[Record], right: &[Record], fields: &[String]) -> Vec<Record> {
        let right_map = group_by_key(right, fields);
        let mut result = Vec::new();

        for left_record in left {
            let key = JoinKey::from_record(left_record, fields);
            if let Some(matches) = right_map.get(&key) {
                for right_record in matches {
                    result.push(self.merge_record_pair(left_record, right_record));
                }
            }
        }

        result
    }

    /// Like an inner join, but unmatched left records pass through unchanged
    pub fn left_join(&self, left: &[Record], right: &[Record], fields: &[String]) -> Vec<Record> {
        let right_map = group_by_key(right, fields);
        let mut result = Vec::new();

        for left_record in left {
            let key = JoinKey::from_record(left_record, fields);
            match right_map.get(&key) {
                Some(matches) => {
                    for right_record in matches {
                        result.push(self.merge_record_pair(left_record, right_record));
                    }
                }
                None => result.push(left_record.clone()),
            }
        }

        result
    }

    /// Left join followed by the right records whose key never matched
    pub fn full_join(&self, left: &[Record], right: &[Record], fields: &[String]) -> Vec<Record> {
        let right_map = group_by_key(right, fields);
        let mut processed: HashSet<JoinKey> = HashSet::new();
        let mut result = Vec::new();

        for left_record in left {
            let key = JoinKey::from_record(left_record, fields);
            match right_map.get(&key) {
                Some(matches) => {
                    for right_record in matches {
                        result.push(self.merge_record_pair(left_record, right_record));
                    }
                    processed.insert(key);
                }
                None => result.push(left_record.clone()),
            }
        }

        for right_record in right {
            let key = JoinKey::from_record(right_record, fields);
            if !processed.contains(&key) {
                result.push(right_record.clone());
            }
        }

        result
    }

    /// Merge two records into a new one.
    ///
    /// Left fields come first. A right field whose name is taken goes under
    /// the right prefix instead. Left metadata wins on key collisions.
    pub fn merge_record_pair(&self, left: &Record, right: &Record) -> Record {
        let mut merged = left.duplicate();

        for (name, value) in right.iter() {
            if merged.has(name) {
                let renamed = self.unique_right_name(&merged, name);
                merged.set(renamed, value.clone());
            } else {
                merged.set(name, value.clone());
            }
        }

        for (key, value) in &right.metadata.properties {
            if !merged.metadata.has(key) {
                merged.metadata.set(key.clone(), value.clone());
            }
        }

        merged.metadata.set(MERGE_APPLIED, true);
        merged
    }

    fn unique_right_name(&self, record: &Record, name: &str) -> String {
        let base = format!("{}{}", self.right_prefix, name);
        let mut candidate = base.clone();
        let mut counter = 1;

        while record.has(&candidate) {
            candidate = format!("{}_{}", base, counter);
            counter += 1;
        }

        candidate
    }
}

impl Default for MergeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn group_by_key<'a>(records: &'a [Record], fields: &[String]) -> HashMap<JoinKey, Vec<&'a Record>> {
    let mut map: HashMap<JoinKey, Vec<&Record>> = HashMap::new();

    for record in records {
        map.entry(JoinKey::from_record(record, fields))
            .or_default()
            .push(record);
    }

    map
}

impl RecordProcessor for MergeProcessor {
    fn process(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError> {
        let config: MergeConfig = match decode_config(input, MERGE_CONFIG) {
            Ok(Some(config)) => config,
            Ok(None) => {
                warn!("Merge skipped: no {} found on batch", MERGE_CONFIG);
                return Ok(input.to_vec());
            }
            Err(ProcessingError::Configuration(msg)) => {
                warn!("Merge skipped: {}", msg);
                return Ok(input.to_vec());
            }
            Err(e) => return Err(e),
        };

        let outcome = config.validate().and_then(|_| {
            let secondaries = config.secondary_sets()?;
            self.merge(input, &secondaries, config.merge_type, &config.join_fields)
        });

        match outcome {
            Ok(result) => Ok(result),
            Err(ProcessingError::Configuration(msg)) => {
                warn!("Merge skipped: {}", msg);
                Ok(input.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "merge"
    }

    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Merge
    }
}
