// Normalization operations driven by column statistics
// Author: Gabriel Demetrios Lafis

use std::collections::HashMap;
use std::str::FromStr;

use log::{debug, warn};

use crate::data::coerce::as_f64;
use crate::data::{Record, Value, NORMALIZATION_CONFIG};
use crate::utils::validate_range;
use super::{
    decode_config, NormalizationConfig, NormalizationOperation, ProcessingError, ProcessorType,
    RecordProcessor,
};

/// Upper bound accepted for `NumBins`
pub const MAX_BINS: i64 = 1_000_000;

/// Type of normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationKind {
    MinMax,
    ZScore,
    PercentOfTotal,
    TextStandardize,
    CustomRange,
    Binning,
}

impl FromStr for NormalizationKind {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_lowercase().as_str() {
            "minmax" => NormalizationKind::MinMax,
            "zscore" => NormalizationKind::ZScore,
            "percentoftotal" => NormalizationKind::PercentOfTotal,
            "textstandardize" => NormalizationKind::TextStandardize,
            "customrange" => NormalizationKind::CustomRange,
            "binning" => NormalizationKind::Binning,
            _ => {
                return Err(ProcessingError::Configuration(format!(
                    "unknown normalization type '{}'",
                    s
                )))
            }
        };
        Ok(kind)
    }
}

/// Statistics of the numeric values of one column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl ColumnStats {
    /// Compute statistics; `None` when there are no values
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(ColumnStats {
            count,
            min,
            max,
            sum,
            mean,
            std_dev: variance.sqrt(),
        })
    }

    /// Collect the numeric-parseable values of a field across the batch
    pub fn for_field(records: &[Record], field: &str) -> Option<Self> {
        let values: Vec<f64> = records
            .iter()
            .filter_map(|record| record.get(field))
            .filter_map(as_f64)
            .collect();
        Self::from_values(&values)
    }
}

/// A normalization with its parameters resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizationMethod {
    MinMax,
    ZScore,
    PercentOfTotal,
    TextStandardize,
    CustomRange { min_output: f64, max_output: f64 },
    Binning { num_bins: i64 },
}

impl NormalizationMethod {
    /// Resolve the method and its parameters from an operation
    pub fn from_operation(operation: &NormalizationOperation) -> Result<Self, ProcessingError> {
        let params = &operation.parameters;

        let method = match operation.type_name.parse::<NormalizationKind>()? {
            NormalizationKind::MinMax => NormalizationMethod::MinMax,
            NormalizationKind::ZScore => NormalizationMethod::ZScore,
            NormalizationKind::PercentOfTotal => NormalizationMethod::PercentOfTotal,
            NormalizationKind::TextStandardize => NormalizationMethod::TextStandardize,
            NormalizationKind::CustomRange => {
                match (params.get_f64("MinOutput"), params.get_f64("MaxOutput")) {
                    (Some(min_output), Some(max_output)) => NormalizationMethod::CustomRange {
                        min_output,
                        max_output,
                    },
                    _ => {
                        return Err(ProcessingError::Configuration(
                            "CustomRange requires MinOutput and MaxOutput".to_string(),
                        ))
                    }
                }
            }
            NormalizationKind::Binning => {
                let num_bins = params.get_i64("NumBins").ok_or_else(|| {
                    ProcessingError::Configuration("Binning requires NumBins".to_string())
                })?;
                validate_range(num_bins, 1, MAX_BINS, "NumBins")
                    .map_err(ProcessingError::Configuration)?;
                NormalizationMethod::Binning { num_bins }
            }
        };

        Ok(method)
    }

    /// Apply the method to a numeric value using the column statistics
    pub fn apply(&self, value: f64, stats: &ColumnStats) -> Value {
        let range = stats.max - stats.min;

        match *self {
            NormalizationMethod::MinMax => Value::Float(min_max(value, stats)),
            NormalizationMethod::ZScore => {
                if stats.std_dev == 0.0 {
                    Value::Float(0.0)
                } else {
                    Value::Float((value - stats.mean) / stats.std_dev)
                }
            }
            NormalizationMethod::PercentOfTotal => {
                if stats.sum == 0.0 {
                    Value::Float(0.0)
                } else {
                    Value::Float(value / stats.sum * 100.0)
                }
            }
            NormalizationMethod::CustomRange {
                min_output,
                max_output,
            } => Value::Float(min_output + min_max(value, stats) * (max_output - min_output)),
            NormalizationMethod::Binning { num_bins } => {
                if range == 0.0 {
                    return Value::Integer(0);
                }
                let bucket = ((value - stats.min) / range * num_bins as f64).floor() as i64;
                Value::Integer(bucket.clamp(0, num_bins - 1))
            }
            NormalizationMethod::TextStandardize => Value::String(standardize_text(value)),
        }
    }
}

fn min_max(value: f64, stats: &ColumnStats) -> f64 {
    let range = stats.max - stats.min;
    if range == 0.0 {
        1.0
    } else {
        (value - stats.min) / range
    }
}

fn standardize_text<T: ToString>(value: T) -> String {
    value.to_string().trim().to_lowercase()
}

struct ResolvedOperation<'a> {
    field: &'a str,
    target: String,
    method: NormalizationMethod,
    stats: Option<ColumnStats>,
}

/// Normalization processor rescaling field values across a batch
pub struct NormalizeProcessor {
    operations: Option<Vec<(String, NormalizationOperation)>>,
}

impl NormalizeProcessor {
    /// Create a processor reading `NormalizationConfig` from the batch metadata
    pub fn new() -> Self {
        NormalizeProcessor { operations: None }
    }

    /// Create a processor with fixed operations
    pub fn with_operations(operations: Vec<(String, NormalizationOperation)>) -> Self {
        NormalizeProcessor {
            operations: Some(operations),
        }
    }

    /// Normalize the batch in two passes.
    ///
    /// The first pass computes per-field statistics from the input values;
    /// the second pass rewrites each record. Operations whose configuration
    /// is invalid are skipped, and values that are not numeric are left as-is.
    pub fn normalize(
        &self,
        records: &[Record],
        operations: &[(String, NormalizationOperation)],
    ) -> Vec<Record> {
        let mut stats_cache: HashMap<&str, Option<ColumnStats>> = HashMap::new();
        let mut resolved = Vec::with_capacity(operations.len());

        for (field, operation) in operations {
            let method = match NormalizationMethod::from_operation(operation) {
                Ok(method) => method,
                Err(e) => {
                    warn!("Normalization of '{}' skipped: {}", field, e);
                    continue;
                }
            };

            let stats = if method == NormalizationMethod::TextStandardize {
                None
            } else {
                *stats_cache
                    .entry(field.as_str())
                    .or_insert_with(|| ColumnStats::for_field(records, field))
            };

            let target = if operation.create_new_field {
                operation
                    .new_field_name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| format!("{}_normalized", field))
            } else {
                field.clone()
            };

            resolved.push(ResolvedOperation {
                field,
                target,
                method,
                stats,
            });
        }

        records
            .iter()
            .map(|record| {
                let mut output = record.clone();

                for op in &resolved {
                    let value = match record.get(op.field) {
                        Some(value) if !value.is_null() => value,
                        _ => continue,
                    };

                    if op.method == NormalizationMethod::TextStandardize {
                        output.set(op.target.clone(), Value::String(standardize_text(value)));
                        continue;
                    }

                    match (as_f64(value), op.stats.as_ref()) {
                        (Some(number), Some(stats)) => {
                            output.set(op.target.clone(), op.method.apply(number, stats));
                        }
                        _ => debug!(
                            "Record {}: '{}' is not numeric, normalization skipped",
                            record.id(),
                            op.field
                        ),
                    }
                }

                output
            })
            .collect()
    }
}

impl Default for NormalizeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordProcessor for NormalizeProcessor {
    fn process(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError> {
        if let Some(ref operations) = self.operations {
            return Ok(self.normalize(input, operations));
        }

        match decode_config::<NormalizationConfig>(input, NORMALIZATION_CONFIG) {
            Ok(Some(config)) => Ok(self.normalize(input, &config.operations)),
            Ok(None) => {
                warn!("Normalization skipped: no {} found on batch", NORMALIZATION_CONFIG);
                Ok(input.to_vec())
            }
            Err(ProcessingError::Configuration(msg)) => {
                warn!("Normalization skipped: {}", msg);
                Ok(input.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "normalize"
    }

    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Normalize
    }
}
