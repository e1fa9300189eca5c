// Aggregate operations for record batches
// Author: Gabriel Demetrios Lafis

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, warn};
use rust_decimal::Decimal;

use crate::data::coerce::as_decimal;
use crate::data::{JoinKey, Record, Value, AGGREGATION_APPLIED, AGGREGATION_CONFIG, RECORDS_AGGREGATED};
use super::{decode_config, AggregationConfig, ProcessingError, ProcessorType, RecordProcessor};

/// Represents an aggregation function over the values of one field in a group
pub trait AggregateFunction: Send + Sync {
    /// Get the name of the aggregation function
    fn name(&self) -> &str;

    /// Reduce the collected values of a group
    fn apply(&self, values: &[&Value]) -> Value;
}

fn numeric_values(values: &[&Value]) -> Vec<Decimal> {
    values.iter().filter_map(|v| as_decimal(v)).collect()
}

fn checked_sum(numbers: &[Decimal]) -> Option<Decimal> {
    numbers
        .iter()
        .try_fold(Decimal::ZERO, |acc, n| acc.checked_add(*n))
}

/// Sum aggregation function
pub struct SumFunction;

impl AggregateFunction for SumFunction {
    fn name(&self) -> &str {
        "Sum"
    }

    fn apply(&self, values: &[&Value]) -> Value {
        match checked_sum(&numeric_values(values)) {
            Some(sum) => Value::Decimal(sum),
            None => {
                warn!("Sum overflowed the decimal range");
                Value::Null
            }
        }
    }
}

/// Average aggregation function
pub struct AverageFunction;

impl AggregateFunction for AverageFunction {
    fn name(&self) -> &str {
        "Average"
    }

    fn apply(&self, values: &[&Value]) -> Value {
        let numbers = numeric_values(values);
        if numbers.is_empty() {
            return Value::Decimal(Decimal::ZERO);
        }

        checked_sum(&numbers)
            .and_then(|sum| sum.checked_div(Decimal::from(numbers.len() as u64)))
            .map_or(Value::Null, Value::Decimal)
    }
}

/// Min aggregation function
pub struct MinFunction;

impl AggregateFunction for MinFunction {
    fn name(&self) -> &str {
        "Min"
    }

    fn apply(&self, values: &[&Value]) -> Value {
        let min = numeric_values(values).into_iter().min();
        Value::Decimal(min.unwrap_or(Decimal::ZERO))
    }
}

/// Max aggregation function
pub struct MaxFunction;

impl AggregateFunction for MaxFunction {
    fn name(&self) -> &str {
        "Max"
    }

    fn apply(&self, values: &[&Value]) -> Value {
        let max = numeric_values(values).into_iter().max();
        Value::Decimal(max.unwrap_or(Decimal::ZERO))
    }
}

/// Count aggregation function; counts every collected value
pub struct CountFunction;

impl AggregateFunction for CountFunction {
    fn name(&self) -> &str {
        "Count"
    }

    fn apply(&self, values: &[&Value]) -> Value {
        Value::Integer(values.len() as i64)
    }
}

/// Distinct count over the rendered values
pub struct CountDistinctFunction;

impl AggregateFunction for CountDistinctFunction {
    fn name(&self) -> &str {
        "CountDistinct"
    }

    fn apply(&self, values: &[&Value]) -> Value {
        let distinct: HashSet<String> = values.iter().map(|v| v.to_string()).collect();
        Value::Integer(distinct.len() as i64)
    }
}

/// Comma-joined rendering of the non-null values
pub struct ConcatenateFunction;

impl AggregateFunction for ConcatenateFunction {
    fn name(&self) -> &str {
        "Concatenate"
    }

    fn apply(&self, values: &[&Value]) -> Value {
        let parts: Vec<String> = values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .collect();
        Value::String(parts.join(","))
    }
}

/// First value in batch order
pub struct FirstFunction;

impl AggregateFunction for FirstFunction {
    fn name(&self) -> &str {
        "First"
    }

    fn apply(&self, values: &[&Value]) -> Value {
        values.first().map_or(Value::Null, |v| (*v).clone())
    }
}

/// Last value in batch order
pub struct LastFunction;

impl AggregateFunction for LastFunction {
    fn name(&self) -> &str {
        "Last"
    }

    fn apply(&self, values: &[&Value]) -> Value {
        values.last().map_or(Value::Null, |v| (*v).clone())
    }
}

/// Aggregation function backed by a closure
pub struct FnAggregate<F> {
    name: String,
    func: F,
}

impl<F> FnAggregate<F>
where
    F: Fn(&[&Value]) -> Value + Send + Sync,
{
    /// Create a new closure aggregation
    pub fn new(name: &str, func: F) -> Self {
        FnAggregate {
            name: name.to_string(),
            func,
        }
    }
}

impl<F> AggregateFunction for FnAggregate<F>
where
    F: Fn(&[&Value]) -> Value + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, values: &[&Value]) -> Value {
        (self.func)(values)
    }
}

/// Immutable table of named aggregation functions
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn AggregateFunction>>,
}

impl FunctionRegistry {
    /// Start building a registry
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::new()
    }

    /// Create a registry holding only the built-in functions
    pub fn with_builtins() -> Self {
        Self::builder().with_builtins().build()
    }

    /// Look up a function by name, ignoring case
    pub fn get(&self, name: &str) -> Option<&Arc<dyn AggregateFunction>> {
        self.functions.get(&name.trim().to_lowercase())
    }

    /// Check if a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Registration phase of a [`FunctionRegistry`]
pub struct FunctionRegistryBuilder {
    functions: HashMap<String, Arc<dyn AggregateFunction>>,
}

impl FunctionRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        FunctionRegistryBuilder {
            functions: HashMap::new(),
        }
    }

    /// Register every built-in function
    pub fn with_builtins(self) -> Self {
        self.register(SumFunction)
            .register(AverageFunction)
            .register(MinFunction)
            .register(MaxFunction)
            .register(CountFunction)
            .register(CountDistinctFunction)
            .register(ConcatenateFunction)
            .register(FirstFunction)
            .register(LastFunction)
    }

    /// Register a function, replacing one with the same name
    pub fn register<F: AggregateFunction + 'static>(mut self, function: F) -> Self {
        self.functions
            .insert(function.name().to_lowercase(), Arc::new(function));
        self
    }

    /// Register a closure as a function
    pub fn register_fn<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&[&Value]) -> Value + Send + Sync + 'static,
    {
        self.register(FnAggregate::new(name, func))
    }

    /// Freeze the registry
    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry {
            functions: self.functions,
        }
    }
}

impl Default for FunctionRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Group-by definition: key fields plus `(field, function)` pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationSpec {
    pub group_by_fields: Vec<String>,
    pub operations: Vec<(String, String)>,
}

impl AggregationSpec {
    /// Create an empty definition
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to group by
    pub fn group_by(mut self, field: &str) -> Self {
        self.group_by_fields.push(field.to_string());
        self
    }

    /// Apply the named function to a field
    pub fn aggregate(mut self, field: &str, function: &str) -> Self {
        self.operations.push((field.to_string(), function.to_string()));
        self
    }
}

impl From<AggregationConfig> for AggregationSpec {
    fn from(config: AggregationConfig) -> Self {
        AggregationSpec {
            group_by_fields: config.group_by_fields,
            operations: config.aggregation_operations,
        }
    }
}

/// Group-by processor for aggregating records
pub struct AggregateProcessor {
    registry: Arc<FunctionRegistry>,
    spec: Option<AggregationSpec>,
}

impl AggregateProcessor {
    /// Create a processor reading `AggregationConfig` from the batch metadata
    pub fn new() -> Self {
        Self::with_registry(Arc::new(FunctionRegistry::with_builtins()))
    }

    /// Create a metadata-driven processor over a prepared registry
    pub fn with_registry(registry: Arc<FunctionRegistry>) -> Self {
        AggregateProcessor {
            registry,
            spec: None,
        }
    }

    /// Create a processor with a fixed group-by definition
    pub fn with_spec(spec: AggregationSpec) -> Self {
        AggregateProcessor {
            registry: Arc::new(FunctionRegistry::with_builtins()),
            spec: Some(spec),
        }
    }

    /// Group the records and reduce each group into one record.
    ///
    /// Groups come out in order of first appearance. Without group-by fields
    /// the whole batch forms a single group.
    pub fn aggregate(
        &self,
        records: &[Record],
        group_by_fields: &[String],
        operations: &[(String, String)],
    ) -> Result<Vec<Record>, ProcessingError> {
        let mut functions = Vec::with_capacity(operations.len());
        for (field, function_name) in operations {
            let function = self.registry.get(function_name).ok_or_else(|| {
                ProcessingError::Configuration(format!(
                    "unknown aggregation function '{}' for field '{}'",
                    function_name, field
                ))
            })?;
            functions.push((field, function_name, function));
        }

        let mut index: HashMap<JoinKey, usize> = HashMap::new();
        let mut groups: Vec<Vec<&Record>> = Vec::new();

        for record in records {
            let key = JoinKey::from_record(record, group_by_fields);
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(record);
        }

        let mut result = Vec::with_capacity(groups.len());

        for members in groups {
            let first = members[0];
            let mut output = Record::new();
            output.metadata = first.metadata.clone();

            for field in group_by_fields {
                output.set(field.clone(), first.get_or_null(field).clone());
            }

            for (field, function_name, function) in &functions {
                let values: Vec<&Value> = members.iter().filter_map(|r| r.get(field)).collect();
                output.set(format!("{}_{}", function_name, field), function.apply(&values));
            }

            output.metadata.set(AGGREGATION_APPLIED, true);
            output
                .metadata
                .set(RECORDS_AGGREGATED, Value::Integer(members.len() as i64));

            debug!("Aggregated group of {} records into {}", members.len(), output.id());
            result.push(output);
        }

        Ok(result)
    }

    fn resolve_spec(&self, input: &[Record]) -> Result<Option<AggregationSpec>, ProcessingError> {
        if let Some(ref spec) = self.spec {
            return Ok(Some(spec.clone()));
        }

        let config: Option<AggregationConfig> = decode_config(input, AGGREGATION_CONFIG)?;
        Ok(config.map(AggregationSpec::from))
    }
}

impl Default for AggregateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordProcessor for AggregateProcessor {
    fn process(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let outcome = self.resolve_spec(input).and_then(|spec| match spec {
            Some(spec) => self
                .aggregate(input, &spec.group_by_fields, &spec.operations)
                .map(Some),
            None => Ok(None),
        });

        match outcome {
            Ok(Some(result)) => Ok(result),
            Ok(None) => {
                warn!("Aggregation skipped: no {} found on batch", AGGREGATION_CONFIG);
                Ok(input.to_vec())
            }
            Err(ProcessingError::Configuration(msg)) => {
                warn!("Aggregation skipped: {}", msg);
                Ok(input.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "aggregate"
    }

    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Aggregate
    }
}
