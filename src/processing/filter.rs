// Filter operations for record batches
// Author: Gabriel Demetrios Lafis

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::data::coerce::{as_timestamp, compare_numeric, values_equal};
use crate::data::{Record, Value, FILTER_CONFIG};
use super::{decode_config, FilterConfig, ProcessingError, ProcessorType, RecordProcessor};

/// A single predicate over one field of a record
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub compare_value: Value,
    pub negate: bool,
}

impl Condition {
    /// Create a new condition
    pub fn new<V: Into<Value>>(field: &str, operator: &str, compare_value: V) -> Self {
        Condition {
            field: field.to_string(),
            operator: operator.to_string(),
            compare_value: compare_value.into(),
            negate: false,
        }
    }

    /// Invert the condition's result
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }
}

/// How the conditions of a set are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LogicType {
    #[serde(rename = "AND", alias = "And", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "Or", alias = "or")]
    Or,
}

impl Default for LogicType {
    fn default() -> Self {
        LogicType::And
    }
}

/// A flat list of conditions combined with a single logic mode
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSet {
    pub conditions: Vec<Condition>,
    pub logic: LogicType,
}

impl ConditionSet {
    /// Create a new condition set
    pub fn new(conditions: Vec<Condition>, logic: LogicType) -> Self {
        ConditionSet { conditions, logic }
    }

    /// Create a set where every condition must hold
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::new(conditions, LogicType::And)
    }

    /// Create a set where at least one condition must hold
    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::new(conditions, LogicType::Or)
    }
}

/// Represents a named comparison operator
pub trait ConditionOperator: Send + Sync {
    /// Get the canonical operator name
    fn name(&self) -> &str;

    /// Get alternative names the operator answers to
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    /// Evaluate the operator; a missing field arrives as `Value::Null`
    fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool;
}

/// Operator backed by a closure
pub struct FnOperator<F> {
    name: String,
    func: F,
}

impl<F> FnOperator<F>
where
    F: Fn(&Value, &Value) -> bool + Send + Sync,
{
    /// Create a new closure operator
    pub fn new(name: &str, func: F) -> Self {
        FnOperator {
            name: name.to_string(),
            func,
        }
    }
}

impl<F> ConditionOperator for FnOperator<F>
where
    F: Fn(&Value, &Value) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        (self.func)(field_value, compare_value)
    }
}

/// Equality through the coercion rules
pub struct EqualsOperator;

impl ConditionOperator for EqualsOperator {
    fn name(&self) -> &str {
        "equals"
    }

    fn aliases(&self) -> &[&'static str] {
        &["==", "eq", "equal"]
    }

    fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        values_equal(field_value, compare_value)
    }
}

/// Inequality through the coercion rules
pub struct NotEqualsOperator;

impl ConditionOperator for NotEqualsOperator {
    fn name(&self) -> &str {
        "notEquals"
    }

    fn aliases(&self) -> &[&'static str] {
        &["!=", "ne", "notEqual"]
    }

    fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        !values_equal(field_value, compare_value)
    }
}

/// Numeric ordering; false unless both sides parse as decimals
pub struct OrderingOperator {
    name: &'static str,
    aliases: &'static [&'static str],
    accepts: fn(Ordering) -> bool,
}

impl OrderingOperator {
    pub fn greater_than() -> Self {
        OrderingOperator {
            name: "greaterThan",
            aliases: &[">", "gt"],
            accepts: |o| o == Ordering::Greater,
        }
    }

    pub fn greater_than_or_equal() -> Self {
        OrderingOperator {
            name: "greaterThanOrEqual",
            aliases: &[">=", "gte"],
            accepts: |o| o != Ordering::Less,
        }
    }

    pub fn less_than() -> Self {
        OrderingOperator {
            name: "lessThan",
            aliases: &["<", "lt"],
            accepts: |o| o == Ordering::Less,
        }
    }

    pub fn less_than_or_equal() -> Self {
        OrderingOperator {
            name: "lessThanOrEqual",
            aliases: &["<=", "lte"],
            accepts: |o| o != Ordering::Greater,
        }
    }
}

impl ConditionOperator for OrderingOperator {
    fn name(&self) -> &str {
        self.name
    }

    fn aliases(&self) -> &[&'static str] {
        self.aliases
    }

    fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        compare_numeric(field_value, compare_value).map_or(false, self.accepts)
    }
}

/// Substring tests on the rendered values; false on a null field
pub struct StringOperator {
    name: &'static str,
    test: fn(&str, &str) -> bool,
}

impl StringOperator {
    pub fn contains() -> Self {
        StringOperator {
            name: "contains",
            test: |s, p| s.contains(p),
        }
    }

    pub fn starts_with() -> Self {
        StringOperator {
            name: "startsWith",
            test: |s, p| s.starts_with(p),
        }
    }

    pub fn ends_with() -> Self {
        StringOperator {
            name: "endsWith",
            test: |s, p| s.ends_with(p),
        }
    }
}

impl ConditionOperator for StringOperator {
    fn name(&self) -> &str {
        self.name
    }

    fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        if field_value.is_null() {
            return false;
        }
        (self.test)(&field_value.to_string(), &compare_value.to_string())
    }
}

/// Upper bound on distinct patterns kept compiled by [`MatchesOperator`]
pub const MAX_CACHED_PATTERNS: usize = 256;

/// Regular expression match on the rendered field value.
///
/// Patterns are compiled once and reused across records. Invalid patterns
/// are cached too, so the warning is logged once per pattern.
#[derive(Default)]
pub struct MatchesOperator {
    patterns: Mutex<HashMap<String, Option<Regex>>>,
}

impl MatchesOperator {
    pub fn new() -> Self {
        MatchesOperator::default()
    }

    /// Get the number of patterns currently compiled
    pub fn cached_patterns(&self) -> usize {
        self.patterns.lock().map_or(0, |patterns| patterns.len())
    }

    fn is_match(&self, pattern: &str, text: &str) -> bool {
        let mut patterns = match self.patterns.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !patterns.contains_key(pattern) {
            if patterns.len() >= MAX_CACHED_PATTERNS {
                patterns.clear();
            }
            let compiled = match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Invalid regex '{}': {}", pattern, e);
                    None
                }
            };
            patterns.insert(pattern.to_string(), compiled);
        }

        matches!(patterns.get(pattern), Some(Some(re)) if re.is_match(text))
    }
}

impl ConditionOperator for MatchesOperator {
    fn name(&self) -> &str {
        "matches"
    }

    fn aliases(&self) -> &[&'static str] {
        &["regex"]
    }

    fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        if field_value.is_null() {
            return false;
        }

        self.is_match(&compare_value.to_string(), &field_value.to_string())
    }
}

/// Membership in a literal list
pub struct MembershipOperator {
    negated: bool,
}

impl MembershipOperator {
    pub fn is_in() -> Self {
        MembershipOperator { negated: false }
    }

    pub fn not_in() -> Self {
        MembershipOperator { negated: true }
    }

    fn candidates(compare_value: &Value) -> Vec<Value> {
        match compare_value {
            Value::List(items) => items.clone(),
            Value::Json(JsonValue::Array(items)) => items.iter().map(Value::from_json).collect(),
            Value::String(s) => s
                .split(',')
                .map(|part| Value::String(part.trim().to_string()))
                .collect(),
            other => vec![other.clone()],
        }
    }
}

impl ConditionOperator for MembershipOperator {
    fn name(&self) -> &str {
        if self.negated {
            "notIn"
        } else {
            "in"
        }
    }

    fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        let found = Self::candidates(compare_value)
            .iter()
            .any(|candidate| values_equal(field_value, candidate));
        found != self.negated
    }
}

/// Null checks; a missing field counts as null
pub struct NullCheckOperator {
    expect_null: bool,
}

impl NullCheckOperator {
    pub fn is_null() -> Self {
        NullCheckOperator { expect_null: true }
    }

    pub fn is_not_null() -> Self {
        NullCheckOperator { expect_null: false }
    }
}

impl ConditionOperator for NullCheckOperator {
    fn name(&self) -> &str {
        if self.expect_null {
            "isNull"
        } else {
            "isNotNull"
        }
    }

    fn evaluate(&self, field_value: &Value, _compare_value: &Value) -> bool {
        field_value.is_null() == self.expect_null
    }
}

#[derive(Clone, Copy)]
enum DateComparison {
    Before,
    After,
    SameDay,
}

/// Date comparisons; false unless both sides parse as timestamps
pub struct DateOperator {
    comparison: DateComparison,
}

impl DateOperator {
    pub fn before() -> Self {
        DateOperator {
            comparison: DateComparison::Before,
        }
    }

    pub fn after() -> Self {
        DateOperator {
            comparison: DateComparison::After,
        }
    }

    pub fn equals() -> Self {
        DateOperator {
            comparison: DateComparison::SameDay,
        }
    }
}

impl ConditionOperator for DateOperator {
    fn name(&self) -> &str {
        match self.comparison {
            DateComparison::Before => "dateBefore",
            DateComparison::After => "dateAfter",
            DateComparison::SameDay => "dateEquals",
        }
    }

    fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        let (left, right) = match (as_timestamp(field_value), as_timestamp(compare_value)) {
            (Some(left), Some(right)) => (left, right),
            _ => return false,
        };

        match self.comparison {
            DateComparison::Before => left < right,
            DateComparison::After => left > right,
            DateComparison::SameDay => left.date() == right.date(),
        }
    }
}

/// Immutable table of named operators.
///
/// Built once through [`OperatorRegistryBuilder`] and shared read-only; there
/// is no way to register an operator after construction.
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<dyn ConditionOperator>>,
}

impl OperatorRegistry {
    /// Start building a registry
    pub fn builder() -> OperatorRegistryBuilder {
        OperatorRegistryBuilder::new()
    }

    /// Create a registry holding only the built-in operators
    pub fn with_builtins() -> Self {
        Self::builder().with_builtins().build()
    }

    /// Look up an operator by name or alias, ignoring case
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ConditionOperator>> {
        self.operators.get(&name.trim().to_lowercase())
    }

    /// Check if an operator is registered
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get the number of registered names, aliases included
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Registration phase of an [`OperatorRegistry`]
pub struct OperatorRegistryBuilder {
    operators: HashMap<String, Arc<dyn ConditionOperator>>,
}

impl OperatorRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        OperatorRegistryBuilder {
            operators: HashMap::new(),
        }
    }

    /// Register every built-in operator
    pub fn with_builtins(self) -> Self {
        self.register(EqualsOperator)
            .register(NotEqualsOperator)
            .register(OrderingOperator::greater_than())
            .register(OrderingOperator::greater_than_or_equal())
            .register(OrderingOperator::less_than())
            .register(OrderingOperator::less_than_or_equal())
            .register(StringOperator::contains())
            .register(StringOperator::starts_with())
            .register(StringOperator::ends_with())
            .register(MatchesOperator::new())
            .register(MembershipOperator::is_in())
            .register(MembershipOperator::not_in())
            .register(NullCheckOperator::is_null())
            .register(NullCheckOperator::is_not_null())
            .register(DateOperator::before())
            .register(DateOperator::after())
            .register(DateOperator::equals())
    }

    /// Register an operator under its name and aliases, replacing earlier entries
    pub fn register<O: ConditionOperator + 'static>(mut self, operator: O) -> Self {
        let operator: Arc<dyn ConditionOperator> = Arc::new(operator);

        self.operators
            .insert(operator.name().to_lowercase(), Arc::clone(&operator));
        for alias in operator.aliases() {
            self.operators
                .insert(alias.to_lowercase(), Arc::clone(&operator));
        }

        self
    }

    /// Register a closure as an operator
    pub fn register_fn<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.register(FnOperator::new(name, func))
    }

    /// Freeze the registry
    pub fn build(self) -> OperatorRegistry {
        OperatorRegistry {
            operators: self.operators,
        }
    }
}

impl Default for OperatorRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluates conditions against records
#[derive(Clone)]
pub struct ConditionEvaluator {
    registry: Arc<OperatorRegistry>,
}

impl ConditionEvaluator {
    /// Create an evaluator with the built-in operators
    pub fn new() -> Self {
        Self::with_registry(Arc::new(OperatorRegistry::with_builtins()))
    }

    /// Create an evaluator over a prepared registry
    pub fn with_registry(registry: Arc<OperatorRegistry>) -> Self {
        ConditionEvaluator { registry }
    }

    /// Evaluate one condition; an unknown operator yields false
    pub fn evaluate_condition(&self, record: &Record, condition: &Condition) -> bool {
        let operator = match self.registry.get(&condition.operator) {
            Some(operator) => operator,
            None => {
                warn!(
                    "Unknown filter operator '{}' on field '{}'",
                    condition.operator, condition.field
                );
                return false;
            }
        };

        let field_value = record.get_or_null(&condition.field);
        let result = operator.evaluate(field_value, &condition.compare_value);

        result != condition.negate
    }

    /// Evaluate a condition set by folding the individual results
    pub fn evaluate(&self, record: &Record, set: &ConditionSet) -> bool {
        match set.logic {
            LogicType::And => set
                .conditions
                .iter()
                .all(|condition| self.evaluate_condition(record, condition)),
            LogicType::Or => set
                .conditions
                .iter()
                .any(|condition| self.evaluate_condition(record, condition)),
        }
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Filter records based on a condition set
pub struct FilterProcessor {
    evaluator: ConditionEvaluator,
    conditions: Option<ConditionSet>,
}

impl FilterProcessor {
    /// Create a filter reading `FilterConfig` from the batch metadata
    pub fn new() -> Self {
        Self::with_evaluator(ConditionEvaluator::new())
    }

    /// Create a metadata-driven filter using a custom evaluator
    pub fn with_evaluator(evaluator: ConditionEvaluator) -> Self {
        FilterProcessor {
            evaluator,
            conditions: None,
        }
    }

    /// Create a filter with a fixed condition set
    pub fn with_conditions(conditions: ConditionSet) -> Self {
        FilterProcessor {
            evaluator: ConditionEvaluator::new(),
            conditions: Some(conditions),
        }
    }

    /// Keep the records matching the condition set
    pub fn filter(&self, input: &[Record], set: &ConditionSet) -> Vec<Record> {
        input
            .iter()
            .filter(|record| {
                let keep = self.evaluator.evaluate(record, set);
                if !keep {
                    debug!("Filter rejected record {}", record.id());
                }
                keep
            })
            .cloned()
            .collect()
    }

    fn resolve_conditions(&self, input: &[Record]) -> Result<ConditionSet, ProcessingError> {
        if let Some(ref conditions) = self.conditions {
            return Ok(conditions.clone());
        }

        let config: FilterConfig = decode_config(input, FILTER_CONFIG)?.ok_or_else(|| {
            ProcessingError::Configuration(format!("no {} found on batch", FILTER_CONFIG))
        })?;

        if config.conditions.is_empty() {
            return Err(ProcessingError::Configuration(
                "filter configuration has no conditions".to_string(),
            ));
        }

        Ok(config.to_condition_set())
    }
}

impl Default for FilterProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordProcessor for FilterProcessor {
    fn process(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        match self.resolve_conditions(input) {
            Ok(set) => Ok(self.filter(input, &set)),
            Err(ProcessingError::Configuration(msg)) => {
                warn!("Filter skipped: {}", msg);
                Ok(input.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "filter"
    }

    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Filter
    }
}
