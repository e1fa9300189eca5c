// Filter tests
// Author: Gabriel Demetrios Lafis

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;

use record_transform_engine::{
    data::coerce::{compare_values, values_equal},
    data::{Record, Value, FILTER_CONFIG},
    processing::{
        Condition, ConditionEvaluator, ConditionOperator, ConditionSet, FilterProcessor, LogicType,
        MatchesOperator, OperatorRegistry, RecordProcessor, MAX_CACHED_PATTERNS,
    },
};

fn people() -> Vec<Record> {
    vec![
        Record::new().with("name", "Alice").with("age", 30).with("city", "Lisbon"),
        Record::new().with("name", "Bob").with("age", 25).with("city", "Porto"),
        Record::new().with("name", "Charlie").with("age", 35).with("city", "Lisbon"),
    ]
}

fn names(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.get_or_null("name").to_string()).collect()
}

#[test]
fn test_and_requires_every_condition() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("age", 30).with("city", "Lisbon");

    let both = ConditionSet::all(vec![
        Condition::new("age", "greaterThan", 18),
        Condition::new("city", "equals", "Lisbon"),
    ]);
    let one_fails = ConditionSet::all(vec![
        Condition::new("age", "greaterThan", 18),
        Condition::new("city", "equals", "Porto"),
    ]);

    assert!(evaluator.evaluate(&record, &both));
    assert!(!evaluator.evaluate(&record, &one_fails));
}

#[test]
fn test_or_requires_one_condition() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("age", 30).with("city", "Lisbon");

    let one_holds = ConditionSet::any(vec![
        Condition::new("age", "lessThan", 18),
        Condition::new("city", "equals", "Lisbon"),
    ]);
    let none_hold = ConditionSet::any(vec![
        Condition::new("age", "lessThan", 18),
        Condition::new("city", "equals", "Porto"),
    ]);

    assert!(evaluator.evaluate(&record, &one_holds));
    assert!(!evaluator.evaluate(&record, &none_hold));
}

#[test]
fn test_empty_condition_sets() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("age", 30);

    assert!(evaluator.evaluate(&record, &ConditionSet::all(vec![])));
    assert!(!evaluator.evaluate(&record, &ConditionSet::any(vec![])));
}

#[test]
fn test_negate_applies_before_fold() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("age", 30).with("city", "Lisbon");

    let set = ConditionSet::new(
        vec![
            Condition::new("city", "equals", "Porto").negated(),
            Condition::new("age", "greaterThanOrEqual", 30),
        ],
        LogicType::And,
    );

    assert!(evaluator.evaluate(&record, &set));
}

#[test]
fn test_operator_aliases_and_case() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("age", 30);

    assert!(evaluator.evaluate_condition(&record, &Condition::new("age", ">", 29)));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("age", "GTE", 30)));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("age", "==", "30")));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("age", "NotEquals", 31)));
}

#[test]
fn test_unknown_operator_is_false_even_when_negated() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("age", 30);

    assert!(!evaluator.evaluate_condition(&record, &Condition::new("age", "between", 30)));
    assert!(!evaluator.evaluate_condition(&record, &Condition::new("age", "between", 30).negated()));
}

#[test]
fn test_numeric_coercion() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("amount", "12.50").with("label", "abc");

    assert!(evaluator.evaluate_condition(&record, &Condition::new("amount", "greaterThan", 12)));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("amount", "equals", 12.5)));
    // ordering needs both sides numeric
    assert!(!evaluator.evaluate_condition(&record, &Condition::new("label", "greaterThan", 1)));
    assert!(!evaluator.evaluate_condition(&record, &Condition::new("label", "lessThan", 1)));
}

#[test]
fn test_string_operators() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("email", "alice@example.com").with("note", Value::Null);

    assert!(evaluator.evaluate_condition(&record, &Condition::new("email", "contains", "@example")));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("email", "startsWith", "alice")));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("email", "endsWith", ".com")));
    assert!(!evaluator.evaluate_condition(&record, &Condition::new("note", "contains", "")));
    assert!(!evaluator.evaluate_condition(&record, &Condition::new("missing", "startsWith", "")));
}

#[test]
fn test_regex_operator() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("code", "AB-1234");

    assert!(evaluator.evaluate_condition(&record, &Condition::new("code", "matches", r"^[A-Z]{2}-\d{4}$")));
    assert!(!evaluator.evaluate_condition(&record, &Condition::new("code", "matches", r"^\d+$")));
    assert!(!evaluator.evaluate_condition(&record, &Condition::new("code", "matches", "([")));
}

#[test]
fn test_membership_operators() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new().with("status", "shipped").with("priority", 2);

    let list = Value::List(vec![Value::from("new"), Value::from("shipped")]);
    assert!(evaluator.evaluate_condition(&record, &Condition::new("status", "in", list)));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("status", "in", "new, shipped")));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("priority", "in", Value::Json(json!([1, 2, 3])))));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("status", "notIn", "cancelled,returned")));
}

#[test]
fn test_null_and_date_operators() {
    let evaluator = ConditionEvaluator::new();
    let record = Record::new()
        .with("shipped_at", "2024-03-10T14:30:00")
        .with("note", Value::Null);

    assert!(evaluator.evaluate_condition(&record, &Condition::new("note", "isNull", Value::Null)));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("missing", "isNull", Value::Null)));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("shipped_at", "isNotNull", Value::Null)));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("shipped_at", "dateBefore", "2024-04-01")));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("shipped_at", "dateAfter", "2024-03-01")));
    assert!(evaluator.evaluate_condition(&record, &Condition::new("shipped_at", "dateEquals", "2024-03-10")));
    assert!(!evaluator.evaluate_condition(&record, &Condition::new("shipped_at", "dateBefore", "soon")));
}

#[test]
fn test_custom_operator_registry() {
    let registry = OperatorRegistry::builder()
        .with_builtins()
        .register_fn("isEven", |field, _| match field {
            Value::Integer(i) => i % 2 == 0,
            _ => false,
        })
        .build();
    let evaluator = ConditionEvaluator::with_registry(Arc::new(registry));

    assert!(evaluator.evaluate_condition(&Record::new().with("n", 4), &Condition::new("n", "iseven", Value::Null)));
    assert!(!evaluator.evaluate_condition(&Record::new().with("n", 5), &Condition::new("n", "isEven", Value::Null)));
    assert!(evaluator.evaluate_condition(&Record::new().with("n", 5), &Condition::new("n", "equals", 5)));
}

#[test]
fn test_filter_processor_with_conditions() {
    let processor = FilterProcessor::with_conditions(ConditionSet::all(vec![
        Condition::new("age", "greaterThan", 28),
    ]));

    let result = processor.process(&people()).unwrap();

    assert_eq!(names(&result), vec!["Alice", "Charlie"]);
}

#[test]
fn test_filter_processor_reads_metadata_config() {
    let mut records = people();
    records[0].metadata.set(
        FILTER_CONFIG,
        Value::Json(json!({
            "Conditions": [
                {"Field": "city", "Operator": "equals", "Value": "Lisbon"},
                {"Field": "name", "Operator": "equals", "Value": "Bob"}
            ],
            "LogicType": "OR"
        })),
    );

    let result = FilterProcessor::new().process(&records).unwrap();

    assert_eq!(names(&result), vec!["Alice", "Bob", "Charlie"]);

    records[0].metadata.set(
        FILTER_CONFIG,
        Value::String(
            r#"{"Conditions":[{"Field":"city","Operator":"equals","Value":"Lisbon","Negate":true}]}"#
                .to_string(),
        ),
    );

    let result = FilterProcessor::new().process(&records).unwrap();

    assert_eq!(names(&result), vec!["Bob"]);
}

#[test]
fn test_filter_processor_passes_through_without_config() {
    let records = people();

    assert_eq!(FilterProcessor::new().process(&records).unwrap().len(), 3);

    let mut empty_conditions = people();
    empty_conditions[0]
        .metadata
        .set(FILTER_CONFIG, Value::Json(json!({"Conditions": []})));
    assert_eq!(FilterProcessor::new().process(&empty_conditions).unwrap().len(), 3);

    assert!(FilterProcessor::new().process(&[]).unwrap().is_empty());
}

#[test]
fn test_coercion_order() {
    let midnight = NaiveDate::from_ymd_opt(2024, 3, 10)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    // equal only once both sides are read as timestamps
    assert!(values_equal(&Value::from("2024-03-10"), &Value::from("2024-03-10T00:00:00")));
    assert!(values_equal(&Value::Timestamp(midnight), &Value::from("2024-03-10 00:00:00")));
    assert_eq!(
        compare_values(&Value::from("2024-03-10T09:00:00"), &Value::from("2024-03-10 10:00:00")),
        Some(Ordering::Less)
    );

    // numbers are tried before timestamps and text
    assert!(values_equal(&Value::from("20240310"), &Value::Integer(20240310)));
    assert_eq!(compare_values(&Value::from("9"), &Value::from("10")), Some(Ordering::Less));
    assert!(values_equal(&Value::from("1.50"), &Value::Float(1.5)));

    // text is the fallback
    assert_eq!(compare_values(&Value::from("apple"), &Value::from("banana")), Some(Ordering::Less));
    assert!(!values_equal(&Value::from("2024-03-10"), &Value::from("March")));

    assert_eq!(compare_values(&Value::Null, &Value::Null), Some(Ordering::Equal));
    assert_eq!(compare_values(&Value::Null, &Value::Integer(1)), None);
}

#[test]
fn test_regex_patterns_are_compiled_once() {
    let operator = MatchesOperator::new();

    for code in ["AB-1234", "CD-5678", "nope"] {
        let expected = code != "nope";
        assert_eq!(operator.evaluate(&Value::from(code), &Value::from(r"^[A-Z]{2}-\d{4}$")), expected);
    }
    assert_eq!(operator.cached_patterns(), 1);

    assert!(!operator.evaluate(&Value::from("x"), &Value::from("([")));
    assert!(!operator.evaluate(&Value::from("y"), &Value::from("([")));
    assert_eq!(operator.cached_patterns(), 2);

    for i in 0..=MAX_CACHED_PATTERNS {
        operator.evaluate(&Value::from("1"), &Value::from(format!("^{}$", i)));
    }
    assert!(operator.cached_patterns() <= MAX_CACHED_PATTERNS);
}
