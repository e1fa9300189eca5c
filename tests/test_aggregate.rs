// Aggregation tests
// Author: Gabriel Demetrios Lafis

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use record_transform_engine::{
    data::{Record, Value, AGGREGATION_APPLIED, AGGREGATION_CONFIG, RECORDS_AGGREGATED},
    processing::{
        AggregateProcessor, AggregationSpec, FunctionRegistry, ProcessingError, RecordProcessor,
    },
};

fn sales() -> Vec<Record> {
    vec![
        Record::new().with("region", "north").with("rep", "ana").with("amount", 100),
        Record::new().with("region", "south").with("rep", "rui").with("amount", 50),
        Record::new().with("region", "north").with("rep", "ana").with("amount", 25.5),
        Record::new().with("region", "north").with("rep", "eva").with("amount", "x"),
    ]
}

fn ops(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(field, function)| (field.to_string(), function.to_string()))
        .collect()
}

fn decimal(text: &str) -> Value {
    Value::Decimal(text.parse::<Decimal>().unwrap())
}

#[test]
fn test_sum_skips_non_numeric_values() {
    let records = vec![
        Record::new().with("v", 1),
        Record::new().with("v", 2),
        Record::new().with("v", "x"),
        Record::new().with("v", 3),
    ];

    let result = AggregateProcessor::new()
        .aggregate(&records, &[], &ops(&[("v", "Sum")]))
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].get("Sum_v"), Some(&decimal("6")));
    assert_eq!(result[0].metadata.get(RECORDS_AGGREGATED), Some(&Value::Integer(4)));
}

#[test]
fn test_groups_in_first_appearance_order() {
    let result = AggregateProcessor::new()
        .aggregate(
            &sales(),
            &["region".to_string()],
            &ops(&[("amount", "Sum"), ("amount", "Count"), ("rep", "CountDistinct")]),
        )
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].get("region"), Some(&Value::from("north")));
    assert_eq!(result[0].get("Sum_amount"), Some(&decimal("125.5")));
    assert_eq!(result[0].get("Count_amount"), Some(&Value::Integer(3)));
    assert_eq!(result[0].get("CountDistinct_rep"), Some(&Value::Integer(2)));
    assert_eq!(result[1].get("region"), Some(&Value::from("south")));
    assert_eq!(result[1].get("Sum_amount"), Some(&decimal("50")));
    assert_eq!(result[0].metadata.get(AGGREGATION_APPLIED), Some(&Value::Boolean(true)));
}

#[test]
fn test_numeric_functions() {
    let result = AggregateProcessor::new()
        .aggregate(
            &sales(),
            &["region".to_string()],
            &ops(&[("amount", "Average"), ("amount", "Min"), ("amount", "Max")]),
        )
        .unwrap();

    assert_eq!(result[0].get("Average_amount"), Some(&decimal("62.75")));
    assert_eq!(result[0].get("Min_amount"), Some(&decimal("25.5")));
    assert_eq!(result[0].get("Max_amount"), Some(&decimal("100")));
}

#[test]
fn test_numeric_functions_default_to_zero() {
    let records = vec![Record::new().with("v", "n/a"), Record::new().with("v", Value::Null)];

    let result = AggregateProcessor::new()
        .aggregate(&records, &[], &ops(&[("v", "Sum"), ("v", "Average"), ("v", "Max")]))
        .unwrap();

    assert_eq!(result[0].get("Sum_v"), Some(&Value::Decimal(Decimal::ZERO)));
    assert_eq!(result[0].get("Average_v"), Some(&Value::Decimal(Decimal::ZERO)));
    assert_eq!(result[0].get("Max_v"), Some(&Value::Decimal(Decimal::ZERO)));
}

#[test]
fn test_text_functions() {
    let result = AggregateProcessor::new()
        .aggregate(
            &sales(),
            &["region".to_string()],
            &ops(&[("rep", "Concatenate"), ("rep", "First"), ("rep", "Last")]),
        )
        .unwrap();

    assert_eq!(result[0].get("Concatenate_rep"), Some(&Value::from("ana,ana,eva")));
    assert_eq!(result[0].get("First_rep"), Some(&Value::from("ana")));
    assert_eq!(result[0].get("Last_rep"), Some(&Value::from("eva")));
}

#[test]
fn test_function_names_are_case_insensitive_but_kept_in_output() {
    let result = AggregateProcessor::new()
        .aggregate(&sales(), &[], &ops(&[("amount", "sum")]))
        .unwrap();

    assert_eq!(result.len(), 1);
    assert!(result[0].has("sum_amount"));
}

#[test]
fn test_custom_function_registry() {
    let registry = FunctionRegistry::builder()
        .with_builtins()
        .register_fn("Range", |values| {
            let numbers: Vec<i64> = values
                .iter()
                .filter_map(|v| match v {
                    Value::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect();
            match (numbers.iter().min(), numbers.iter().max()) {
                (Some(min), Some(max)) => Value::Integer(max - min),
                _ => Value::Null,
            }
        })
        .build();

    let records = vec![
        Record::new().with("v", 3),
        Record::new().with("v", 10),
        Record::new().with("v", 7),
    ];

    let result = AggregateProcessor::with_registry(Arc::new(registry))
        .aggregate(&records, &[], &ops(&[("v", "Range"), ("v", "Sum")]))
        .unwrap();

    assert_eq!(result[0].get("Range_v"), Some(&Value::Integer(7)));
    assert_eq!(result[0].get("Sum_v"), Some(&decimal("20")));
}

#[test]
fn test_unknown_function_is_configuration_error() {
    let outcome = AggregateProcessor::new().aggregate(&sales(), &[], &ops(&[("amount", "Median")]));

    assert!(matches!(outcome, Err(ProcessingError::Configuration(_))));
}

#[test]
fn test_processor_with_spec() {
    let processor = AggregateProcessor::with_spec(
        AggregationSpec::new().group_by("rep").aggregate("amount", "Count"),
    );

    let result = processor.process(&sales()).unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result[0].get("Count_amount"), Some(&Value::Integer(2)));
}

#[test]
fn test_processor_reads_metadata_config() {
    let mut records = sales();
    records[0].metadata.set(
        AGGREGATION_CONFIG,
        Value::Json(json!({
            "GroupByFields": ["region", "rep"],
            "AggregationOperations": {"amount": "Max"}
        })),
    );

    let result = AggregateProcessor::new().process(&records).unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result[0].get("rep"), Some(&Value::from("ana")));
    assert_eq!(result[0].get("Max_amount"), Some(&decimal("100")));
    // the first member's metadata travels with the group
    assert!(result[0].metadata.has(AGGREGATION_CONFIG));
}

#[test]
fn test_processor_edge_cases() {
    assert!(AggregateProcessor::new().process(&[]).unwrap().is_empty());

    let records = sales();
    assert_eq!(AggregateProcessor::new().process(&records).unwrap(), records);

    let mut unknown = sales();
    unknown[0].metadata.set(
        AGGREGATION_CONFIG,
        Value::Json(json!({"AggregationOperations": {"amount": "Median"}})),
    );
    assert_eq!(AggregateProcessor::new().process(&unknown).unwrap().len(), 4);
}
