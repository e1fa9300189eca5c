// Join and aggregate example driven by metadata configuration
// Author: Gabriel Demetrios Lafis

use serde_json::json;

use record_transform_engine::{
    data::{records_from_json, Value, AGGREGATION_CONFIG, MERGE_CONFIG},
    processing::{AggregateProcessor, MergeProcessor, RecordProcessor},
    utils::{init_logging, EngineSettings},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(log::LevelFilter::Info)?;

    let mut orders = records_from_json(&json!([
        {"order_id": 1, "customer_id": 10, "amount": 120.0},
        {"order_id": 2, "customer_id": 11, "amount": 80.0},
        {"order_id": 3, "customer_id": 10, "amount": 30.0},
        {"order_id": 4, "customer_id": 13, "amount": 55.0}
    ]))?;

    // Attach the join configuration to the batch
    orders[0].metadata.set(
        MERGE_CONFIG,
        Value::Json(json!({
            "MergeType": "Left",
            "DataSources": {
                "customers": [
                    {"customer_id": 10, "name": "Alice", "segment": "retail"},
                    {"customer_id": 11, "name": "Bob", "segment": "wholesale"}
                ]
            },
            "JoinFields": ["customer_id"]
        })),
    );

    let mut joined = MergeProcessor::with_settings(&EngineSettings::default()).process(&orders)?;

    // Attach the aggregation configuration to the joined batch
    if let Some(first) = joined.first_mut() {
        first.metadata.set(
            AGGREGATION_CONFIG,
            Value::Json(json!({
                "GroupByFields": ["segment"],
                "AggregationOperations": {"amount": "Sum", "order_id": "Count"}
            })),
        );
    }

    let summary = AggregateProcessor::new().process(&joined)?;

    for record in &summary {
        println!("{}", serde_json::to_string_pretty(&record.to_json_object())?);
    }

    Ok(())
}
