// Simple pipeline example
// Author: Gabriel Demetrios Lafis

use record_transform_engine::{
    data::{Record, Value},
    processing::{
        Condition, ConditionSet, DateTimeOperation, DateTimeProcessor, ErrorPolicy,
        FilterProcessor, NormalizationOperation, NormalizeProcessor, Pipeline,
    },
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create a batch
    let records = vec![
        Record::new().with("name", "Alice").with("age", 30).with("salary", 75000.0).with("hired", "2019-04-01"),
        Record::new().with("name", "Bob").with("age", 25).with("salary", 65000.0).with("hired", "2021-09-15"),
        Record::new().with("name", "Charlie").with("age", 35).with("salary", 85000.0).with("hired", "2015-01-20"),
        Record::new().with("name", "Diana").with("age", 28).with("salary", 70000.0).with("hired", "unknown"),
    ];

    // Print original batch
    println!("Original batch:");
    print_records(&records);

    // Create a pipeline
    let pipeline = Pipeline::new("example")
        // Keep employees older than 25
        .add(FilterProcessor::with_conditions(ConditionSet::all(vec![
            Condition::new("age", "greaterThan", 25),
        ])))
        // Rescale salaries to [0, 1]
        .add(NormalizeProcessor::with_operations(vec![(
            "salary".to_string(),
            NormalizationOperation::new("MinMax").into_field("salary_scaled"),
        )]));

    let filtered = pipeline.execute(&records)?;

    // Derive the hiring year; unparseable dates are dropped
    let operations = vec![(
        "hired".to_string(),
        DateTimeOperation::new("Year").into_field("hired_year"),
    )];
    let result = DateTimeProcessor::new().process_with(&filtered, &operations, ErrorPolicy::new(false));

    // Print result
    println!("\nProcessed batch:");
    print_records(&result);

    Ok(())
}

fn print_records(records: &[Record]) {
    for record in records {
        let fields: Vec<String> = record
            .iter()
            .map(|(name, value)| match value {
                Value::String(s) => format!("{}={:?}", name, s),
                other => format!("{}={}", name, other),
            })
            .collect();
        println!("  {}", fields.join(", "));
    }
}
