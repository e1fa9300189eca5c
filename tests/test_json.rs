// Structured data tests
// Author: Gabriel Demetrios Lafis

use serde_json::json;

use record_transform_engine::{
    data::coerce::values_equal,
    data::{Record, Value, JSON_CONFIG, VALIDATION_ERRORS},
    processing::{
        flatten_document, parse_path, ErrorPolicy, JsonConfig, JsonProcessor, PathSegment,
        ProcessingError, RecordProcessor,
    },
    utils::EngineSettings,
};

#[test]
fn test_parse_replaces_source_field() {
    let record = Record::new()
        .with("id", 1)
        .with("payload", r#"{"name": "Alice", "age": 30, "tags": ["a", "b"]}"#);

    let result = JsonProcessor::new()
        .apply(&record, &JsonConfig::new("parse").source("payload"))
        .unwrap();

    assert!(!result.has("payload"));
    assert_eq!(result.get("id"), Some(&Value::Integer(1)));
    assert_eq!(result.get("name"), Some(&Value::from("Alice")));
    assert_eq!(result.get("age"), Some(&Value::Integer(30)));
    assert_eq!(
        result.get("tags"),
        Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
    );
}

#[test]
fn test_parse_failures() {
    let processor = JsonProcessor::new();
    let config = JsonConfig::new("Parse").source("payload");

    let malformed = Record::new().with("payload", "{not json");
    assert!(matches!(processor.apply(&malformed, &config), Err(ProcessingError::Fatal(_))));

    let not_object = Record::new().with("payload", "[1, 2]");
    assert!(matches!(processor.apply(&not_object, &config), Err(ProcessingError::Record { .. })));

    let missing = Record::new().with("other", 1);
    assert!(matches!(processor.apply(&missing, &config), Err(ProcessingError::Record { .. })));
}

#[test]
fn test_serialize_subset_and_all() {
    let record = Record::new().with("id", 7).with("name", "Bob").with("score", 9.5);
    let processor = JsonProcessor::new();

    let subset = processor
        .apply(&record, &JsonConfig::new("serialize").target("packed").fields(&["id", "name", "absent"]))
        .unwrap();
    let packed: serde_json::Value =
        serde_json::from_str(subset.get("packed").unwrap().as_str().unwrap()).unwrap();
    assert_eq!(packed, json!({"id": 7, "name": "Bob"}));

    let all = processor
        .apply(&record, &JsonConfig::new("serialize").target("packed"))
        .unwrap();
    let packed: serde_json::Value =
        serde_json::from_str(all.get("packed").unwrap().as_str().unwrap()).unwrap();
    assert_eq!(packed, json!({"id": 7, "name": "Bob", "score": 9.5}));
}

#[test]
fn test_serialize_then_parse_round_trip() {
    let record = Record::new()
        .with("id", 3)
        .with("price", 19.99)
        .with("active", true)
        .with("sku", "A-1");
    let processor = JsonProcessor::new();

    let packed = processor
        .apply(&record, &JsonConfig::new("serialize").target("doc").fields(&["id", "price", "active", "sku"]))
        .unwrap();
    let mut only_doc = Record::new();
    only_doc.set("doc", packed.get("doc").unwrap().clone());

    let unpacked = processor
        .apply(&only_doc, &JsonConfig::new("parse").source("doc"))
        .unwrap();

    for name in ["id", "price", "active", "sku"] {
        assert!(
            values_equal(record.get_or_null(name), unpacked.get_or_null(name)),
            "field '{}' changed",
            name
        );
    }
}

#[test]
fn test_extract_paths() {
    let record = Record::new().with(
        "order",
        r#"{"customer": {"name": "Ana"}, "items": [{"sku": "X1", "qty": 2}, {"sku": "Y2"}], "meta": {}}"#,
    );
    let config = JsonConfig::new("extract")
        .source("order")
        .map_path("customer.name", "customer")
        .map_path("items[1].sku", "second_sku")
        .map_path("items[0].qty", "first_qty")
        .map_path("items[5].sku", "missing")
        .map_path("meta", "not_scalar");

    let result = JsonProcessor::new().apply(&record, &config).unwrap();

    assert_eq!(result.get("customer"), Some(&Value::from("Ana")));
    assert_eq!(result.get("second_sku"), Some(&Value::from("Y2")));
    assert_eq!(result.get("first_qty"), Some(&Value::Integer(2)));
    assert!(!result.has("missing"));
    assert!(!result.has("not_scalar"));
    // extract keeps the source
    assert!(result.has("order"));
}

#[test]
fn test_path_parsing() {
    assert_eq!(
        parse_path("a.b[2][0].c"),
        Some(vec![
            PathSegment::Key("a".to_string()),
            PathSegment::Key("b".to_string()),
            PathSegment::Index(2),
            PathSegment::Index(0),
            PathSegment::Key("c".to_string()),
        ])
    );
    assert_eq!(parse_path("[1]"), Some(vec![PathSegment::Index(1)]));
    assert_eq!(parse_path("a..b"), None);
    assert_eq!(parse_path("a[x]"), None);
}

#[test]
fn test_flatten_with_separator() {
    let record = Record::new().with("id", 1).with("doc", r#"{"a": {"b": 1, "c": [2, 3]}}"#);

    let result = JsonProcessor::new()
        .apply(&record, &JsonConfig::new("flatten").source("doc").separator("_"))
        .unwrap();

    assert!(!result.has("doc"));
    assert_eq!(result.get("a_b"), Some(&Value::Integer(1)));
    assert_eq!(result.get("a_c_0"), Some(&Value::Integer(2)));
    assert_eq!(result.get("a_c_1"), Some(&Value::Integer(3)));
    assert_eq!(result.len(), 4);
}

#[test]
fn test_flatten_defaults() {
    let nested = Record::new().with("doc", Value::Json(json!({"x": {"y": true}})));
    let result = JsonProcessor::new()
        .apply(&nested, &JsonConfig::new("flatten").source("doc"))
        .unwrap();
    assert_eq!(result.get("x.y"), Some(&Value::Boolean(true)));

    let settings = EngineSettings {
        flatten_separator: "/".to_string(),
        ..EngineSettings::default()
    };
    let array = Record::new().with("tags", "[\"a\", \"b\"]");
    let result = JsonProcessor::with_settings(&settings)
        .apply(&array, &JsonConfig::new("flatten").source("tags"))
        .unwrap();
    assert_eq!(result.get("tags/0"), Some(&Value::from("a")));
    assert_eq!(result.get("tags/1"), Some(&Value::from("b")));
}

#[test]
fn test_flatten_document_leaves() {
    let leaves = flatten_document(&json!({"a": [{"b": null}], "c": "d"}), ".");

    assert_eq!(
        leaves,
        vec![
            ("a.0.b".to_string(), serde_json::Value::Null),
            ("c".to_string(), json!("d")),
        ]
    );
}

#[test]
fn test_unknown_operation_is_configuration_error() {
    let record = Record::new().with("doc", "{}");

    let outcome = JsonProcessor::new().apply(&record, &JsonConfig::new("transmogrify").source("doc"));

    assert!(matches!(outcome, Err(ProcessingError::Configuration(_))));
}

#[test]
fn test_error_policy() {
    let records = vec![
        Record::new().with("doc", r#"{"k": 1}"#),
        Record::new().with("other", 2),
    ];
    let config = JsonConfig::new("parse").source("doc");
    let processor = JsonProcessor::new();

    let dropped = processor.process_with(&records, &config, ErrorPolicy::new(false)).unwrap();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].get("k"), Some(&Value::Integer(1)));

    let kept = processor.process_with(&records, &config, ErrorPolicy::new(true)).unwrap();
    assert_eq!(kept.len(), 2);
    assert!(kept[1].metadata.has(VALIDATION_ERRORS));
}

#[test]
fn test_processor_reads_metadata_config() {
    let mut records = vec![
        Record::new().with("doc", r#"{"a": {"b": 1}}"#),
        Record::new().with("doc", r#"{"a": {"b": 2}}"#),
    ];
    records[0].metadata.set(
        JSON_CONFIG,
        Value::Json(json!({"Operation": "flatten", "SourceField": "doc", "Separator": "__"})),
    );

    let result = JsonProcessor::new().process(&records).unwrap();

    assert_eq!(result[0].get("a__b"), Some(&Value::Integer(1)));
    assert_eq!(result[1].get("a__b"), Some(&Value::Integer(2)));
}

#[test]
fn test_processor_fatal_and_pass_through() {
    let mut malformed = vec![Record::new().with("doc", "{oops")];
    malformed[0]
        .metadata
        .set(JSON_CONFIG, Value::Json(json!({"Operation": "parse", "SourceField": "doc"})));
    assert!(matches!(
        JsonProcessor::new().process(&malformed),
        Err(ProcessingError::Fatal(_))
    ));

    let mut unknown = vec![Record::new().with("doc", "{}")];
    unknown[0]
        .metadata
        .set(JSON_CONFIG, Value::Json(json!({"Operation": "explode", "SourceField": "doc"})));
    assert_eq!(JsonProcessor::new().process(&unknown).unwrap(), unknown);

    let plain = vec![Record::new().with("doc", "{}")];
    assert_eq!(JsonProcessor::new().process(&plain).unwrap(), plain);
}
