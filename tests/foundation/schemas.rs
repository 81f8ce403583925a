//! Integration tests for schema validation

use tessera_foundation::{ErrorKind, Schema, Value};

#[test]
fn constructors_describe_fixed_shapes() {
    assert_eq!(Schema::vec3().fixed_len(), Some(3));
    assert_eq!(Schema::vec4().fixed_len(), Some(4));
    assert_eq!(Schema::array(Schema::String).fixed_len(), None);
    assert!(Schema::u32().is_numeric());
    assert!(!Schema::String.is_numeric());
}

#[test]
fn entity_schema_rejects_negative_ids() {
    assert!(Schema::entity().validate(&Value::Int(0)).is_ok());
    assert!(Schema::entity().validate(&Value::Int(-1)).is_err());
}

#[test]
fn violation_reports_nested_path() {
    let schema = Schema::object([("transform", Schema::object([("scale", Schema::vec3())]))]);
    let value = Value::object([(
        "transform",
        Value::object([("scale", Value::array([Value::Float(1.0), Value::from("x"), Value::Float(1.0)]))]),
    )]);
    let err = schema.validate(&value).unwrap_err();
    match err.kind {
        ErrorKind::SchemaViolation { path, expected, actual } => {
            assert_eq!(path, "$.transform.scale[1]");
            assert_eq!(expected, "number");
            assert_eq!(actual, "string");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn wrong_array_length_is_rejected() {
    let err = Schema::vec3().validate(&Value::from([1.0, 2.0])).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SchemaViolation { .. }));
}

#[test]
fn i32_bounds() {
    let s = Schema::i32();
    assert!(s.validate(&Value::Int(i64::from(i32::MIN))).is_ok());
    assert!(s.validate(&Value::Int(i64::from(i32::MAX) + 1)).is_err());
}
