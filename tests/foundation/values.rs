//! Integration tests for dynamic values and persistent collections

use tessera_foundation::{Entity, PMap, PVec, Value};

// =============================================================================
// Construction and Access
// =============================================================================

#[test]
fn object_fields_are_ordered_by_name() {
    let v = Value::object([("name", Value::from("A")), ("hp", Value::Int(3))]);
    assert_eq!(format!("{v}"), "{hp: 3, name: A}");
    assert_eq!(v.field("hp"), Some(&Value::Int(3)));
    assert_eq!(v.field("mp"), None);
}

#[test]
fn arrays_from_fixed_tuples() {
    let v = Value::from([1.0, 2.0, 3.0]);
    assert_eq!(v.as_array().map(PVec::len), Some(3));
    assert_eq!(v.element(2), Some(&Value::Float(3.0)));
    assert_eq!(format!("{v}"), "[1, 2, 3]");
}

#[test]
fn numeric_conversions() {
    assert_eq!(Value::Float(4.0).as_int(), Some(4));
    assert_eq!(Value::Float(4.5).as_int(), None);
    assert_eq!(Value::Int(2).as_f64(), Some(2.0));
    assert_eq!(Value::from("x").as_f64(), None);
}

#[test]
fn entities_round_trip_through_values() {
    let e = Entity::new(12);
    assert_eq!(Value::from(e), Value::Int(12));
    assert_eq!(Value::from(e).as_entity(), Some(e));
    assert_eq!(Value::Int(-1).as_entity(), None);
}

// =============================================================================
// Equality
// =============================================================================

#[test]
fn float_equality_is_bitwise() {
    assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    assert_ne!(Value::Int(1), Value::Float(1.0));
}

#[test]
fn equal_values_hash_equal() {
    use std::collections::HashSet;
    let a = Value::object([("p", Value::from([1.0, 2.0]))]);
    let b = Value::object([("p", Value::array([1.0, 2.0]))]);
    let set: HashSet<Value> = [a, b].into_iter().collect();
    assert_eq!(set.len(), 1);
}

// =============================================================================
// Persistent Collections
// =============================================================================

#[test]
fn pvec_clones_share_contents() {
    let v: PVec<i32> = (0..4).collect();
    let w = v.clone();
    assert_eq!(v, w);
    assert_eq!(w.iter().copied().sum::<i32>(), 6);
    assert_eq!(w.get(4), None);
}

#[test]
fn pmap_iterates_in_key_order() {
    let m: PMap<i32, &str> = [(2, "b"), (1, "a")].into_iter().collect();
    assert!(m.contains_key(&1));
    assert_eq!(m.get(&2), Some(&"b"));
    assert_eq!(m.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
}
