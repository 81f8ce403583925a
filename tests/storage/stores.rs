//! Integration tests for archetypes, migration, and resources

use tessera_foundation::{ErrorKind, Name, Schema, Value};
use tessera_storage::{Changes, EntityValues, Store};

fn store() -> Store {
    Store::new(
        [
            ("position", Schema::vec3()),
            ("velocity", Schema::vec3()),
            ("name", Schema::String),
            ("tags", Schema::array(Schema::String)),
        ],
        [("time", Value::Float(0.0)), ("gravity", Value::Float(-9.8))],
    )
    .unwrap()
}

fn values<const N: usize>(pairs: [(&str, Value); N]) -> EntityValues {
    pairs.into_iter().map(|(k, v)| (Name::from(k), v)).collect()
}

fn component_names(s: &Store, e: tessera_foundation::Entity) -> Vec<String> {
    let arch = s.locate(e).unwrap().archetype;
    s.archetype(arch).unwrap().components().iter().map(ToString::to_string).collect()
}

// =============================================================================
// Migration
// =============================================================================

#[test]
fn removing_a_component_migrates() {
    let mut s = store();
    let e = s
        .create(values([("position", Value::from([1.0, 2.0, 3.0])), ("name", Value::from("A"))]))
        .unwrap();
    s.update(e, &Changes::new().remove("name")).unwrap();
    assert_eq!(component_names(&s, e), vec!["id", "position"]);
    assert_eq!(s.read(e).unwrap(), values([("id", Value::from(e)), ("position", Value::from([1.0, 2.0, 3.0]))]));
}

#[test]
fn migration_keeps_retained_and_adds_new() {
    let mut s = store();
    let e = s.create(values([("name", Value::from("A"))])).unwrap();
    s.update(
        e,
        &Changes::new()
            .set("velocity", Value::from([0.0, 1.0, 0.0]))
            .set("tags", Value::array(["fast"])),
    )
    .unwrap();
    let row = s.read(e).unwrap();
    assert_eq!(row.get("name"), Some(&Value::from("A")));
    assert_eq!(row.get("velocity"), Some(&Value::from([0.0, 1.0, 0.0])));
    assert_eq!(row.get("tags"), Some(&Value::array(["fast"])));
    assert_eq!(component_names(&s, e), vec!["id", "name", "tags", "velocity"]);
}

#[test]
fn removing_id_is_rejected() {
    let mut s = store();
    let e = s.create(values([("name", Value::from("A"))])).unwrap();
    let err = s.update(e, &Changes::new().remove("id")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IdIsImmutable));
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn equivalent_sets_share_archetypes() {
    let mut s = store();
    let a = s.ensure_archetype(["velocity", "id", "position"]).unwrap();
    let b = s.ensure_archetype(["id", "position", "velocity"]).unwrap();
    assert_eq!(a, b);
}

#[test]
fn select_includes_and_excludes() {
    let mut s = store();
    let moving = s
        .create(values([("position", Value::from([0.0, 0.0, 0.0])), ("velocity", Value::from([1.0, 0.0, 0.0]))]))
        .unwrap();
    let still = s.create(values([("position", Value::from([0.0, 0.0, 0.0]))])).unwrap();
    assert_eq!(s.select(&["position"], &[]).len(), 2);
    assert_eq!(s.select(&["position", "velocity"], &[]), vec![moving]);
    assert_eq!(s.select(&["position"], &["velocity"]), vec![still]);
}

// =============================================================================
// Resources
// =============================================================================

#[test]
fn resources_are_singleton_rows() {
    let mut s = store();
    assert_eq!(s.resource("gravity"), Some(Value::Float(-9.8)));
    s.set_resource("gravity", Value::Float(-1.6)).unwrap();
    assert_eq!(s.resource("gravity"), Some(Value::Float(-1.6)));
    assert_eq!(
        s.resource_names().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["gravity", "time"]
    );
    let e = s.resource_entity("time").unwrap();
    assert_eq!(component_names(&s, e), vec!["id", "time"]);
}

#[test]
fn resources_accept_any_value() {
    let mut s = store();
    s.set_resource("time", Value::object([("seconds", 1), ("frame", 60)])).unwrap();
    assert_eq!(s.resource("time").unwrap().field("frame"), Some(&Value::Int(60)));
}

#[test]
fn nested_struct_fields_keep_their_bounds() {
    let stats = Schema::object([
        ("level", Schema::Integer { minimum: Some(0), maximum: Some(10) }),
        ("x", Schema::f32()),
    ]);
    let mut s = Store::new([("stats", stats)], std::iter::empty::<(&str, Value)>()).unwrap();
    let err = s
        .create(values([(
            "stats",
            Value::object([("level", Value::Int(500)), ("x", Value::Float(1.0))]),
        )]))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SchemaViolation { .. }));
}
