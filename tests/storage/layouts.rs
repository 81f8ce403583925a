//! Integration tests for the std140 layout compiler

use tessera_foundation::{ErrorKind, Schema};
use tessera_storage::{FieldType, LayoutCache, Primitive, StructLayout};

fn offsets(layout: &StructLayout) -> Vec<usize> {
    layout.fields.iter().map(|f| f.offset).collect()
}

// =============================================================================
// Sizes and Offsets
// =============================================================================

#[test]
fn vec3_packs_into_sixteen_bytes() {
    let layout = StructLayout::compile(&Schema::vec3()).unwrap();
    assert_eq!(layout.size, 16);
    assert_eq!(offsets(&layout), vec![0, 4, 8]);
}

#[test]
fn scalar_then_vec3_aligns_to_sixteen() {
    let schema = Schema::object([("mass", Schema::f32()), ("velocity", Schema::vec3())]);
    let layout = StructLayout::compile(&schema).unwrap();
    assert_eq!(offsets(&layout), vec![0, 16]);
    assert_eq!(layout.size, 32);
}

#[test]
fn mat4_is_four_vec4_rows() {
    let layout = StructLayout::compile(&Schema::tuple(Schema::vec4(), 4)).unwrap();
    assert_eq!(layout.size, 64);
    assert_eq!(offsets(&layout), vec![0, 16, 32, 48]);
}

#[test]
fn nested_objects_start_on_sixteen() {
    let light = Schema::object([("intensity", Schema::f32())]);
    let schema = Schema::object([
        ("id", Schema::u32()),
        ("light", light),
        ("flags", Schema::i32()),
    ]);
    let layout = StructLayout::compile(&schema).unwrap();
    assert_eq!(offsets(&layout), vec![0, 16, 32]);
    assert_eq!(layout.size, 48);
    assert!(matches!(layout.field("light").unwrap().ty, FieldType::Struct(_)));
    assert_eq!(layout.field("flags").unwrap().ty, FieldType::Primitive(Primitive::I32));
}

#[test]
fn scalar_pairs_pack_tightly() {
    let layout = StructLayout::compile(&Schema::tuple(Schema::u32(), 2)).unwrap();
    assert_eq!(offsets(&layout), vec![0, 4]);
    assert_eq!(layout.size, 16);
}

// =============================================================================
// Rejections
// =============================================================================

#[test]
fn unrepresentable_schemas_are_rejected() {
    let cases = [
        Schema::array(Schema::f32()),
        Schema::tuple(Schema::f32(), 1),
        Schema::tuple(Schema::String, 2),
        Schema::object([("name", Schema::String)]),
        Schema::object(std::iter::empty::<(&str, Schema)>()),
        Schema::f32(),
        Schema::Integer { minimum: None, maximum: None },
    ];
    for schema in cases {
        let err = StructLayout::compile(&schema).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidSchema(_)), "{schema:?}");
    }
}

// =============================================================================
// Caching
// =============================================================================

#[test]
fn cache_memoizes_layouts_and_accessors() {
    let mut cache = LayoutCache::new();
    let a = cache.layout(&Schema::vec3()).unwrap();
    let b = cache.layout(&Schema::tuple(Schema::f32(), 3)).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 1);

    let x = cache.accessor(&a);
    let y = cache.accessor(&b);
    assert!(std::sync::Arc::ptr_eq(&x, &y));
}
