//! Schema-to-byte-layout compiler.
//!
//! Computes std140-style layouts (the uniform buffer rules shared by WebGPU
//! and OpenGL) for object and fixed-array schemas whose leaves are 32-bit
//! scalars. A [`StructLayout`] is a pure function of its schema; the
//! [`LayoutCache`] memoizes layouts and the accessors compiled from them.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_foundation::{Error, Name, Result, Schema};

use crate::accessor::StructAccessor;

/// Size and alignment of a `vec4`, the unit every aggregate rounds to.
pub const VEC4_SIZE: usize = 16;

/// Size and alignment of a scalar.
pub const SCALAR_SIZE: usize = 4;

/// 32-bit scalar kinds a layout can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// IEEE 754 single precision float.
    F32,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
}

impl Primitive {
    /// Maps a scalar schema to its packed representation.
    ///
    /// Integers need both bounds inside the 32-bit range; numbers need a
    /// precision hint of 1 or 2.
    #[must_use]
    pub fn of(schema: &Schema) -> Option<Self> {
        match schema {
            Schema::Integer {
                minimum: Some(min),
                maximum: Some(max),
            } => {
                if *min >= 0 && *max <= i64::from(u32::MAX) {
                    Some(Self::U32)
                } else if *min >= i64::from(i32::MIN) && *max <= i64::from(i32::MAX) {
                    Some(Self::I32)
                } else {
                    None
                }
            }
            Schema::Number {
                precision: Some(1 | 2),
            } => Some(Self::F32),
            _ => None,
        }
    }
}

/// Whether a layout came from an object or an array schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    /// Named fields in declaration order.
    Object,
    /// Elements named `"0"`, `"1"`, ... in index order.
    Array,
}

/// Type of a single field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A 4-byte scalar.
    Primitive(Primitive),
    /// A nested aggregate.
    Struct(Arc<StructLayout>),
}

impl FieldType {
    /// Size in bytes the field occupies.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Primitive(_) => SCALAR_SIZE,
            Self::Struct(layout) => layout.size,
        }
    }

    fn alignment(&self) -> usize {
        match self {
            Self::Primitive(_) => SCALAR_SIZE,
            Self::Struct(_) => VEC4_SIZE,
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Primitive(_) => SCALAR_SIZE,
            Self::Struct(layout) => round_up(layout.size, VEC4_SIZE),
        }
    }
}

/// A field at a byte offset within its parent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructField {
    /// Property name, or the element index for arrays.
    pub name: Name,
    /// Byte offset from the start of the parent.
    pub offset: usize,
    /// The field's type.
    pub ty: FieldType,
}

/// Byte layout of a fixed-size aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructLayout {
    /// Object or array.
    pub kind: LayoutKind,
    /// Total size in bytes, always a multiple of 16.
    pub size: usize,
    /// Fields in declaration (or index) order.
    pub fields: Vec<StructField>,
}

impl StructLayout {
    /// Compiles a layout without sharing a cache.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if the schema is not a fixed-size aggregate of
    /// 32-bit scalars.
    pub fn compile(schema: &Schema) -> Result<Arc<Self>> {
        LayoutCache::new().layout(schema)
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name.as_ref() == name)
    }

    /// Size in 32-bit words.
    #[must_use]
    pub const fn words(&self) -> usize {
        self.size / SCALAR_SIZE
    }
}

const fn round_up(offset: usize, alignment: usize) -> usize {
    offset.div_ceil(alignment) * alignment
}

/// Memoizes layouts by schema and accessors by layout.
#[derive(Default)]
pub struct LayoutCache {
    layouts: HashMap<Schema, Arc<StructLayout>>,
    accessors: HashMap<Arc<StructLayout>, Arc<StructAccessor>>,
}

impl LayoutCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the layout for `schema`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if the schema has no fixed-size layout.
    pub fn layout(&mut self, schema: &Schema) -> Result<Arc<StructLayout>> {
        if let Some(layout) = self.layouts.get(schema) {
            return Ok(Arc::clone(layout));
        }
        let layout = Arc::new(self.compile(schema)?);
        self.layouts.insert(schema.clone(), Arc::clone(&layout));
        Ok(layout)
    }

    /// Returns the compiled accessor for `layout`, building it on first use.
    pub fn accessor(&mut self, layout: &Arc<StructLayout>) -> Arc<StructAccessor> {
        Arc::clone(
            self.accessors
                .entry(Arc::clone(layout))
                .or_insert_with(|| Arc::new(StructAccessor::compile(layout))),
        )
    }

    /// Number of distinct layouts compiled so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Returns true if nothing has been compiled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    fn field_type(&mut self, schema: &Schema) -> Result<FieldType> {
        if let Some(primitive) = Primitive::of(schema) {
            return Ok(FieldType::Primitive(primitive));
        }
        match schema {
            Schema::Array { .. } | Schema::Object { .. } => Ok(FieldType::Struct(self.layout(schema)?)),
            other => Err(Error::invalid_schema(format!(
                "{} field has no 32-bit layout",
                other.kind_name()
            ))),
        }
    }

    fn compile(&mut self, schema: &Schema) -> Result<StructLayout> {
        match schema {
            Schema::Array {
                items,
                min_items,
                max_items,
            } => {
                let len = match (min_items, max_items) {
                    (Some(min), Some(max)) if min == max => *min,
                    _ => return Err(Error::invalid_schema("array must have fixed length")),
                };
                if len < 2 {
                    return Err(Error::invalid_schema("array length must be at least 2"));
                }
                let element = self.field_type(items)?;

                // Three packed scalars padded out to a vec4.
                if len == 3 && matches!(element, FieldType::Primitive(_)) {
                    let fields = (0..3)
                        .map(|i| StructField {
                            name: Name::from(i.to_string()),
                            offset: i * SCALAR_SIZE,
                            ty: element.clone(),
                        })
                        .collect();
                    return Ok(StructLayout {
                        kind: LayoutKind::Array,
                        size: VEC4_SIZE,
                        fields,
                    });
                }

                let stride = element.stride();
                let alignment = element.alignment();
                let mut offset = 0;
                let mut fields = Vec::with_capacity(len);
                for i in 0..len {
                    offset = round_up(offset, alignment);
                    fields.push(StructField {
                        name: Name::from(i.to_string()),
                        offset,
                        ty: element.clone(),
                    });
                    offset += stride;
                }
                Ok(StructLayout {
                    kind: LayoutKind::Array,
                    size: round_up(offset, VEC4_SIZE),
                    fields,
                })
            }
            Schema::Object { properties } => {
                if properties.is_empty() {
                    return Err(Error::invalid_schema("object must declare properties"));
                }
                let mut offset = 0;
                let mut fields = Vec::with_capacity(properties.len());
                for (name, property) in properties {
                    let ty = self
                        .field_type(property)
                        .map_err(|e| Error::invalid_schema(format!("property {name}: {e}")))?;
                    offset = round_up(offset, ty.alignment());
                    let size = ty.size();
                    fields.push(StructField {
                        name: Name::clone(name),
                        offset,
                        ty,
                    });
                    offset += size;
                }
                Ok(StructLayout {
                    kind: LayoutKind::Object,
                    size: round_up(offset, VEC4_SIZE),
                    fields,
                })
            }
            other => Err(Error::invalid_schema(format!(
                "{} schema is not an object or fixed array",
                other.kind_name()
            ))),
        }
    }
}
