//! Compiled struct readers and writers.
//!
//! A [`StructAccessor`] is built once per distinct [`StructLayout`] and turns
//! the layout into a tree of closures with the word offsets baked in. Reading
//! a row walks that tree directly instead of re-interpreting the layout.

use std::sync::Arc;

use tessera_foundation::{Error, Name, Object, PVec, Result, Value};

use crate::layout::{FieldType, LayoutKind, Primitive, SCALAR_SIZE, StructLayout};

type ReadFn = Box<dyn Fn(&[u32]) -> Value + Send + Sync>;
type WriteFn = Box<dyn Fn(&mut [u32], &Value) -> Result<()> + Send + Sync>;

/// Reader and writer specialized to one layout.
pub struct StructAccessor {
    words: usize,
    read: ReadFn,
    write: WriteFn,
}

impl StructAccessor {
    /// Compiles the accessor for `layout`.
    #[must_use]
    pub fn compile(layout: &StructLayout) -> Self {
        Self {
            words: layout.words(),
            read: compile_read(layout, 0),
            write: compile_write(layout, 0, "$"),
        }
    }

    /// Number of 32-bit words one value occupies.
    #[must_use]
    pub const fn words(&self) -> usize {
        self.words
    }

    /// Decodes one value from `words`, which must hold at least
    /// [`Self::words`] entries.
    #[must_use]
    pub fn read(&self, words: &[u32]) -> Value {
        (self.read)(words)
    }

    /// Encodes `value` into `words`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` if the value does not match the layout. The
    /// words may be partially written in that case.
    pub fn write(&self, words: &mut [u32], value: &Value) -> Result<()> {
        (self.write)(words, value)
    }
}

impl std::fmt::Debug for StructAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructAccessor")
            .field("words", &self.words)
            .finish_non_exhaustive()
    }
}

fn read_primitive(primitive: Primitive, at: usize) -> ReadFn {
    match primitive {
        Primitive::F32 => Box::new(move |w| Value::Float(f64::from(f32::from_bits(w[at])))),
        Primitive::I32 => Box::new(move |w| Value::Int(i64::from(bytemuck::cast::<u32, i32>(w[at])))),
        Primitive::U32 => Box::new(move |w| Value::Int(i64::from(w[at]))),
    }
}

fn compile_read(layout: &StructLayout, base: usize) -> ReadFn {
    let fields: Vec<(Name, ReadFn)> = layout
        .fields
        .iter()
        .map(|field| {
            let at = base + field.offset / SCALAR_SIZE;
            let read = match &field.ty {
                FieldType::Primitive(p) => read_primitive(*p, at),
                FieldType::Struct(inner) => compile_read(inner, at),
            };
            (Name::clone(&field.name), read)
        })
        .collect();

    match layout.kind {
        LayoutKind::Object => Box::new(move |w| {
            Value::Object(
                fields
                    .iter()
                    .map(|(name, read)| (Name::clone(name), read(w)))
                    .collect::<Object>(),
            )
        }),
        LayoutKind::Array => Box::new(move |w| {
            Value::Array(fields.iter().map(|(_, read)| read(w)).collect::<PVec<Value>>())
        }),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_primitive(primitive: Primitive, at: usize, path: Arc<str>) -> WriteFn {
    match primitive {
        Primitive::F32 => Box::new(move |w, v| {
            let n = v
                .as_f64()
                .ok_or_else(|| Error::schema_violation(&path, "number", v))?;
            w[at] = (n as f32).to_bits();
            Ok(())
        }),
        Primitive::I32 => Box::new(move |w, v| {
            let n = v
                .as_int()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| Error::schema_violation(&path, "i32", v))?;
            w[at] = bytemuck::cast(n);
            Ok(())
        }),
        Primitive::U32 => Box::new(move |w, v| {
            let n = v
                .as_int()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| Error::schema_violation(&path, "u32", v))?;
            w[at] = n;
            Ok(())
        }),
    }
}

fn compile_write(layout: &StructLayout, base: usize, path: &str) -> WriteFn {
    let fields: Vec<(Name, WriteFn)> = layout
        .fields
        .iter()
        .map(|field| {
            let at = base + field.offset / SCALAR_SIZE;
            let child = match layout.kind {
                LayoutKind::Object => format!("{path}.{}", field.name),
                LayoutKind::Array => format!("{path}[{}]", field.name),
            };
            let write = match &field.ty {
                FieldType::Primitive(p) => write_primitive(*p, at, Arc::from(child)),
                FieldType::Struct(inner) => compile_write(inner, at, &child),
            };
            (Name::clone(&field.name), write)
        })
        .collect();
    let path: Arc<str> = Arc::from(path);

    match layout.kind {
        LayoutKind::Object => Box::new(move |w, v| {
            let object = v
                .as_object()
                .ok_or_else(|| Error::schema_violation(&path, "object", v))?;
            for (name, write) in &fields {
                let field = object.get(name.as_ref()).ok_or_else(|| {
                    Error::schema_violation(&format!("{path}.{name}"), "required property", &Value::Null)
                })?;
                write(w, field)?;
            }
            Ok(())
        }),
        LayoutKind::Array => {
            let len = fields.len();
            Box::new(move |w, v| {
                let items = v
                    .as_array()
                    .filter(|items| items.len() == len)
                    .ok_or_else(|| Error::schema_violation(&path, &format!("array of {len}"), v))?;
                for ((_, write), item) in fields.iter().zip(items.iter()) {
                    write(w, item)?;
                }
                Ok(())
            })
        }
    }
}
