//! Typed column storage.
//!
//! A column holds one component's values for every row of a table. The
//! storage strategy is chosen once from the component's schema:
//!
//! - numeric schemas get a flat [`NumericBuffer`] of `u32`, `i32`, `f32` or `f64`
//! - fixed-size aggregates get a packed [`StructBuffer`] laid out by [`StructLayout`]
//! - everything else gets a [`GenericBuffer`] of [`Value`]s
//!
//! Numeric and struct columns expose their bytes for direct GPU upload.

use std::sync::Arc;

use bytemuck::Pod;
use tessera_foundation::{Error, ErrorKind, Result, Schema, Value};

use crate::accessor::StructAccessor;
use crate::config::StoreConfig;
use crate::layout::{LayoutCache, StructLayout};

/// Row storage shared by every column strategy.
pub trait TypedBuffer {
    /// Reads the value at `index`, or `None` past the capacity.
    fn get(&self, index: usize) -> Option<Value>;

    /// Writes the value at `index`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` past the capacity and `SchemaViolation` if
    /// the value does not fit the column. A failed write leaves the row as it was.
    fn set(&mut self, index: usize, value: &Value) -> Result<()>;

    /// Number of rows allocated.
    fn capacity(&self) -> usize;

    /// Resizes the allocation to exactly `capacity` rows.
    ///
    /// # Errors
    ///
    /// Returns `CannotShrink` if `capacity` is below the current capacity.
    fn set_capacity(&mut self, capacity: usize) -> Result<()>;

    /// Copies row `from` over row `to`.
    fn move_row(&mut self, from: usize, to: usize);

    /// Iterates over every allocated row, including unused trailing rows.
    fn iter(&self) -> Box<dyn Iterator<Item = Value> + '_> {
        Box::new((0..self.capacity()).filter_map(move |i| self.get(i)))
    }
}

fn check_capacity(capacity: usize, requested: usize) -> Result<()> {
    if requested < capacity {
        return Err(Error::new(ErrorKind::CannotShrink { requested, capacity }));
    }
    Ok(())
}

// =============================================================================
// Numeric
// =============================================================================

/// Scalar stored by a [`NumericBuffer`].
pub trait Element: Pod + Default {
    /// Converts a value into the element, if it fits.
    fn from_value(value: &Value) -> Option<Self>;

    /// Converts the element back into a value.
    fn to_value(self) -> Value;

    /// Short type name for error messages.
    const NAME: &'static str;
}

impl Element for f32 {
    const NAME: &'static str = "f32";

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64().map(|n| n as f32)
    }

    fn to_value(self) -> Value {
        Value::Float(f64::from(self))
    }
}

impl Element for f64 {
    const NAME: &'static str = "f64";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }

    fn to_value(self) -> Value {
        Value::Float(self)
    }
}

impl Element for i32 {
    const NAME: &'static str = "i32";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int().and_then(|n| i32::try_from(n).ok())
    }

    fn to_value(self) -> Value {
        Value::Int(i64::from(self))
    }
}

impl Element for u32 {
    const NAME: &'static str = "u32";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int().and_then(|n| u32::try_from(n).ok())
    }

    fn to_value(self) -> Value {
        Value::Int(i64::from(self))
    }
}

/// Flat array of scalars.
#[derive(Clone, Debug)]
pub struct NumericBuffer<T: Element> {
    schema: Schema,
    integral: bool,
    data: Vec<T>,
}

impl<T: Element> NumericBuffer<T> {
    /// Creates a zeroed buffer of `capacity` rows.
    #[must_use]
    pub fn new(schema: Schema, capacity: usize) -> Self {
        Self {
            integral: matches!(schema, Schema::Integer { .. }),
            schema,
            data: vec![T::default(); capacity],
        }
    }

    /// The allocated rows as a typed slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The allocated rows as raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

impl<T: Element> TypedBuffer for NumericBuffer<T> {
    fn get(&self, index: usize) -> Option<Value> {
        let value = self.data.get(index)?.to_value();
        // Wide integers live in f64 storage but read back as integers.
        if self.integral {
            return Some(value.as_int().map_or(value, Value::Int));
        }
        Some(value)
    }

    fn set(&mut self, index: usize, value: &Value) -> Result<()> {
        let capacity = self.data.len();
        if self.integral {
            self.schema.validate(value)?;
        }
        let slot = self
            .data
            .get_mut(index)
            .ok_or_else(|| Error::index_out_of_bounds(index, capacity))?;
        *slot = T::from_value(value).ok_or_else(|| Error::schema_violation("$", T::NAME, value))?;
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        check_capacity(self.data.len(), capacity)?;
        self.data.resize(capacity, T::default());
        Ok(())
    }

    fn move_row(&mut self, from: usize, to: usize) {
        self.data[to] = self.data[from];
    }
}

// =============================================================================
// Struct
// =============================================================================

/// Packed fixed-size aggregates, one [`StructLayout`] per row.
#[derive(Clone, Debug)]
pub struct StructBuffer {
    schema: Schema,
    layout: Arc<StructLayout>,
    accessor: Arc<StructAccessor>,
    stride: usize,
    words: Vec<u32>,
    scratch: Vec<u32>,
}

impl StructBuffer {
    /// Creates a zeroed buffer of `capacity` rows.
    ///
    /// Values written to the buffer are checked against `schema`, which
    /// must be the schema `layout` was computed from.
    #[must_use]
    pub fn new(
        schema: Schema,
        layout: Arc<StructLayout>,
        accessor: Arc<StructAccessor>,
        capacity: usize,
    ) -> Self {
        let stride = layout.words();
        Self {
            schema,
            layout,
            accessor,
            stride,
            words: vec![0; stride * capacity],
            scratch: vec![0; stride],
        }
    }

    /// The layout every row follows.
    #[must_use]
    pub fn layout(&self) -> &Arc<StructLayout> {
        &self.layout
    }

    /// The allocated rows as raw bytes, `layout.size` bytes per row.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    fn row(&self, index: usize) -> Option<&[u32]> {
        let start = index.checked_mul(self.stride)?;
        self.words.get(start..start + self.stride)
    }
}

impl TypedBuffer for StructBuffer {
    fn get(&self, index: usize) -> Option<Value> {
        self.row(index).map(|words| self.accessor.read(words))
    }

    fn set(&mut self, index: usize, value: &Value) -> Result<()> {
        let capacity = self.capacity();
        if index >= capacity {
            return Err(Error::index_out_of_bounds(index, capacity));
        }
        self.schema.validate(value)?;
        // Encode into scratch space so a rejected value leaves the row intact.
        self.scratch.fill(0);
        self.accessor.write(&mut self.scratch, value)?;
        let start = index * self.stride;
        self.words[start..start + self.stride].copy_from_slice(&self.scratch);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.words.len() / self.stride
    }

    fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        check_capacity(self.capacity(), capacity)?;
        self.words.resize(capacity * self.stride, 0);
        Ok(())
    }

    fn move_row(&mut self, from: usize, to: usize) {
        let start = from * self.stride;
        self.words.copy_within(start..start + self.stride, to * self.stride);
    }
}

// =============================================================================
// Generic
// =============================================================================

/// Arbitrary values validated against a schema.
#[derive(Clone, Debug)]
pub struct GenericBuffer {
    schema: Schema,
    values: Vec<Value>,
}

impl GenericBuffer {
    /// Creates a buffer of `capacity` null rows.
    #[must_use]
    pub fn new(schema: Schema, capacity: usize) -> Self {
        Self {
            schema,
            values: vec![Value::Null; capacity],
        }
    }
}

impl TypedBuffer for GenericBuffer {
    fn get(&self, index: usize) -> Option<Value> {
        self.values.get(index).cloned()
    }

    fn set(&mut self, index: usize, value: &Value) -> Result<()> {
        let capacity = self.values.len();
        if index >= capacity {
            return Err(Error::index_out_of_bounds(index, capacity));
        }
        self.schema.validate(value)?;
        self.values[index] = value.clone();
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.values.len()
    }

    fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        check_capacity(self.values.len(), capacity)?;
        self.values.resize(capacity, Value::Null);
        Ok(())
    }

    fn move_row(&mut self, from: usize, to: usize) {
        self.values[to] = self.values[from].clone();
    }
}

// =============================================================================
// Column
// =============================================================================

/// Storage strategy of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// Single precision floats.
    F32,
    /// Double precision floats.
    F64,
    /// Signed 32-bit integers.
    I32,
    /// Unsigned 32-bit integers.
    U32,
    /// Packed aggregates.
    Struct,
    /// Boxed values.
    Generic,
}

/// A single component's storage inside a table.
#[derive(Clone, Debug)]
pub enum Column {
    /// Single precision floats.
    F32(NumericBuffer<f32>),
    /// Double precision floats.
    F64(NumericBuffer<f64>),
    /// Signed 32-bit integers.
    I32(NumericBuffer<i32>),
    /// Unsigned 32-bit integers.
    U32(NumericBuffer<u32>),
    /// Packed aggregates.
    Struct(StructBuffer),
    /// Boxed values.
    Generic(GenericBuffer),
}

macro_rules! dispatch {
    ($self:expr, $buf:ident => $body:expr) => {
        match $self {
            Column::F32($buf) => $body,
            Column::F64($buf) => $body,
            Column::I32($buf) => $body,
            Column::U32($buf) => $body,
            Column::Struct($buf) => $body,
            Column::Generic($buf) => $body,
        }
    };
}

impl Column {
    /// Picks the strategy for `schema` and allocates `config.initial_capacity` rows.
    ///
    /// Numeric schemas map to the narrowest buffer that holds their range:
    /// integers inside `u32` or `i32` bounds use those, single precision
    /// numbers use `f32`, and any other integer or number uses `f64`.
    #[must_use]
    pub fn for_schema(schema: &Schema, layouts: &mut LayoutCache, config: &StoreConfig) -> Self {
        let capacity = config.initial_capacity;
        match schema {
            Schema::Integer {
                minimum: Some(min),
                maximum: Some(max),
            } if *min >= 0 && *max <= i64::from(u32::MAX) => {
                Self::U32(NumericBuffer::new(schema.clone(), capacity))
            }
            Schema::Integer {
                minimum: Some(min),
                maximum: Some(max),
            } if *min >= i64::from(i32::MIN) && *max <= i64::from(i32::MAX) => {
                Self::I32(NumericBuffer::new(schema.clone(), capacity))
            }
            Schema::Number { precision: Some(1) } => Self::F32(NumericBuffer::new(schema.clone(), capacity)),
            Schema::Integer { .. } | Schema::Number { .. } => {
                Self::F64(NumericBuffer::new(schema.clone(), capacity))
            }
            Schema::Array { .. } | Schema::Object { .. } => match layouts.layout(schema) {
                Ok(layout) => {
                    let accessor = layouts.accessor(&layout);
                    Self::Struct(StructBuffer::new(schema.clone(), layout, accessor, capacity))
                }
                Err(_) => Self::Generic(GenericBuffer::new(schema.clone(), capacity)),
            },
            _ => Self::Generic(GenericBuffer::new(schema.clone(), capacity)),
        }
    }

    /// The storage strategy.
    #[must_use]
    pub const fn kind(&self) -> ColumnKind {
        match self {
            Self::F32(_) => ColumnKind::F32,
            Self::F64(_) => ColumnKind::F64,
            Self::I32(_) => ColumnKind::I32,
            Self::U32(_) => ColumnKind::U32,
            Self::Struct(_) => ColumnKind::Struct,
            Self::Generic(_) => ColumnKind::Generic,
        }
    }

    /// Raw bytes of numeric and struct columns; `None` for generic columns.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::F32(b) => Some(b.as_bytes()),
            Self::F64(b) => Some(b.as_bytes()),
            Self::I32(b) => Some(b.as_bytes()),
            Self::U32(b) => Some(b.as_bytes()),
            Self::Struct(b) => Some(b.as_bytes()),
            Self::Generic(_) => None,
        }
    }
}

impl TypedBuffer for Column {
    fn get(&self, index: usize) -> Option<Value> {
        dispatch!(self, b => b.get(index))
    }

    fn set(&mut self, index: usize, value: &Value) -> Result<()> {
        dispatch!(self, b => b.set(index, value))
    }

    fn capacity(&self) -> usize {
        dispatch!(self, b => b.capacity())
    }

    fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        dispatch!(self, b => b.set_capacity(capacity))
    }

    fn move_row(&mut self, from: usize, to: usize) {
        dispatch!(self, b => b.move_row(from, to));
    }
}
