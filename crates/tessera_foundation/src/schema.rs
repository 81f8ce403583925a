//! Declarative data shapes.
//!
//! A [`Schema`] describes a component's values. The storage layer derives its
//! column strategy from the schema (numeric, packed struct, or generic), and
//! generic columns validate writes against it.

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Component, resource, and field names.
pub type Name = Arc<str>;

/// Declarative description of a value's shape.
///
/// Schemas are immutable and compared structurally, so two schemas built the
/// same way share one compiled layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Schema {
    /// Only `null`.
    Null,
    /// `true` or `false`.
    Boolean,
    /// Any string.
    String,
    /// Whole numbers, optionally bounded (inclusive).
    Integer {
        /// Smallest allowed value.
        minimum: Option<i64>,
        /// Largest allowed value.
        maximum: Option<i64>,
    },
    /// Floating point numbers.
    Number {
        /// Storage precision hint: `1` is single precision, `2` is double.
        precision: Option<u8>,
    },
    /// Homogeneous sequence.
    Array {
        /// Schema of every element.
        items: Box<Schema>,
        /// Minimum number of elements.
        min_items: Option<usize>,
        /// Maximum number of elements.
        max_items: Option<usize>,
    },
    /// Record with named properties, in declaration order.
    Object {
        /// Property schemas. Every property is required.
        properties: Vec<(Name, Schema)>,
    },
    /// Unconstrained value.
    Any,
}

impl Schema {
    /// Single precision float.
    #[must_use]
    pub const fn f32() -> Self {
        Self::Number { precision: Some(1) }
    }

    /// Double precision float.
    #[must_use]
    pub const fn f64() -> Self {
        Self::Number { precision: Some(2) }
    }

    /// Unsigned 32-bit integer.
    #[must_use]
    pub const fn u32() -> Self {
        Self::Integer {
            minimum: Some(0),
            maximum: Some(u32::MAX as i64),
        }
    }

    /// Signed 32-bit integer.
    #[must_use]
    pub const fn i32() -> Self {
        Self::Integer {
            minimum: Some(i32::MIN as i64),
            maximum: Some(i32::MAX as i64),
        }
    }

    /// Schema of the `id` component every archetype carries.
    #[must_use]
    pub const fn entity() -> Self {
        Self::Integer {
            minimum: Some(0),
            maximum: Some(i32::MAX as i64),
        }
    }

    /// Fixed-length array of `len` items.
    #[must_use]
    pub fn tuple(items: Schema, len: usize) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: Some(len),
            max_items: Some(len),
        }
    }

    /// Open-ended array.
    #[must_use]
    pub fn array(items: Schema) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
    }

    /// Three `f32` components.
    #[must_use]
    pub fn vec3() -> Self {
        Self::tuple(Self::f32(), 3)
    }

    /// Four `f32` components.
    #[must_use]
    pub fn vec4() -> Self {
        Self::tuple(Self::f32(), 4)
    }

    /// Object with the given properties.
    #[must_use]
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<Name>,
    {
        Self::Object {
            properties: properties
                .into_iter()
                .map(|(k, s)| (k.into(), s))
                .collect(),
        }
    }

    /// Returns true for `Integer` and `Number` schemas.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer { .. } | Self::Number { .. })
    }

    /// Returns the fixed length of an array schema, if it has one.
    #[must_use]
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            Self::Array {
                min_items: Some(min),
                max_items: Some(max),
                ..
            } if min == max => Some(*min),
            _ => None,
        }
    }

    /// Checks that `value` conforms to this schema.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaViolation` naming the offending path.
    pub fn validate(&self, value: &Value) -> Result<()> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<()> {
        match (self, value) {
            (Self::Any, _)
            | (Self::Null, Value::Null)
            | (Self::Boolean, Value::Bool(_))
            | (Self::String, Value::String(_))
            | (Self::Number { .. }, Value::Int(_) | Value::Float(_)) => Ok(()),
            (Self::Integer { minimum, maximum }, v) => {
                let n = v
                    .as_int()
                    .ok_or_else(|| Error::schema_violation(path, "integer", v))?;
                if minimum.is_some_and(|min| n < min) || maximum.is_some_and(|max| n > max) {
                    return Err(Error::schema_violation(path, "integer in range", v));
                }
                Ok(())
            }
            (
                Self::Array {
                    items,
                    min_items,
                    max_items,
                },
                Value::Array(values),
            ) => {
                let len = values.len();
                if min_items.is_some_and(|min| len < min) || max_items.is_some_and(|max| len > max)
                {
                    return Err(Error::schema_violation(path, "array of valid length", value));
                }
                for (i, item) in values.iter().enumerate() {
                    items.validate_at(item, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            (Self::Object { properties }, Value::Object(fields)) => {
                for (name, schema) in properties {
                    let field = fields.get(name.as_ref()).ok_or_else(|| {
                        Error::schema_violation(&format!("{path}.{name}"), "required property", &Value::Null)
                    })?;
                    schema.validate_at(field, &format!("{path}.{name}"))?;
                }
                Ok(())
            }
            (schema, v) => Err(Error::schema_violation(path, schema.kind_name(), v)),
        }
    }

    /// Returns a short name for the schema kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Integer { .. } => "integer",
            Self::Number { .. } => "number",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
            Self::Any => "any",
        }
    }
}
