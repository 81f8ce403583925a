//! Core values, entities, schemas, and errors for Tessera.
//!
//! This crate provides:
//! - [`Value`] - The dynamic value type held by components and resources
//! - [`Entity`] - Opaque entity handles
//! - [`Schema`] - Declarative data shapes and validation
//! - [`Error`] - Rich error types with context
//! - Persistent collections ([`PVec`], [`PMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod entity;
pub mod error;
pub mod schema;
pub mod value;

pub use collections::{PMap, PVec};
pub use entity::Entity;
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use schema::{Name, Schema};
pub use value::{Object, Value};

/// Name of the component every archetype carries.
pub const ID: &str = "id";
