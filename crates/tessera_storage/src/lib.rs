//! Layout compiler, columnar archetype tables, and the entity store for Tessera.
//!
//! This crate provides:
//! - [`StructLayout`] - std140-style byte layouts compiled from schemas
//! - [`Column`] - Numeric, packed struct, and generic column storage
//! - [`Table`] and [`Archetype`] - Rows of one component set
//! - [`EntityLocationTable`] - Entity to row mapping with LIFO id reuse
//! - [`Store`] - Archetypes, entities, and resources

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accessor;
pub mod archetype;
pub mod changes;
pub mod column;
pub mod config;
pub mod layout;
pub mod location;
pub mod store;
pub mod table;

pub use accessor::StructAccessor;
pub use archetype::{Archetype, ArchetypeId};
pub use changes::Changes;
pub use column::{Column, ColumnKind, GenericBuffer, NumericBuffer, StructBuffer, TypedBuffer};
pub use config::StoreConfig;
pub use layout::{FieldType, LayoutCache, LayoutKind, Primitive, StructField, StructLayout};
pub use location::{EntityLocation, EntityLocationTable};
pub use store::Store;
pub use table::{EntityValues, Table};
